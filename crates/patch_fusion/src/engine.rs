//! Applies a fusion strategy across every group of patches.

use crate::error::{FusionError, FusionResult};
use crate::strategies::{self, Decision, Strategy};
use ndarray::{Array2, Array3, ArrayView2, ArrayView3};

/// Per-patch model outputs, shaped `[groups, patches, ...]`.
///
/// Probabilistic models fill `probabilities`; margin-based models fill
/// `labels` and/or `hyperplane_distance`.
#[derive(Debug, Clone, Default)]
pub struct FusionInputs {
    /// `[groups, patches, classes]`
    pub probabilities: Option<Array3<f64>>,
    /// `[groups, patches]`
    pub labels: Option<Array2<usize>>,
    /// `[groups, patches, columns]`; binary models have one column.
    pub hyperplane_distance: Option<Array3<f64>>,
}

impl FusionInputs {
    pub fn probabilistic(probabilities: Array3<f64>) -> Self {
        Self {
            probabilities: Some(probabilities),
            ..Default::default()
        }
    }

    pub fn margin(labels: Array2<usize>, hyperplane_distance: Array3<f64>) -> Self {
        Self {
            probabilities: None,
            labels: Some(labels),
            hyperplane_distance: Some(hyperplane_distance),
        }
    }

    /// `(groups, patches)` shared by every supplied array.
    pub fn shape(&self) -> FusionResult<(usize, usize)> {
        let mut shapes: Vec<(&str, (usize, usize))> = Vec::with_capacity(3);
        if let Some(p) = &self.probabilities {
            let d = p.dim();
            shapes.push(("probabilities", (d.0, d.1)));
        }
        if let Some(l) = &self.labels {
            shapes.push(("labels", l.dim()));
        }
        if let Some(h) = &self.hyperplane_distance {
            let d = h.dim();
            shapes.push(("hyperplane_distance", (d.0, d.1)));
        }
        let Some(&(_, first)) = shapes.first() else {
            return Err(FusionError::invalid("no model outputs supplied"));
        };
        for (name, shape) in &shapes[1..] {
            if *shape != first {
                return Err(FusionError::invalid(format!(
                    "{name} shaped {shape:?} but {} shaped {first:?}",
                    shapes[0].0
                )));
            }
        }
        Ok(first)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Fusion {
    strategy: Strategy,
    multi_class: bool,
}

impl Fusion {
    pub fn new(strategy: Strategy, multi_class: bool) -> Self {
        Self {
            strategy,
            multi_class,
        }
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn multi_class(&self) -> bool {
        self.multi_class
    }

    /// One fused label per group, in group order.
    pub fn predict(&self, inputs: &FusionInputs) -> FusionResult<Vec<usize>> {
        if inputs.probabilities.is_some()
            && (inputs.labels.is_some() || inputs.hyperplane_distance.is_some())
        {
            return Err(FusionError::invalid(
                "supply either probabilities or labels/hyperplane_distance, not both",
            ));
        }
        let (groups, patches) = inputs.shape()?;
        if groups > 0 && patches == 0 {
            return Err(FusionError::invalid("groups contain no patches"));
        }
        match self.strategy {
            Strategy::Sum | Strategy::Mean => {
                let (scores, decision) = self.scores(inputs)?.ok_or_else(|| {
                    FusionError::invalid(format!(
                        "{} requires probabilities or hyperplane_distance",
                        self.strategy
                    ))
                })?;
                let reduce: fn(ArrayView2<f64>, Decision) -> usize =
                    if self.strategy == Strategy::Sum {
                        strategies::sum
                    } else {
                        strategies::mean
                    };
                Ok(scores.outer_iter().map(|g| reduce(g, decision)).collect())
            }
            Strategy::Farthest => {
                let (scores, decision) = self.scores(inputs)?.ok_or_else(|| {
                    FusionError::invalid(
                        "farthest requires probabilities or hyperplane_distance",
                    )
                })?;
                Ok(scores
                    .outer_iter()
                    .enumerate()
                    .map(|(i, g)| {
                        let labels = inputs.labels.as_ref().map(|l| l.row(i));
                        strategies::farthest(g, labels, decision)
                    })
                    .collect())
            }
            // Explicit labels are enough; scores are only read without them.
            Strategy::MostFrequent => {
                if let Some(labels) = &inputs.labels {
                    return Ok(labels
                        .outer_iter()
                        .map(|row| strategies::most_frequent(row.iter().copied()).unwrap_or(0))
                        .collect());
                }
                let (scores, decision) = self.scores(inputs)?.ok_or_else(|| {
                    FusionError::invalid("most_frequent requires labels or scores")
                })?;
                Ok(scores
                    .outer_iter()
                    .map(|g| {
                        strategies::most_frequent(strategies::patch_labels(g, decision))
                            .unwrap_or(0)
                    })
                    .collect())
            }
        }
    }

    fn scores<'a>(
        &self,
        inputs: &'a FusionInputs,
    ) -> FusionResult<Option<(ArrayView3<'a, f64>, Decision)>> {
        if let Some(p) = &inputs.probabilities {
            return Ok(Some((p.view(), Decision::ArgMax)));
        }
        let Some(d) = &inputs.hyperplane_distance else {
            return Ok(None);
        };
        if self.multi_class {
            return Ok(Some((d.view(), Decision::ArgMax)));
        }
        let columns = d.dim().2;
        if columns != 1 {
            return Err(FusionError::invalid(format!(
                "binary fusion expects one decision column, got {columns}"
            )));
        }
        Ok(Some((d.view(), Decision::Sign)))
    }
}
