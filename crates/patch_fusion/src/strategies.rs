//! Reductions that combine the patches of one group into a single label.
//!
//! Every function here works on a single group: `scores` is shaped
//! `[patches, columns]`, `labels` is shaped `[patches]`.

use crate::error::FusionError;
use ndarray::{ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Sum scores over patches, then decide.
    Sum,
    /// Average scores over patches, then decide.
    Mean,
    /// Take the label of the most confident patch.
    Farthest,
    /// Majority vote over per-patch labels.
    MostFrequent,
}

impl Strategy {
    /// Evaluation order used by the driver.
    pub const ALL: [Strategy; 4] = [
        Strategy::Sum,
        Strategy::Mean,
        Strategy::Farthest,
        Strategy::MostFrequent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Sum => "sum",
            Strategy::Mean => "mean",
            Strategy::Farthest => "farthest",
            Strategy::MostFrequent => "most_frequent",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = FusionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "sum" => Ok(Strategy::Sum),
            "mean" => Ok(Strategy::Mean),
            "farthest" => Ok(Strategy::Farthest),
            "most_frequent" => Ok(Strategy::MostFrequent),
            other => Err(FusionError::invalid(format!("unknown strategy {other:?}"))),
        }
    }
}

/// How a row of scores turns into a class label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Largest column wins (probabilities, or one distance per class).
    ArgMax,
    /// Single decision column; positive distance means class 1.
    Sign,
}

impl Decision {
    pub fn label(&self, row: ArrayView1<f64>) -> usize {
        match self {
            Decision::ArgMax => argmax(row),
            Decision::Sign => sign_label(row.first().copied().unwrap_or(0.0)),
        }
    }

    /// Distance of a patch from the decision boundary.
    pub fn confidence(&self, row: ArrayView1<f64>) -> f64 {
        match self {
            Decision::ArgMax => row.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Decision::Sign => row.first().map(|d| d.abs()).unwrap_or(0.0),
        }
    }
}

/// Index of the largest value. Ties keep the lowest index; NaN never wins.
pub fn argmax(values: ArrayView1<f64>) -> usize {
    let mut best = 0usize;
    let mut best_value = f64::NEG_INFINITY;
    for (i, &v) in values.iter().enumerate() {
        if v > best_value {
            best = i;
            best_value = v;
        }
    }
    best
}

pub fn sign_label(distance: f64) -> usize {
    if distance > 0.0 {
        1
    } else {
        0
    }
}

pub fn sum(scores: ArrayView2<f64>, decision: Decision) -> usize {
    let total = scores.sum_axis(Axis(0));
    decision.label(total.view())
}

pub fn mean(scores: ArrayView2<f64>, decision: Decision) -> usize {
    match scores.mean_axis(Axis(0)) {
        Some(avg) => decision.label(avg.view()),
        None => 0,
    }
}

/// Label of the patch farthest from the decision boundary.
///
/// When `labels` is given the chosen patch's own label is returned, otherwise
/// the label is derived from its scores. Ties keep the earliest patch.
pub fn farthest(
    scores: ArrayView2<f64>,
    labels: Option<ArrayView1<usize>>,
    decision: Decision,
) -> usize {
    let mut chosen = 0usize;
    let mut best = f64::NEG_INFINITY;
    for (i, row) in scores.outer_iter().enumerate() {
        let c = decision.confidence(row);
        if c > best {
            chosen = i;
            best = c;
        }
    }
    match labels {
        Some(labels) => labels[chosen],
        None => decision.label(scores.row(chosen)),
    }
}

/// Majority vote. Ties resolve to the label seen first.
///
/// ```
/// use patch_fusion::strategies::most_frequent;
/// assert_eq!(most_frequent([3, 7, 3, 7]), Some(3));
/// assert_eq!(most_frequent([7, 3, 3]), Some(3));
/// ```
pub fn most_frequent<I>(labels: I) -> Option<usize>
where
    I: IntoIterator<Item = usize>,
{
    // (label, count) in first-seen order.
    let mut tally: Vec<(usize, usize)> = Vec::new();
    for label in labels {
        match tally.iter_mut().find(|(l, _)| *l == label) {
            Some((_, count)) => *count += 1,
            None => tally.push((label, 1)),
        }
    }
    let mut winner: Option<(usize, usize)> = None;
    for (label, count) in tally {
        match winner {
            Some((_, best)) if count <= best => {}
            _ => winner = Some((label, count)),
        }
    }
    winner.map(|(label, _)| label)
}

/// Per-patch labels derived from scores.
pub fn patch_labels(scores: ArrayView2<f64>, decision: Decision) -> Vec<usize> {
    scores.outer_iter().map(|row| decision.label(row)).collect()
}
