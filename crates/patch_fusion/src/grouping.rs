//! Grouping flat patch arrays by painting and by recapture.
//!
//! Sample names look like `<recapture>-<...>-<patch>`. The painting key drops
//! the trailing patch segment; the recapture key keeps the leading segment.

use crate::error::{FusionError, FusionResult};
use crate::strategies::most_frequent;
use ndarray::{s, Array2, Array3, ArrayView2};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

pub fn painting_key(name: &str) -> &str {
    match name.rfind('-') {
        Some(i) => &name[..i],
        None => name,
    }
}

pub fn recapture_key(name: &str) -> &str {
    match name.find('-') {
        Some(i) => &name[..i],
        None => name,
    }
}

/// Ordered mapping from group key to group index, with member positions.
#[derive(Debug, Clone, Default)]
pub struct GroupIndex {
    keys: Vec<String>,
    lookup: HashMap<String, usize>,
    members: Vec<Vec<usize>>,
}

impl GroupIndex {
    /// Groups `names` by `key`, keeping first-seen group order.
    pub fn build<S, F>(names: &[S], key: F) -> Self
    where
        S: AsRef<str>,
        F: Fn(&str) -> &str,
    {
        let mut index = GroupIndex::default();
        for (pos, name) in names.iter().enumerate() {
            let k = key(name.as_ref());
            let group = match index.lookup.get(k) {
                Some(&g) => g,
                None => {
                    let g = index.keys.len();
                    index.keys.push(k.to_string());
                    index.lookup.insert(k.to_string(), g);
                    index.members.push(Vec::new());
                    g
                }
            };
            index.members[group].push(pos);
        }
        index
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn index_of(&self, key: &str) -> Option<usize> {
        self.lookup.get(key).copied()
    }

    /// Positions of the input items belonging to each group.
    pub fn members(&self) -> &[Vec<usize>] {
        &self.members
    }
}

/// What to do when paintings have different patch counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RaggedPolicy {
    /// Fail with [`FusionError::RaggedGroup`].
    #[default]
    Reject,
    /// Keep the first `min` patches of every painting.
    Truncate,
}

impl FromStr for RaggedPolicy {
    type Err = FusionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "reject" => Ok(RaggedPolicy::Reject),
            "truncate" => Ok(RaggedPolicy::Truncate),
            other => Err(FusionError::invalid(format!(
                "unknown ragged policy {other:?} (reject|truncate)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupedPatches {
    /// `[group, patch, feature]`
    pub features: Array3<f32>,
    pub labels: Vec<usize>,
    pub names: Vec<String>,
}

impl GroupedPatches {
    pub fn groups(&self) -> usize {
        self.features.dim().0
    }

    pub fn patches(&self) -> usize {
        self.features.dim().1
    }

    pub fn feature_dim(&self) -> usize {
        self.features.dim().2
    }

    /// Keeps at most `limit` patches per group.
    pub fn limit_patches(mut self, limit: usize) -> Self {
        if limit < self.patches() {
            self.features = self.features.slice(s![.., ..limit, ..]).to_owned();
        }
        self
    }

    /// Patches flattened to `[group * patch, feature]` rows, group-major.
    pub fn flat_features(&self) -> Array2<f32> {
        let (_, patches, features) = self.features.dim();
        let rows = self.groups() * patches;
        Array2::from_shape_fn((rows, features), |(r, c)| {
            self.features[[r / patches, r % patches, c]]
        })
    }
}

pub fn group_by_paintings<S: AsRef<str>>(
    features: ArrayView2<f32>,
    labels: &[usize],
    names: &[S],
    policy: RaggedPolicy,
) -> FusionResult<GroupedPatches> {
    let rows = features.nrows();
    if labels.len() != rows || names.len() != rows {
        return Err(FusionError::invalid(format!(
            "features have {rows} rows but {} labels and {} names",
            labels.len(),
            names.len()
        )));
    }

    let index = GroupIndex::build(names, painting_key);
    let mut group_labels = Vec::with_capacity(index.len());
    for (key, members) in index.keys().iter().zip(index.members()) {
        let expected = labels[members[0]];
        if let Some(&found) = members.iter().map(|&m| &labels[m]).find(|&&l| l != expected) {
            return Err(FusionError::InconsistentGroupLabel {
                group: key.clone(),
                expected,
                found,
            });
        }
        group_labels.push(expected);
    }

    let counts: Vec<usize> = index.members().iter().map(Vec::len).collect();
    let patches = match counts.first() {
        None => 0,
        Some(&first) => match policy {
            RaggedPolicy::Reject => {
                if let Some(pos) = counts.iter().position(|&c| c != first) {
                    return Err(FusionError::RaggedGroup {
                        group: index.keys()[pos].clone(),
                        expected: first,
                        found: counts[pos],
                    });
                }
                first
            }
            RaggedPolicy::Truncate => {
                let min = counts.iter().copied().min().unwrap_or(first);
                if counts.iter().any(|&c| c != min) {
                    tracing::warn!(
                        groups = index.len(),
                        patches = min,
                        "truncating paintings to a uniform patch count"
                    );
                }
                min
            }
        },
    };

    let dim = features.ncols();
    let mut grouped = Array3::<f32>::zeros((index.len(), patches, dim));
    for (g, members) in index.members().iter().enumerate() {
        for (p, &row) in members.iter().take(patches).enumerate() {
            grouped.slice_mut(s![g, p, ..]).assign(&features.row(row));
        }
    }

    Ok(GroupedPatches {
        features: grouped,
        labels: group_labels,
        names: index.keys().to_vec(),
    })
}

pub fn group_by_recaptures<S: AsRef<str>>(names: &[S]) -> GroupIndex {
    GroupIndex::build(names, recapture_key)
}

/// Painting-level predictions combined per recapture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecaptureFusion {
    pub names: Vec<String>,
    pub labels: Vec<usize>,
    pub predicted: Vec<usize>,
}

/// Majority vote over the painting predictions of each recapture.
///
/// The true label of a recapture is the label of its first painting.
pub fn fuse_recaptures<S: AsRef<str>>(
    painting_names: &[S],
    predicted: &[usize],
    truth: &[usize],
) -> FusionResult<RecaptureFusion> {
    if predicted.len() != painting_names.len() || truth.len() != painting_names.len() {
        return Err(FusionError::invalid(format!(
            "{} paintings but {} predictions and {} labels",
            painting_names.len(),
            predicted.len(),
            truth.len()
        )));
    }
    let index = group_by_recaptures(painting_names);
    let mut labels = Vec::with_capacity(index.len());
    let mut fused = Vec::with_capacity(index.len());
    for members in index.members() {
        labels.push(truth[members[0]]);
        fused.push(most_frequent(members.iter().map(|&m| predicted[m])).unwrap_or(0));
    }
    Ok(RecaptureFusion {
        names: index.keys().to_vec(),
        labels,
        predicted: fused,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn ragged_policy_parses_config_names() {
        assert_eq!("reject".parse::<RaggedPolicy>().unwrap(), RaggedPolicy::Reject);
        assert_eq!(" truncate".parse::<RaggedPolicy>().unwrap(), RaggedPolicy::Truncate);
        assert!(matches!(
            "pad".parse::<RaggedPolicy>(),
            Err(FusionError::InvalidInput(_))
        ));
    }

    #[test]
    fn keys_split_on_dashes() {
        assert_eq!(painting_key("r1-vg12-3"), "r1-vg12");
        assert_eq!(recapture_key("r1-vg12-3"), "r1");
        assert_eq!(painting_key("solo"), "solo");
        assert_eq!(recapture_key("solo"), "solo");
    }

    #[test]
    fn group_index_keeps_first_seen_order() {
        let names = ["b-1", "a-1", "b-2", "a-2"];
        let index = GroupIndex::build(&names, painting_key);
        assert_eq!(index.keys(), ["b", "a"]);
        assert_eq!(index.members(), [vec![0, 2], vec![1, 3]]);
        assert_eq!(index.index_of("a"), Some(1));
    }

    #[test]
    fn limit_and_flatten() {
        let x = array![[1.0f32], [2.0], [3.0], [4.0]];
        let names = ["p-0", "p-1", "q-0", "q-1"];
        let grouped = group_by_paintings(x.view(), &[0, 0, 1, 1], &names, RaggedPolicy::Reject)
            .unwrap()
            .limit_patches(1);
        assert_eq!(grouped.patches(), 1);
        assert_eq!(grouped.flat_features(), array![[1.0f32], [3.0]]);
    }

    #[test]
    fn recapture_vote_uses_first_label() {
        let names = ["r1-a", "r1-b", "r2-a"];
        let fused = fuse_recaptures(&names, &[1, 0, 2], &[1, 1, 2]).unwrap();
        assert_eq!(fused.names, ["r1", "r2"]);
        assert_eq!(fused.predicted, [1, 2]);
        assert_eq!(fused.labels, [1, 2]);
    }
}
