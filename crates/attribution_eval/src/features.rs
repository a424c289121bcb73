//! Precomputed feature store.
//!
//! Each phase lives in `<data_dir>/<phase>.json`, or in
//! `<data_dir>/<phase>.<chunk>.json` when the extraction was chunked:
//!
//! ```json
//! {"names": ["r1-vg1-0"], "labels": [1], "layers": {"avg_pool": [[0.1, 0.2]]}}
//! ```

use crate::error::{EvalError, EvalResult};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureFile {
    pub names: Vec<String>,
    pub labels: Vec<usize>,
    pub layers: BTreeMap<String, Vec<Vec<f32>>>,
}

/// Samples of one phase with one feature matrix per requested layer.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseData {
    pub names: Vec<String>,
    pub labels: Vec<usize>,
    /// `[samples, features]` per layer.
    pub layers: BTreeMap<String, Array2<f32>>,
}

impl PhaseData {
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

pub fn phase_files(data_dir: &Path, phase: &str, chunks: Option<&[usize]>) -> Vec<PathBuf> {
    match chunks {
        Some(chunks) => chunks
            .iter()
            .map(|c| data_dir.join(format!("{phase}.{c}.json")))
            .collect(),
        None => vec![data_dir.join(format!("{phase}.json"))],
    }
}

/// Loads `layers` for every phase, keeping only samples whose label is in
/// `classes` when given.
pub fn load_features(
    data_dir: &Path,
    phases: &[String],
    layers: &[String],
    classes: Option<&[usize]>,
    chunks: Option<&[usize]>,
) -> EvalResult<BTreeMap<String, PhaseData>> {
    let mut out = BTreeMap::new();
    for phase in phases {
        let data = load_phase(data_dir, phase, layers, classes, chunks)?;
        info!(phase = %phase, samples = data.len(), layers = layers.len(), "loaded features");
        out.insert(phase.clone(), data);
    }
    Ok(out)
}

fn load_phase(
    data_dir: &Path,
    phase: &str,
    layers: &[String],
    classes: Option<&[usize]>,
    chunks: Option<&[usize]>,
) -> EvalResult<PhaseData> {
    let mut names = Vec::new();
    let mut labels = Vec::new();
    let mut rows: BTreeMap<&str, Vec<Vec<f32>>> =
        layers.iter().map(|l| (l.as_str(), Vec::new())).collect();

    for path in phase_files(data_dir, phase, chunks) {
        let raw = fs::read_to_string(&path).map_err(|e| EvalError::io(&path, e))?;
        let mut file: FeatureFile =
            serde_json::from_str(&raw).map_err(|e| EvalError::json(&path, e))?;
        let err = |msg: String| EvalError::FeatureStore {
            path: path.clone(),
            msg,
        };
        if file.names.len() != file.labels.len() {
            return Err(err(format!(
                "{} names but {} labels",
                file.names.len(),
                file.labels.len()
            )));
        }
        let keep: Vec<bool> = file
            .labels
            .iter()
            .map(|l| classes.map_or(true, |c| c.contains(l)))
            .collect();
        for layer in layers {
            let Some(layer_rows) = file.layers.remove(layer) else {
                return Err(err(format!("layer {layer:?} missing")));
            };
            if layer_rows.len() != file.names.len() {
                return Err(err(format!(
                    "layer {layer:?} has {} rows for {} samples",
                    layer_rows.len(),
                    file.names.len()
                )));
            }
            if let Some(acc) = rows.get_mut(layer.as_str()) {
                acc.extend(
                    layer_rows
                        .into_iter()
                        .zip(&keep)
                        .filter_map(|(row, &k)| k.then_some(row)),
                );
            }
        }
        debug!(path = %path.display(), samples = file.names.len(), "read feature file");
        for ((name, label), k) in file.names.into_iter().zip(file.labels).zip(keep) {
            if k {
                names.push(name);
                labels.push(label);
            }
        }
    }

    let mut matrices = BTreeMap::new();
    for (layer, layer_rows) in rows {
        let width = layer_rows.first().map_or(0, Vec::len);
        if layer_rows.iter().any(|r| r.len() != width) {
            return Err(EvalError::FeatureStore {
                path: data_dir.to_path_buf(),
                msg: format!("phase {phase:?} layer {layer:?} has rows of differing width"),
            });
        }
        let n = layer_rows.len();
        let flat: Vec<f32> = layer_rows.into_iter().flatten().collect();
        let matrix = Array2::from_shape_vec((n, width), flat).map_err(|e| {
            EvalError::FeatureStore {
                path: data_dir.to_path_buf(),
                msg: e.to_string(),
            }
        })?;
        matrices.insert(layer.to_string(), matrix);
    }
    Ok(PhaseData {
        names,
        labels,
        layers: matrices,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunked_phases_use_numbered_files() {
        let dir = Path::new("/data");
        assert_eq!(phase_files(dir, "test", None), vec![dir.join("test.json")]);
        assert_eq!(
            phase_files(dir, "test", Some(&[0, 2][..])),
            vec![dir.join("test.0.json"), dir.join("test.2.json")]
        );
    }
}
