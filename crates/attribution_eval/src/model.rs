//! Trained classifiers consumed by the evaluation driver.
//!
//! The driver never calls a method just to see whether it fails; it asks
//! [`Classifier::capability`] up front and picks the fusion inputs from the
//! answer.

use crate::error::{EvalError, EvalResult};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use patch_fusion::strategies::argmax;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Which per-patch outputs a classifier can produce besides hard labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionCapability {
    /// `predict_proba` is available.
    Probabilistic,
    /// `decision_function` is available.
    MarginBased,
    /// Only hard labels.
    LabelsOnly,
}

pub trait Classifier {
    fn n_classes(&self) -> usize;

    fn capability(&self) -> PredictionCapability;

    /// Display name per label id; defaults to the ids themselves.
    fn class_names(&self) -> Vec<String> {
        (0..self.n_classes()).map(|c| c.to_string()).collect()
    }

    /// Hard labels, one per row of `x`.
    fn predict(&self, x: ArrayView2<f32>) -> EvalResult<Array1<usize>>;

    /// Class probabilities, `[rows, n_classes]`.
    fn predict_proba(&self, _x: ArrayView2<f32>) -> EvalResult<Array2<f64>> {
        Err(EvalError::ModelCapability(
            "model does not produce class probabilities".into(),
        ))
    }

    /// Signed hyperplane distances, `[rows, 1]` for binary models and
    /// `[rows, n_classes]` otherwise.
    fn decision_function(&self, _x: ArrayView2<f32>) -> EvalResult<Array2<f64>> {
        Err(EvalError::ModelCapability(
            "model does not produce decision distances".into(),
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierKind {
    LogisticRegression,
    LinearSvc,
    NearestCentroid,
}

/// On-disk checkpoint layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub kind: ClassifierKind,
    pub classes: Vec<String>,
    /// Weight rows for linear models, centroids for `nearest_centroid`.
    pub coef: Vec<Vec<f64>>,
    #[serde(default)]
    pub intercept: Vec<f64>,
}

/// A linear model (or nearest-centroid model) loaded from a JSON checkpoint.
#[derive(Debug, Clone)]
pub struct LinearClassifier {
    kind: ClassifierKind,
    classes: Vec<String>,
    coef: Array2<f64>,
    intercept: Array1<f64>,
}

impl LinearClassifier {
    pub fn load(path: &Path) -> EvalResult<Self> {
        let raw = fs::read_to_string(path).map_err(|e| EvalError::io(path, e))?;
        let checkpoint: Checkpoint =
            serde_json::from_str(&raw).map_err(|e| EvalError::json(path, e))?;
        Self::from_checkpoint(checkpoint).map_err(|msg| EvalError::Checkpoint {
            path: path.to_path_buf(),
            msg,
        })
    }

    pub fn from_checkpoint(ck: Checkpoint) -> Result<Self, String> {
        let n_classes = ck.classes.len();
        if n_classes < 2 {
            return Err(format!("need at least 2 classes, got {n_classes}"));
        }
        let expected_rows = match ck.kind {
            ClassifierKind::LogisticRegression | ClassifierKind::LinearSvc if n_classes == 2 => 1,
            _ => n_classes,
        };
        if ck.coef.len() != expected_rows {
            return Err(format!(
                "{:?} with {n_classes} classes needs {expected_rows} coefficient rows, got {}",
                ck.kind,
                ck.coef.len()
            ));
        }
        let dim = ck.coef[0].len();
        if dim == 0 || ck.coef.iter().any(|row| row.len() != dim) {
            return Err("coefficient rows must be non-empty and equally long".into());
        }
        let intercept = match (ck.kind, ck.intercept.len()) {
            (ClassifierKind::NearestCentroid, 0) => Array1::zeros(expected_rows),
            (_, n) if n == expected_rows => Array1::from(ck.intercept),
            (_, n) => {
                return Err(format!(
                    "expected {expected_rows} intercept values, got {n}"
                ))
            }
        };
        let flat: Vec<f64> = ck.coef.into_iter().flatten().collect();
        let coef = Array2::from_shape_vec((expected_rows, dim), flat)
            .map_err(|e| e.to_string())?;
        Ok(Self {
            kind: ck.kind,
            classes: ck.classes,
            coef,
            intercept,
        })
    }

    pub fn kind(&self) -> ClassifierKind {
        self.kind
    }

    pub fn feature_dim(&self) -> usize {
        self.coef.ncols()
    }

    fn check_dim(&self, x: &ArrayView2<f32>) -> EvalResult<()> {
        if x.ncols() != self.feature_dim() {
            return Err(EvalError::FeatureDim {
                expected: self.feature_dim(),
                found: x.ncols(),
            });
        }
        Ok(())
    }

    fn linear_scores(&self, x: ArrayView2<f32>) -> EvalResult<Array2<f64>> {
        self.check_dim(&x)?;
        let mut scores = x.mapv(f64::from).dot(&self.coef.t());
        scores += &self.intercept;
        Ok(scores)
    }

    fn nearest_centroid(&self, x: ArrayView2<f32>) -> EvalResult<Array1<usize>> {
        self.check_dim(&x)?;
        let x = x.mapv(f64::from);
        Ok(x.axis_iter(Axis(0))
            .map(|row| {
                let dist = self
                    .coef
                    .axis_iter(Axis(0))
                    .map(|c| -(&row - &c).mapv(|v| v * v).sum());
                argmax(Array1::from_iter(dist).view())
            })
            .collect())
    }
}

impl Classifier for LinearClassifier {
    fn n_classes(&self) -> usize {
        self.classes.len()
    }

    fn class_names(&self) -> Vec<String> {
        self.classes.clone()
    }

    fn capability(&self) -> PredictionCapability {
        match self.kind {
            ClassifierKind::LogisticRegression => PredictionCapability::Probabilistic,
            ClassifierKind::LinearSvc => PredictionCapability::MarginBased,
            ClassifierKind::NearestCentroid => PredictionCapability::LabelsOnly,
        }
    }

    fn predict(&self, x: ArrayView2<f32>) -> EvalResult<Array1<usize>> {
        if self.kind == ClassifierKind::NearestCentroid {
            return self.nearest_centroid(x);
        }
        let scores = self.linear_scores(x)?;
        Ok(if scores.ncols() == 1 {
            scores.column(0).mapv(|d| usize::from(d > 0.0))
        } else {
            scores.axis_iter(Axis(0)).map(argmax).collect()
        })
    }

    fn predict_proba(&self, x: ArrayView2<f32>) -> EvalResult<Array2<f64>> {
        if self.kind != ClassifierKind::LogisticRegression {
            return Err(EvalError::ModelCapability(format!(
                "{:?} does not produce class probabilities",
                self.kind
            )));
        }
        let scores = self.linear_scores(x)?;
        if scores.ncols() == 1 {
            let mut proba = Array2::zeros((scores.nrows(), 2));
            for (i, &d) in scores.column(0).iter().enumerate() {
                let p1 = 1.0 / (1.0 + (-d).exp());
                proba[[i, 0]] = 1.0 - p1;
                proba[[i, 1]] = p1;
            }
            return Ok(proba);
        }
        let mut proba = scores;
        for mut row in proba.axis_iter_mut(Axis(0)) {
            let max = row.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
            row.mapv_inplace(|v| (v - max).exp());
            let total = row.sum();
            row /= total;
        }
        Ok(proba)
    }

    fn decision_function(&self, x: ArrayView2<f32>) -> EvalResult<Array2<f64>> {
        if self.kind == ClassifierKind::NearestCentroid {
            return Err(EvalError::ModelCapability(
                "nearest_centroid does not produce decision distances".into(),
            ));
        }
        self.linear_scores(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn checkpoint(kind: ClassifierKind, classes: usize, coef: Vec<Vec<f64>>) -> Checkpoint {
        let rows = coef.len();
        Checkpoint {
            kind,
            classes: (0..classes).map(|c| format!("class{c}")).collect(),
            coef,
            intercept: vec![0.0; rows],
        }
    }

    #[test]
    fn binary_svc_uses_sign_of_margin() {
        let model = LinearClassifier::from_checkpoint(checkpoint(
            ClassifierKind::LinearSvc,
            2,
            vec![vec![1.0, -1.0]],
        ))
        .unwrap();
        let x = array![[2.0f32, 1.0], [0.0, 3.0], [1.0, 1.0]];
        assert_eq!(model.predict(x.view()).unwrap().to_vec(), vec![1, 0, 0]);
        let d = model.decision_function(x.view()).unwrap();
        assert_eq!(d.dim(), (3, 1));
        assert_eq!(d[[1, 0]], -3.0);
        assert_eq!(model.capability(), PredictionCapability::MarginBased);
        assert!(matches!(
            model.predict_proba(x.view()),
            Err(EvalError::ModelCapability(_))
        ));
    }

    #[test]
    fn logistic_probabilities_sum_to_one() {
        let binary = LinearClassifier::from_checkpoint(checkpoint(
            ClassifierKind::LogisticRegression,
            2,
            vec![vec![1.0]],
        ))
        .unwrap();
        let p = binary.predict_proba(array![[0.0f32], [4.0]].view()).unwrap();
        assert!((p[[0, 1]] - 0.5).abs() < 1e-12);
        assert!(p[[1, 1]] > 0.9);

        let multi = LinearClassifier::from_checkpoint(checkpoint(
            ClassifierKind::LogisticRegression,
            3,
            vec![vec![1.0], vec![0.0], vec![-1.0]],
        ))
        .unwrap();
        let p = multi.predict_proba(array![[2.0f32], [-2.0]].view()).unwrap();
        for row in p.axis_iter(Axis(0)) {
            assert!((row.sum() - 1.0).abs() < 1e-12);
        }
        assert_eq!(
            multi.predict(array![[2.0f32], [-2.0]].view()).unwrap().to_vec(),
            vec![0, 2]
        );
    }

    #[test]
    fn centroid_model_only_labels() {
        let model = LinearClassifier::from_checkpoint(Checkpoint {
            kind: ClassifierKind::NearestCentroid,
            classes: vec!["a".into(), "b".into()],
            coef: vec![vec![0.0, 0.0], vec![10.0, 10.0]],
            intercept: Vec::new(),
        })
        .unwrap();
        assert_eq!(model.capability(), PredictionCapability::LabelsOnly);
        let x = array![[1.0f32, 1.0], [9.0, 8.0]];
        assert_eq!(model.predict(x.view()).unwrap().to_vec(), vec![0, 1]);
        assert!(model.decision_function(x.view()).is_err());
        assert_eq!(model.class_names(), vec!["a", "b"]);
    }

    #[test]
    fn malformed_checkpoints_are_rejected() {
        let too_few = checkpoint(ClassifierKind::LinearSvc, 1, vec![vec![1.0]]);
        assert!(LinearClassifier::from_checkpoint(too_few).is_err());
        let wrong_rows = checkpoint(ClassifierKind::LinearSvc, 3, vec![vec![1.0]]);
        assert!(LinearClassifier::from_checkpoint(wrong_rows).is_err());
        let ragged = checkpoint(ClassifierKind::LinearSvc, 3, vec![vec![1.0], vec![], vec![2.0]]);
        assert!(LinearClassifier::from_checkpoint(ragged).is_err());
    }

    #[test]
    fn wrong_feature_width_is_reported() {
        let model = LinearClassifier::from_checkpoint(checkpoint(
            ClassifierKind::LinearSvc,
            2,
            vec![vec![1.0, 1.0]],
        ))
        .unwrap();
        assert!(matches!(
            model.predict(array![[1.0f32]].view()),
            Err(EvalError::FeatureDim { expected: 2, found: 1 })
        ));
    }
}
