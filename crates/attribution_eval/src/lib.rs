//! Painting attribution evaluation.
//!
//! Scores a trained classifier on precomputed patch features: raw per-patch
//! accuracy, painting accuracy for each fusion strategy, and recapture
//! accuracy, collected into one JSON report per run.

pub mod config;
pub mod driver;
pub mod error;
pub mod features;
pub mod metrics;
pub mod model;
pub mod report;

pub use config::EvalConfig;
pub use driver::{evaluate, run, run_with_model, EvaluateOptions};
pub use error::{EvalError, EvalResult};
pub use features::{load_features, PhaseData};
pub use model::{Checkpoint, Classifier, ClassifierKind, LinearClassifier, PredictionCapability};
pub use report::{
    EvaluationReport, GroupSummary, LayerReport, RecaptureEvaluation, StrategyEvaluation,
};
