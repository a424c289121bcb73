//! Error types for evaluation runs.

use patch_fusion::FusionError;
use std::path::PathBuf;
use thiserror::Error;

pub type EvalResult<T> = Result<T, EvalError>;

#[derive(Debug, Error)]
pub enum EvalError {
    #[error(transparent)]
    Fusion(#[from] FusionError),
    /// The classifier offers neither probabilities nor decision distances.
    #[error("model capability error: {0}")]
    ModelCapability(String),
    #[error("model expects {expected} features per sample, got {found}")]
    FeatureDim { expected: usize, found: usize },
    #[error("invalid checkpoint {path}: {msg}")]
    Checkpoint { path: PathBuf, msg: String },
    #[error("feature store error at {path}: {msg}")]
    FeatureStore { path: PathBuf, msg: String },
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("json error at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("config error: {0}")]
    Config(String),
}

impl EvalError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EvalError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        EvalError::Json {
            path: path.into(),
            source,
        }
    }
}
