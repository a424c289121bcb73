//! Error types shared by the fusion engine and grouping utilities.

use thiserror::Error;

pub type FusionResult<T> = Result<T, FusionError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FusionError {
    /// Required model outputs are missing or disagree on shape.
    #[error("invalid fusion input: {0}")]
    InvalidInput(String),
    /// Two samples of the same painting carry different true labels.
    #[error("group {group} mixes true labels {expected} and {found}")]
    InconsistentGroupLabel {
        group: String,
        expected: usize,
        found: usize,
    },
    /// Groups do not share a patch count and the policy rejects truncation.
    #[error("group {group} has {found} patches, expected {expected}")]
    RaggedGroup {
        group: String,
        expected: usize,
        found: usize,
    },
}

impl FusionError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        FusionError::InvalidInput(msg.into())
    }
}
