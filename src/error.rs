//! Error taxonomy (spec §7): kinds, not exception types. Stages return
//! `anyhow::Result<PipelineContext>` and attach a [`PipelineError`] variant
//! via `.context(...)` so the runner can classify failures without
//! downcasting exceptions.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("required file missing: {0}")]
    MissingFile(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("order categorization error: {0}")]
    Categorization(String),

    #[error("grading error: {0}")]
    Grading(String),

    #[error("pattern learning error: {0}")]
    Pattern(String),

    #[error("storage error writing table {table}: {detail}")]
    Storage { table: String, detail: String },

    #[error("run exceeded timeout")]
    Timeout,

    #[error("run cancelled")]
    Cancelled,
}

impl PipelineError {
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Config(_) => "ConfigError",
            PipelineError::MissingFile(_) => "MissingFile",
            PipelineError::Validation(_) => "ValidationError",
            PipelineError::Categorization(_) => "CategorizationError",
            PipelineError::Grading(_) => "GradingError",
            PipelineError::Pattern(_) => "PatternError",
            PipelineError::Storage { .. } => "StorageError",
            PipelineError::Timeout => "Timeout",
            PipelineError::Cancelled => "Cancelled",
        }
    }
}

/// Structured error attached to a failed [`crate::domain::PipelineRunResult`],
/// annotated with the stage that failed and how long the run had been
/// going when it aborted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBlock {
    pub kind: String,
    pub message: String,
    pub stage: String,
    pub elapsed_ms: u64,
}

impl ErrorBlock {
    pub fn new(error: &PipelineError, stage: &str, elapsed_ms: u64) -> Self {
        Self {
            kind: error.kind().to_string(),
            message: error.to_string(),
            stage: stage.to_string(),
            elapsed_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_match_taxonomy() {
        assert_eq!(PipelineError::MissingFile("labor".into()).kind(), "MissingFile");
        assert_eq!(PipelineError::Timeout.kind(), "Timeout");
        assert_eq!(
            PipelineError::Storage {
                table: "daily_operations".into(),
                detail: "disk full".into()
            }
            .kind(),
            "StorageError"
        );
    }
}
