// src/error.rs

use thiserror::Error;

/// Errors raised by the recognition pipeline.
///
/// `InsufficientSamples` and `UndersampledScatter` are scoped to one feature
/// algorithm: the orchestrator records them and keeps training the others.
/// Every other variant aborts the run.
#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("dimension mismatch in {op}: {detail}")]
    DimensionMismatch { op: &'static str, detail: String },

    #[error("singular matrix in {0}")]
    Singularity(String),

    #[error("within-class scatter matrix is singular ({0}); too few samples per class for the PCA stage dimension")]
    UndersampledScatter(String),

    #[error("insufficient samples: {0}")]
    InsufficientSamples(String),

    #[error("unknown {kind} '{value}' (expected one of: {expected})")]
    UnknownSelector {
        kind: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("I/O failure on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed data in {path}: {detail}")]
    Format { path: String, detail: String },

    #[error("ICA component {component} did not converge within {iterations} iterations")]
    NonConvergence { component: usize, iterations: usize },

    #[error("non-finite values produced by {0}")]
    NonFinite(String),

    #[error("invalid model state: {0}")]
    InvalidState(String),

    #[error("linear algebra backend failure in {op}: {detail}")]
    Backend { op: &'static str, detail: String },
}

impl RecognitionError {
    pub(crate) fn dims(op: &'static str, detail: impl Into<String>) -> Self {
        RecognitionError::DimensionMismatch {
            op,
            detail: detail.into(),
        }
    }

    pub(crate) fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        RecognitionError::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    /// True for failures that only disqualify the feature algorithm that raised them.
    pub fn is_per_algorithm(&self) -> bool {
        matches!(
            self,
            RecognitionError::InsufficientSamples(_) | RecognitionError::UndersampledScatter(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, RecognitionError>;
