use serde::Serialize;
use thiserror::Error;

use crate::validation::ValidationError;

/// Fallback message when the pipeline reports a failure without one.
pub const GENERIC_CAPTURE_FAILURE: &str = "Street view capture failed";

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("capture service returned {status}: {body}")]
    Server { status: u16, body: String },

    #[error("invalid response from capture service: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("{0}")]
    Pipeline(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("unusable capture endpoint: {0}")]
    Endpoint(String),

    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

impl CaptureError {
    /// Transport-level failures worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, CaptureError::Http(_) | CaptureError::Server { .. })
    }

    /// Build a pipeline failure, substituting the generic message when the
    /// pipeline did not supply one.
    pub fn pipeline(message: Option<String>) -> Self {
        match message {
            Some(msg) if !msg.trim().is_empty() => CaptureError::Pipeline(msg),
            _ => CaptureError::Pipeline(GENERIC_CAPTURE_FAILURE.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Transport,
    Pipeline,
    Invalid,
    Cancelled,
    Internal,
}

/// Cloneable summary of a failed operation.
///
/// Coalesced callers share one result, so the non-`Clone` [`CaptureError`]
/// is flattened into this before it leaves an orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptureFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl CaptureFailure {
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Internal,
            message: message.into(),
        }
    }

    pub fn cancelled() -> Self {
        CaptureFailure::from(&CaptureError::Cancelled)
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == FailureKind::Cancelled
    }
}

impl From<&CaptureError> for CaptureFailure {
    fn from(err: &CaptureError) -> Self {
        let kind = match err {
            CaptureError::Http(_) | CaptureError::Server { .. } | CaptureError::Decode(_) => {
                FailureKind::Transport
            }
            CaptureError::Pipeline(_) => FailureKind::Pipeline,
            CaptureError::Cancelled => FailureKind::Cancelled,
            CaptureError::Endpoint(_) => FailureKind::Internal,
            CaptureError::Invalid(_) => FailureKind::Invalid,
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }
}

impl From<CaptureError> for CaptureFailure {
    fn from(err: CaptureError) -> Self {
        CaptureFailure::from(&err)
    }
}
