//! Error types for Wellness Labs
//!
//! Degenerate input (empty buffers, silence, zero variance) never produces an
//! error; those cases have defined neutral results. The variants here cover
//! upstream capture failures, malformed frames and boundary (JSON/IO) issues.

use thiserror::Error;

/// Errors that can occur while capturing, processing or encoding lab data
#[derive(Debug, Error)]
pub enum LabError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Capture device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Inference backend failed to initialize: {0}")]
    BackendInit(String),

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encoding error: {0}")]
    EncodingError(String),
}

impl LabError {
    /// Whether this error originates in the capture layer (camera, microphone
    /// or inference backend) rather than in frame processing.
    pub fn is_capture_failure(&self) -> bool {
        matches!(
            self,
            LabError::PermissionDenied(_)
                | LabError::DeviceUnavailable(_)
                | LabError::BackendInit(_)
        )
    }
}
