//! Caller-facing errors of the upload engine.

use crate::session::SessionState;

/// Errors returned by registry and session control operations. Per-attempt
/// transfer failures never surface here; they are retried and, if they
/// persist, reported through the terminal `UploadResult`.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// Bad input: empty id/path/urls, unusable file, or a file too small for the URL count.
    #[error("invalid upload request: {0}")]
    Validation(String),

    #[error("upload already in progress: {0}")]
    AlreadyInProgress(String),

    #[error("upload not found: {0}")]
    NotFound(String),

    /// The session exists but its state does not allow the operation.
    #[error("upload {upload_id} is {state}")]
    InvalidState {
        upload_id: String,
        state: SessionState,
    },
}
