//! Handle to a running upload's terminal result.

use tokio::sync::oneshot;

use crate::session::{SessionState, UploadResult};

/// Resolves to the upload's `UploadResult` once the session is terminal and
/// every one of its events has been delivered.
#[derive(Debug)]
pub struct UploadHandle {
    upload_id: String,
    rx: HandleInner,
}

#[derive(Debug)]
enum HandleInner {
    Pending(oneshot::Receiver<UploadResult>),
    Ready(UploadResult),
}

impl UploadHandle {
    pub(super) fn new(upload_id: String, rx: oneshot::Receiver<UploadResult>) -> Self {
        Self {
            upload_id,
            rx: HandleInner::Pending(rx),
        }
    }

    pub(super) fn finished(result: UploadResult) -> Self {
        Self {
            upload_id: result.upload_id.clone(),
            rx: HandleInner::Ready(result),
        }
    }

    pub fn upload_id(&self) -> &str {
        &self.upload_id
    }

    /// Wait for the terminal result.
    pub async fn wait(self) -> UploadResult {
        match self.rx {
            HandleInner::Ready(result) => result,
            HandleInner::Pending(rx) => rx.await.unwrap_or_else(|_| lost(self.upload_id)),
        }
    }

    /// Blocking variant of `wait` for callers outside an async runtime.
    pub fn wait_blocking(self) -> UploadResult {
        match self.rx {
            HandleInner::Ready(result) => result,
            HandleInner::Pending(rx) => rx.blocking_recv().unwrap_or_else(|_| lost(self.upload_id)),
        }
    }
}

/// The upload thread ended without reporting (it panicked).
fn lost(upload_id: String) -> UploadResult {
    UploadResult {
        upload_id,
        success: false,
        etags: Vec::new(),
        state: SessionState::Failed,
        failed_parts: Vec::new(),
        error: Some("upload thread exited without a result".into()),
    }
}
