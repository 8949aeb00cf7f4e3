//! Typed upload events and the subscriber bus.
//!
//! Sessions publish through an `EventEmitter` (one delivery thread per
//! session, so events of one upload arrive in the order they happened); the
//! delivery thread hands each event to the shared `EventBus`, which fans it
//! out to subscribers. A panicking subscriber is logged and skipped.

mod bus;
mod delivery;

pub use bus::{EventBus, EventFilter, EventHandler, SubscriptionId};
pub(crate) use delivery::EventEmitter;

use serde::Serialize;

/// Every event kind an upload can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    UploadStarted,
    UploadProgress,
    UploadPaused,
    UploadResumed,
    UploadCompleted,
    UploadFailed,
    UploadCancelled,
    ChunkCompleted,
    ChunkFailed,
    NetworkLost,
    NetworkRestored,
}

impl EventKind {
    pub const ALL: [EventKind; 11] = [
        EventKind::UploadStarted,
        EventKind::UploadProgress,
        EventKind::UploadPaused,
        EventKind::UploadResumed,
        EventKind::UploadCompleted,
        EventKind::UploadFailed,
        EventKind::UploadCancelled,
        EventKind::ChunkCompleted,
        EventKind::ChunkFailed,
        EventKind::NetworkLost,
        EventKind::NetworkRestored,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::UploadStarted => "upload-started",
            EventKind::UploadProgress => "upload-progress",
            EventKind::UploadPaused => "upload-paused",
            EventKind::UploadResumed => "upload-resumed",
            EventKind::UploadCompleted => "upload-completed",
            EventKind::UploadFailed => "upload-failed",
            EventKind::UploadCancelled => "upload-cancelled",
            EventKind::ChunkCompleted => "chunk-completed",
            EventKind::ChunkFailed => "chunk-failed",
            EventKind::NetworkLost => "network-lost",
            EventKind::NetworkRestored => "network-restored",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }

    /// Completed, failed, or cancelled.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            EventKind::UploadCompleted | EventKind::UploadFailed | EventKind::UploadCancelled
        )
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One state or progress transition of one upload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub upload_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_uploaded: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_bytes: Option<u64>,
    /// 0-based index of the part (`part_number - 1`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl UploadEvent {
    pub fn new(kind: EventKind, upload_id: impl Into<String>) -> Self {
        Self {
            kind,
            upload_id: upload_id.into(),
            progress: None,
            bytes_uploaded: None,
            total_bytes: None,
            chunk_index: None,
            error_message: None,
        }
    }

    pub fn with_progress(mut self, bytes_uploaded: u64, total_bytes: u64) -> Self {
        self.bytes_uploaded = Some(bytes_uploaded);
        self.total_bytes = Some(total_bytes);
        self.progress = Some(if total_bytes == 0 {
            0.0
        } else {
            bytes_uploaded as f64 / total_bytes as f64
        });
        self
    }

    pub fn with_chunk(mut self, chunk_index: u32) -> Self {
        self.chunk_index = Some(chunk_index);
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }
}
