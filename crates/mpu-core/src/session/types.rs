//! Session data model: states, parts, snapshots, and the terminal result.

use serde::Serialize;
use std::fmt;

/// Lifecycle of one upload. Completed, Failed, and Cancelled are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Uploading,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Uploading => "uploading",
            SessionState::Paused => "paused",
            SessionState::Completed => "completed",
            SessionState::Failed => "failed",
            SessionState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Failed | SessionState::Cancelled
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who paused a session, or who is asking to resume it. A user pause is
/// stronger than a network pause: the network side can never lift it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PauseReason {
    User,
    Network,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PartStatus {
    Pending,
    InFlight,
    Done,
    Failed,
}

/// One part of the session's part table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    pub part_number: u32,
    pub url: String,
    pub offset: u64,
    pub size: u64,
    pub etag: Option<String>,
    pub attempts: u32,
    pub status: PartStatus,
}

/// Read-only view of a session at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub upload_id: String,
    pub state: SessionState,
    /// `bytes_uploaded / total_bytes` in [0, 1].
    pub progress: f64,
    pub bytes_uploaded: u64,
    pub total_bytes: u64,
    pub is_paused: bool,
    pub pause_reason: Option<PauseReason>,
    pub parts_done: usize,
    pub part_count: usize,
    pub elapsed_secs: f64,
    pub bytes_per_sec: f64,
    pub eta_secs: Option<f64>,
}

/// Terminal outcome of an upload. `etags` is ordered by part number and is
/// empty unless `success` (no partial results).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    pub upload_id: String,
    pub success: bool,
    pub etags: Vec<String>,
    pub state: SessionState,
    /// Part numbers that exhausted their attempts, ascending.
    pub failed_parts: Vec<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UploadResult {
    pub fn is_cancelled(&self) -> bool {
        self.state == SessionState::Cancelled
    }
}
