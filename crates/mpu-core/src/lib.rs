//! Resumable multipart upload engine.
//!
//! Splits a local file into parts, PUTs each part to its presigned URL with
//! bounded parallelism and retries, and reports progress and lifecycle
//! events. `UploadRegistry` is the entry point.

pub mod config;
pub mod control;
pub mod error;
pub mod event;
pub mod keepalive;
pub mod logging;
pub mod network;
pub mod planner;
pub mod registry;
pub mod retry;
pub mod scheduler;
pub mod session;
pub mod source;
pub mod transport;
pub mod worker;

pub use error::UploadError;
pub use event::{EventFilter, EventKind, UploadEvent};
pub use network::NetworkEvent;
pub use registry::{UploadHandle, UploadOptions, UploadRegistry, UploadRequest};
pub use session::{PauseReason, SessionState, Snapshot, UploadResult};
