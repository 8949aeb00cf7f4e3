//! HTTP PUT transport for part bodies.
//!
//! The engine only needs "stream this body to this URL and tell me the status
//! and headers". `PartTransport` is that seam; `CurlTransport` is the shipped
//! implementation. Every call receives the session's `CancelToken` and must
//! abort the request in flight once it is cancelled.

mod easy;

pub use easy::{CurlOptions, CurlTransport};

use std::io::Read;

use crate::control::CancelToken;

/// Status line and headers of a completed PUT.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutResponse {
    pub status: u32,
    /// Header (name, value) pairs in the order received.
    pub headers: Vec<(String, String)>,
}

impl PutResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// First header value whose name matches `name` case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Failure to obtain any HTTP response.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request aborted")]
    Aborted,
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("connection failed: {0}")]
    Connection(String),
    /// The request body could not be produced (source read failed or ended early).
    #[error("reading request body: {0}")]
    Body(std::io::Error),
    #[error("{0}")]
    Other(String),
}

/// Issues one PUT per call. Implementations must be safe to share across the
/// worker threads of a session. `body` yields exactly `len` bytes; a read
/// error from it ends the request with [`TransportError::Body`].
pub trait PartTransport: Send + Sync {
    fn put(
        &self,
        url: &str,
        body: &mut dyn Read,
        len: u64,
        cancel: &CancelToken,
    ) -> Result<PutResponse, TransportError>;
}

/// Parses one raw header line (`Name: value\r\n`). Status lines and blank
/// lines yield `None`.
pub(crate) fn parse_header_line(line: &str) -> Option<(String, String)> {
    let line = line.trim_end();
    if line.is_empty() || line.starts_with("HTTP/") {
        return None;
    }
    let (name, value) = line.split_once(':')?;
    Some((name.trim().to_string(), value.trim().to_string()))
}
