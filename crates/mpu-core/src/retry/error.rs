//! Part attempt error type for retry classification.

use std::fmt;

use crate::transport::TransportError;

/// Error from one part attempt (read, PUT, or response check).
#[derive(Debug)]
pub enum PartError {
    /// No HTTP response (connect failure, timeout, reset).
    Transport(TransportError),
    /// Response had a non-2xx status.
    Http(u32),
    /// Source file yielded fewer bytes than the part length.
    ShortRead { expected: u64, received: u64 },
    /// Source file could not be read.
    Io(std::io::Error),
    /// The session was cancelled before or during the attempt.
    Cancelled,
}

impl fmt::Display for PartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartError::Transport(e) => write!(f, "{}", e),
            PartError::Http(code) => write!(f, "HTTP {}", code),
            PartError::ShortRead { expected, received } => {
                write!(f, "short read: expected {} bytes, got {}", expected, received)
            }
            PartError::Io(e) => write!(f, "read failed: {}", e),
            PartError::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::error::Error for PartError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PartError::Transport(e) => Some(e),
            PartError::Io(e) => Some(e),
            PartError::Http(_) | PartError::ShortRead { .. } | PartError::Cancelled => None,
        }
    }
}

impl From<TransportError> for PartError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Aborted => PartError::Cancelled,
            TransportError::Body(e) => PartError::Io(e),
            other => PartError::Transport(other),
        }
    }
}
