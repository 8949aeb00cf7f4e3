//! Classify HTTP status and transport errors into retry policy error kinds.

use crate::retry::error::PartError;
use crate::retry::policy::ErrorKind;
use crate::transport::TransportError;

/// Classify an HTTP status code.
pub fn classify_http_status(code: u32) -> ErrorKind {
    match code {
        429 | 503 => ErrorKind::Throttled,
        500..=599 => ErrorKind::Http5xx(code as u16),
        _ => ErrorKind::HttpStatus(code as u16),
    }
}

/// Classify a transport failure.
pub fn classify_transport_error(e: &TransportError) -> ErrorKind {
    match e {
        TransportError::Aborted => ErrorKind::Cancelled,
        TransportError::Timeout(_) => ErrorKind::Timeout,
        TransportError::Connection(_) => ErrorKind::Connection,
        TransportError::Body(_) => ErrorKind::Io,
        TransportError::Other(_) => ErrorKind::Other,
    }
}

/// Classify a part attempt error.
pub fn classify(e: &PartError) -> ErrorKind {
    match e {
        PartError::Transport(te) => classify_transport_error(te),
        PartError::Http(code) => classify_http_status(*code),
        PartError::ShortRead { .. } | PartError::Io(_) => ErrorKind::Io,
        PartError::Cancelled => ErrorKind::Cancelled,
    }
}
