//! Retry and backoff policy for part attempts.
//!
//! Classifies attempt failures (timeouts, throttling, connection failures,
//! bad status, short reads) and decides whether and when a part is retried.
//! Every failure except cancellation is retryable until the attempt budget
//! runs out.

mod classify;
mod error;
mod policy;

pub use classify::{classify, classify_http_status, classify_transport_error};
pub use error::PartError;
pub use policy::{ErrorKind, RetryDecision, RetryPolicy};
