//! Part scheduler.
//!
//! Runs up to `max_parallel` worker threads against one session. Each worker
//! claims the next pending part, performs one attempt, reports the outcome,
//! and (on a retryable failure) sleeps out the backoff before handing the
//! part back. Pausing holds dispatch; cancelling aborts everything.

mod progress;
mod run;

pub use progress::ProgressStats;
pub use run::run_session;
