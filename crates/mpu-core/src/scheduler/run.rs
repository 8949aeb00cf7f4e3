//! Bounded worker pool for one session.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::retry::RetryPolicy;
use crate::session::{Followup, UploadResult, UploadSession};
use crate::source::RangeReader;
use crate::transport::PartTransport;
use crate::worker::upload_one_part;

/// Drives `session` until it reaches a terminal state and returns its result.
/// Blocks the calling thread; run it on a dedicated or blocking thread.
pub fn run_session(
    session: &Arc<UploadSession>,
    transport: Arc<dyn PartTransport>,
    reader: Arc<dyn RangeReader>,
    policy: RetryPolicy,
) -> UploadResult {
    let num_workers = session.max_parallel().min(session.part_count()).max(1);

    let spawned = std::thread::scope(|scope| {
        let mut handles = Vec::with_capacity(num_workers);
        for i in 0..num_workers {
            let worker_session = Arc::clone(session);
            let transport = Arc::clone(&transport);
            let reader = Arc::clone(&reader);
            let builder = std::thread::Builder::new().name(format!("mpu-part-{}", i));
            let res = builder.spawn_scoped(scope, move || {
                worker_loop(&worker_session, transport.as_ref(), reader.as_ref(), &policy)
            });
            match res {
                Ok(h) => handles.push(h),
                Err(e) => tracing::warn!(
                    upload_id = %session.upload_id(),
                    "could not start part worker {}: {}",
                    i,
                    e
                ),
            }
        }
        let started = handles.len();
        for h in handles {
            if h.join().is_err() {
                session.fail("part worker panicked");
            }
        }
        started
    });

    if spawned == 0 {
        session.fail("no part workers could be started");
    }

    session.result()
}

fn worker_loop(
    session: &UploadSession,
    transport: &dyn PartTransport,
    reader: &dyn RangeReader,
    policy: &RetryPolicy,
) {
    let cancel = session.cancel_token().clone();
    while let Some(job) = session.next_job() {
        tracing::debug!(
            upload_id = %session.upload_id(),
            part = job.part_number,
            attempt = job.attempt,
            offset = job.offset,
            size = job.size,
            "part attempt"
        );
        let outcome = match catch_unwind(AssertUnwindSafe(|| {
            upload_one_part(transport, reader, &job, &cancel)
        })) {
            Ok(outcome) => outcome,
            Err(_) => {
                session.fail(&format!("part {} attempt panicked", job.part_number));
                return;
            }
        };
        if let Followup::Backoff(delay) = session.finish_attempt(&job, outcome, policy) {
            // Interrupted by cancel: end_backoff sees the terminal state and drops the part.
            let _ = cancel.sleep(delay);
            session.end_backoff(&job);
        }
    }
}
