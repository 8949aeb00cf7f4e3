//! Upload session: the state machine and part table for one logical upload.
//!
//! All mutation (part table, `bytes_uploaded`, state, pause reason) happens
//! under one per-session mutex; events are queued to the session's delivery
//! thread while that mutex is held, so subscribers observe transitions in the
//! order they happened. Worker threads block on the session condvar while
//! the session is paused or while every remaining part is in flight.

mod types;

pub use types::{Part, PartStatus, PauseReason, SessionState, Snapshot, UploadResult};

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::control::CancelToken;
use crate::error::UploadError;
use crate::event::{EventEmitter, EventKind, UploadEvent};
use crate::planner::PartRange;
use crate::retry::{classify, PartError, RetryDecision, RetryPolicy};
use crate::scheduler::ProgressStats;
use crate::worker::PartJob;

/// What a worker does after reporting an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Followup {
    /// Ask for the next part.
    Continue,
    /// Wait this long, then hand the part back with `end_backoff`.
    Backoff(Duration),
}

struct SessionInner {
    state: SessionState,
    pause_reason: Option<PauseReason>,
    parts: Vec<Part>,
    /// Indexes into `parts` waiting for dispatch.
    queue: VecDeque<usize>,
    /// Parts taken by a worker and not yet finished (attempt or backoff).
    in_flight: usize,
    bytes_uploaded: u64,
    started_at: Option<Instant>,
    finished_at: Option<Instant>,
    last_error: Option<String>,
    events: Option<EventEmitter>,
}

impl SessionInner {
    fn emit(&self, event: UploadEvent) {
        if let Some(events) = &self.events {
            events.emit(event);
        }
    }

    fn parts_done(&self) -> usize {
        self.parts
            .iter()
            .filter(|p| p.status == PartStatus::Done)
            .count()
    }

    fn failed_parts(&self) -> Vec<u32> {
        self.parts
            .iter()
            .filter(|p| p.status == PartStatus::Failed)
            .map(|p| p.part_number)
            .collect()
    }
}

/// One logical upload. Shared between the registry, its scheduler workers,
/// and control callers through `Arc<UploadSession>`.
pub struct UploadSession {
    upload_id: String,
    file_path: PathBuf,
    total_bytes: u64,
    max_parallel: usize,
    cancel: CancelToken,
    inner: Mutex<SessionInner>,
    wake: Condvar,
}

impl UploadSession {
    /// Builds an Idle session from a part plan. `plan` and `urls` must have
    /// the same length (one URL per part, in part order).
    pub(crate) fn new(
        upload_id: String,
        file_path: PathBuf,
        plan: &[PartRange],
        urls: Vec<String>,
        max_parallel: usize,
        events: EventEmitter,
    ) -> Self {
        debug_assert_eq!(plan.len(), urls.len());
        let parts: Vec<Part> = plan
            .iter()
            .zip(urls)
            .map(|(range, url)| Part {
                part_number: range.part_number,
                url,
                offset: range.offset,
                size: range.size,
                etag: None,
                attempts: 0,
                status: PartStatus::Pending,
            })
            .collect();
        let total_bytes = plan.iter().map(|r| r.size).sum();
        Self {
            upload_id,
            file_path,
            total_bytes,
            max_parallel,
            cancel: CancelToken::new(),
            inner: Mutex::new(SessionInner {
                state: SessionState::Idle,
                pause_reason: None,
                queue: (0..parts.len()).collect(),
                parts,
                in_flight: 0,
                bytes_uploaded: 0,
                started_at: None,
                finished_at: None,
                last_error: None,
                events: Some(events),
            }),
            wake: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn invalid_state(&self, state: SessionState) -> UploadError {
        UploadError::InvalidState {
            upload_id: self.upload_id.clone(),
            state,
        }
    }

    pub fn upload_id(&self) -> &str {
        &self.upload_id
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    pub fn part_count(&self) -> usize {
        self.lock().parts.len()
    }

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    pub fn pause_reason(&self) -> Option<PauseReason> {
        self.lock().pause_reason
    }

    /// Copy of the part table, ordered by part number.
    pub fn parts(&self) -> Vec<Part> {
        self.lock().parts.clone()
    }

    pub(crate) fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Idle → Uploading.
    pub fn start(&self) -> Result<(), UploadError> {
        let mut inner = self.lock();
        if inner.state != SessionState::Idle {
            return Err(self.invalid_state(inner.state));
        }
        inner.state = SessionState::Uploading;
        inner.started_at = Some(Instant::now());
        inner.emit(UploadEvent::new(EventKind::UploadStarted, &self.upload_id).with_progress(0, self.total_bytes));
        tracing::info!(
            upload_id = %self.upload_id,
            parts = inner.parts.len(),
            total_bytes = self.total_bytes,
            max_parallel = self.max_parallel,
            "upload started"
        );
        self.wake.notify_all();
        Ok(())
    }

    /// Uploading → Paused. Parts already in flight finish their current
    /// attempt; nothing new is dispatched until resume.
    ///
    /// Pausing an already-paused session is a no-op, except that a user pause
    /// replaces a network pause (so connectivity restore will not lift it).
    pub fn pause(&self, reason: PauseReason) -> Result<(), UploadError> {
        let mut inner = self.lock();
        self.pause_locked(&mut inner, reason)
    }

    fn pause_locked(&self, inner: &mut SessionInner, reason: PauseReason) -> Result<(), UploadError> {
        match inner.state {
            SessionState::Uploading => {
                inner.state = SessionState::Paused;
                inner.pause_reason = Some(reason);
                inner.emit(
                    UploadEvent::new(EventKind::UploadPaused, &self.upload_id)
                        .with_progress(inner.bytes_uploaded, self.total_bytes),
                );
                tracing::info!(upload_id = %self.upload_id, ?reason, "upload paused");
                Ok(())
            }
            SessionState::Paused => {
                if reason == PauseReason::User && inner.pause_reason == Some(PauseReason::Network) {
                    inner.pause_reason = Some(PauseReason::User);
                    tracing::debug!(upload_id = %self.upload_id, "network pause upgraded to user pause");
                }
                Ok(())
            }
            state => Err(self.invalid_state(state)),
        }
    }

    /// Paused → Uploading, unless the session was paused by the user and the
    /// caller is the network side (then the resume is suppressed). Resuming a
    /// session that is already uploading is a no-op.
    pub fn resume(&self, source: PauseReason) -> Result<(), UploadError> {
        let mut inner = self.lock();
        self.resume_locked(&mut inner, source)
    }

    fn resume_locked(&self, inner: &mut SessionInner, source: PauseReason) -> Result<(), UploadError> {
        match inner.state {
            SessionState::Paused => {
                if inner.pause_reason == Some(PauseReason::User) && source == PauseReason::Network {
                    tracing::debug!(
                        upload_id = %self.upload_id,
                        "connectivity restored but upload was paused by user; staying paused"
                    );
                    return Ok(());
                }
                inner.state = SessionState::Uploading;
                inner.pause_reason = None;
                inner.emit(
                    UploadEvent::new(EventKind::UploadResumed, &self.upload_id)
                        .with_progress(inner.bytes_uploaded, self.total_bytes),
                );
                tracing::info!(upload_id = %self.upload_id, ?source, "upload resumed");
                self.wake.notify_all();
                Ok(())
            }
            SessionState::Uploading => Ok(()),
            state => Err(self.invalid_state(state)),
        }
    }

    /// Any non-terminal state → Cancelled. Aborts in-flight requests, drops
    /// queued work, and wakes every waiting worker. Returns false (and does
    /// nothing) if the session had already reached a terminal state.
    pub fn cancel(&self) -> bool {
        let mut inner = self.lock();
        if inner.state.is_terminal() {
            return false;
        }
        inner.state = SessionState::Cancelled;
        inner.pause_reason = None;
        inner.queue.clear();
        inner.finished_at = Some(Instant::now());
        self.cancel.cancel();
        inner.emit(
            UploadEvent::new(EventKind::UploadCancelled, &self.upload_id)
                .with_progress(inner.bytes_uploaded, self.total_bytes),
        );
        tracing::info!(upload_id = %self.upload_id, "upload cancelled");
        self.wake.notify_all();
        true
    }

    /// Emits `network-lost`, then pauses with reason Network. No-op on
    /// idle or terminal sessions.
    pub fn network_lost(&self) {
        let mut inner = self.lock();
        if inner.state.is_terminal() || inner.state == SessionState::Idle {
            return;
        }
        inner.emit(UploadEvent::new(EventKind::NetworkLost, &self.upload_id));
        if let Err(e) = self.pause_locked(&mut inner, PauseReason::Network) {
            tracing::debug!(upload_id = %self.upload_id, "network pause skipped: {}", e);
        }
    }

    /// Emits `network-restored`, then resumes unless the user paused.
    pub fn network_restored(&self) {
        let mut inner = self.lock();
        if inner.state.is_terminal() || inner.state == SessionState::Idle {
            return;
        }
        inner.emit(UploadEvent::new(EventKind::NetworkRestored, &self.upload_id));
        if let Err(e) = self.resume_locked(&mut inner, PauseReason::Network) {
            tracing::debug!(upload_id = %self.upload_id, "network resume skipped: {}", e);
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        let inner = self.lock();
        let elapsed = match (inner.started_at, inner.finished_at) {
            (Some(start), Some(end)) => end.duration_since(start),
            (Some(start), None) => start.elapsed(),
            _ => Duration::ZERO,
        };
        let stats = ProgressStats {
            bytes_done: inner.bytes_uploaded,
            total_bytes: self.total_bytes,
            elapsed_secs: elapsed.as_secs_f64(),
            parts_done: inner.parts_done(),
            part_count: inner.parts.len(),
        };
        Snapshot {
            upload_id: self.upload_id.clone(),
            state: inner.state,
            progress: stats.fraction(),
            bytes_uploaded: inner.bytes_uploaded,
            total_bytes: self.total_bytes,
            is_paused: inner.state == SessionState::Paused,
            pause_reason: inner.pause_reason,
            parts_done: stats.parts_done,
            part_count: stats.part_count,
            elapsed_secs: stats.elapsed_secs,
            bytes_per_sec: stats.bytes_per_sec(),
            eta_secs: stats.eta_secs(),
        }
    }

    /// Terminal result. Before a terminal state is reached this reports
    /// `success = false` with the current state.
    pub fn result(&self) -> UploadResult {
        let inner = self.lock();
        let success = inner.state == SessionState::Completed;
        let etags = if success {
            inner
                .parts
                .iter()
                .map(|p| p.etag.clone().unwrap_or_default())
                .collect()
        } else {
            Vec::new()
        };
        let error = match inner.state {
            SessionState::Completed => None,
            SessionState::Cancelled => Some("upload cancelled".to_string()),
            SessionState::Failed => Some(failure_summary(&inner.failed_parts(), inner.last_error.as_deref())),
            state => Some(format!("upload did not finish (state: {})", state)),
        };
        UploadResult {
            upload_id: self.upload_id.clone(),
            success,
            etags,
            state: inner.state,
            failed_parts: inner.failed_parts(),
            error,
        }
    }

    // ------------------------------------------------------------------
    // Scheduler side
    // ------------------------------------------------------------------

    /// Blocks until a part may be dispatched and claims it. Returns `None`
    /// once the session is terminal or there is nothing left to dispatch.
    pub(crate) fn next_job(&self) -> Option<PartJob> {
        let mut inner = self.lock();
        loop {
            match inner.state {
                SessionState::Uploading => {
                    if let Some(idx) = inner.queue.pop_front() {
                        inner.in_flight += 1;
                        let part = &mut inner.parts[idx];
                        part.status = PartStatus::InFlight;
                        part.attempts += 1;
                        return Some(PartJob {
                            part_number: part.part_number,
                            url: part.url.clone(),
                            offset: part.offset,
                            size: part.size,
                            attempt: part.attempts,
                        });
                    }
                    if inner.in_flight == 0 {
                        return None;
                    }
                }
                SessionState::Paused => {
                    if inner.queue.is_empty() && inner.in_flight == 0 {
                        return None;
                    }
                }
                SessionState::Idle => {}
                SessionState::Completed | SessionState::Failed | SessionState::Cancelled => {
                    return None;
                }
            }
            inner = self.wake.wait(inner).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Records the outcome of one attempt for `job`.
    pub(crate) fn finish_attempt(
        &self,
        job: &PartJob,
        outcome: Result<String, PartError>,
        policy: &RetryPolicy,
    ) -> Followup {
        let mut inner = self.lock();
        let idx = (job.part_number - 1) as usize;

        if inner.state.is_terminal() {
            inner.in_flight = inner.in_flight.saturating_sub(1);
            self.wake.notify_all();
            return Followup::Continue;
        }

        match outcome {
            Ok(etag) => {
                let part = &mut inner.parts[idx];
                part.status = PartStatus::Done;
                part.etag = Some(etag);
                let size = part.size;
                inner.bytes_uploaded += size;
                inner.in_flight -= 1;
                tracing::debug!(
                    upload_id = %self.upload_id,
                    part = job.part_number,
                    attempt = job.attempt,
                    "part uploaded"
                );
                inner.emit(
                    UploadEvent::new(EventKind::ChunkCompleted, &self.upload_id)
                        .with_chunk(job.part_number - 1)
                        .with_progress(inner.bytes_uploaded, self.total_bytes),
                );
                inner.emit(
                    UploadEvent::new(EventKind::UploadProgress, &self.upload_id)
                        .with_progress(inner.bytes_uploaded, self.total_bytes),
                );
                self.conclude_if_drained(&mut inner);
                Followup::Continue
            }
            Err(e) => {
                let kind = classify(&e);
                match policy.decide(job.attempt, kind) {
                    RetryDecision::RetryAfter(delay) => {
                        inner.parts[idx].status = PartStatus::Pending;
                        tracing::warn!(
                            upload_id = %self.upload_id,
                            part = job.part_number,
                            attempt = job.attempt,
                            ?kind,
                            delay_ms = delay.as_millis() as u64,
                            "part attempt failed, retrying: {}",
                            e
                        );
                        Followup::Backoff(delay)
                    }
                    RetryDecision::NoRetry => {
                        let message = format!("part {}: {}", job.part_number, e);
                        inner.parts[idx].status = PartStatus::Failed;
                        inner.in_flight -= 1;
                        tracing::warn!(
                            upload_id = %self.upload_id,
                            part = job.part_number,
                            attempts = job.attempt,
                            "part failed permanently: {}",
                            e
                        );
                        inner.emit(
                            UploadEvent::new(EventKind::ChunkFailed, &self.upload_id)
                                .with_chunk(job.part_number - 1)
                                .with_error(message.clone()),
                        );
                        inner.last_error = Some(message);
                        self.conclude_if_drained(&mut inner);
                        Followup::Continue
                    }
                }
            }
        }
    }

    /// Ends the backoff of a part that `finish_attempt` scheduled for retry,
    /// putting it back at the end of the queue.
    pub(crate) fn end_backoff(&self, job: &PartJob) {
        let mut inner = self.lock();
        inner.in_flight = inner.in_flight.saturating_sub(1);
        if !inner.state.is_terminal() {
            inner.queue.push_back((job.part_number - 1) as usize);
        }
        self.wake.notify_all();
    }

    /// Marks the session failed for a reason outside any part (e.g. a worker
    /// thread could not be started or panicked).
    pub(crate) fn fail(&self, message: &str) {
        let mut inner = self.lock();
        if inner.state.is_terminal() {
            return;
        }
        inner.last_error = Some(message.to_string());
        inner.queue.clear();
        self.cancel.cancel();
        self.enter_terminal(&mut inner, SessionState::Failed);
    }

    /// Takes the event emitter and waits until every queued event has been
    /// delivered. Called once, after the scheduler has returned.
    pub(crate) fn close_events(&self) {
        let emitter = self.lock().events.take();
        if let Some(emitter) = emitter {
            emitter.close();
        }
    }

    fn conclude_if_drained(&self, inner: &mut SessionInner) {
        if !inner.queue.is_empty() || inner.in_flight > 0 {
            return;
        }
        let next = if inner.parts.iter().any(|p| p.status == PartStatus::Failed) {
            SessionState::Failed
        } else if inner.parts.iter().all(|p| p.status == PartStatus::Done) {
            SessionState::Completed
        } else {
            return;
        };
        self.enter_terminal(inner, next);
    }

    fn enter_terminal(&self, inner: &mut SessionInner, state: SessionState) {
        inner.state = state;
        inner.pause_reason = None;
        inner.finished_at = Some(Instant::now());
        match state {
            SessionState::Completed => {
                debug_assert_eq!(inner.bytes_uploaded, self.total_bytes);
                tracing::info!(upload_id = %self.upload_id, "upload completed");
                inner.emit(
                    UploadEvent::new(EventKind::UploadCompleted, &self.upload_id)
                        .with_progress(inner.bytes_uploaded, self.total_bytes),
                );
            }
            SessionState::Failed => {
                let summary = failure_summary(&inner.failed_parts(), inner.last_error.as_deref());
                tracing::warn!(upload_id = %self.upload_id, "upload failed: {}", summary);
                inner.emit(
                    UploadEvent::new(EventKind::UploadFailed, &self.upload_id)
                        .with_progress(inner.bytes_uploaded, self.total_bytes)
                        .with_error(summary),
                );
            }
            _ => {}
        }
        self.wake.notify_all();
    }
}

fn failure_summary(failed: &[u32], last_error: Option<&str>) -> String {
    let mut out = if failed.is_empty() {
        "upload failed".to_string()
    } else {
        let list: Vec<String> = failed.iter().map(|n| n.to_string()).collect();
        format!("parts failed: {}", list.join(", "))
    };
    if let Some(e) = last_error {
        out.push_str(" (last error: ");
        out.push_str(e);
        out.push(')');
    }
    out
}

impl std::fmt::Debug for UploadSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadSession")
            .field("upload_id", &self.upload_id)
            .field("file_path", &self.file_path)
            .field("total_bytes", &self.total_bytes)
            .field("state", &self.state())
            .finish()
    }
}
