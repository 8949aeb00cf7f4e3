//! Process-wide table of active uploads keyed by upload id.
//!
//! `UploadRegistry` is the engine's public surface: it validates and starts
//! uploads, routes pause/resume/cancel/state queries to the right session,
//! fans connectivity changes out to every session, and removes each session
//! exactly once when it ends (naturally or by cancel).

mod handle;
mod request;

pub use handle::UploadHandle;
pub use request::{clamp_parallel, UploadOptions, UploadRequest, MAX_PARALLEL, MIN_PARALLEL};

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::UploadError;
use crate::event::{EventBus, EventEmitter, EventFilter, SubscriptionId, UploadEvent};
use crate::keepalive::{KeepAlive, NoopKeepAlive};
use crate::network::{NetworkEvent, NetworkObserver};
use crate::scheduler;
use crate::session::{PauseReason, Snapshot, UploadSession};
use crate::source::RangeReader;
use crate::transport::PartTransport;

struct RegistryInner {
    sessions: RwLock<HashMap<String, Arc<UploadSession>>>,
    transport: Arc<dyn PartTransport>,
    keep_alive: Arc<dyn KeepAlive>,
    events: Arc<EventBus>,
}

/// Cheap to clone; all clones share the same table.
#[derive(Clone)]
pub struct UploadRegistry {
    inner: Arc<RegistryInner>,
}

impl UploadRegistry {
    /// Registry that sends parts with `transport` and no keep-alive collaborator.
    pub fn new(transport: Arc<dyn PartTransport>) -> Self {
        Self::with_keep_alive(transport, Arc::new(NoopKeepAlive))
    }

    pub fn with_keep_alive(
        transport: Arc<dyn PartTransport>,
        keep_alive: Arc<dyn KeepAlive>,
    ) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                sessions: RwLock::new(HashMap::new()),
                transport,
                keep_alive,
                events: Arc::new(EventBus::new()),
            }),
        }
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.inner.events
    }

    /// Register `handler` for one event kind or for every event.
    pub fn subscribe<F>(&self, filter: EventFilter, handler: F) -> SubscriptionId
    where
        F: Fn(&UploadEvent) + Send + Sync + 'static,
    {
        self.inner.events.subscribe(filter, handler)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.events.unsubscribe(id)
    }

    /// Drop every subscription registered with `filter`.
    pub fn unsubscribe_all(&self, filter: EventFilter) -> usize {
        self.inner.events.unsubscribe_filter(filter)
    }

    /// Validates `request`, registers a new session, and starts it in the
    /// background. Fails before any transfer begins with `Validation` or
    /// `AlreadyInProgress`. Await the returned handle for the terminal result.
    pub fn start_upload(&self, request: UploadRequest) -> Result<UploadHandle, UploadError> {
        if self.contains(&request.upload_id) {
            return Err(UploadError::AlreadyInProgress(request.upload_id));
        }
        let prepared = request::prepare(&request)?;
        let upload_id = request.upload_id;
        let max_parallel = clamp_parallel(request.options.max_parallel);

        let emitter = EventEmitter::spawn(
            &upload_id,
            Arc::clone(&self.inner.events),
            Arc::clone(&self.inner.keep_alive),
        );
        let session = Arc::new(UploadSession::new(
            upload_id.clone(),
            request.file_path,
            &prepared.plan,
            request.urls,
            max_parallel,
            emitter,
        ));

        {
            let mut sessions = self.write_sessions();
            if sessions.contains_key(&upload_id) {
                return Err(UploadError::AlreadyInProgress(upload_id));
            }
            // Started under the lock: other callers never see an Idle entry.
            session.start()?;
            sessions.insert(upload_id.clone(), Arc::clone(&session));
        }

        let registry = self.clone();
        let transport = Arc::clone(&self.inner.transport);
        let reader: Arc<dyn RangeReader> = Arc::new(prepared.reader);
        let policy = request.options.retry;
        let (tx, rx) = tokio::sync::oneshot::channel();
        let run_session = Arc::clone(&session);
        let spawned = std::thread::Builder::new()
            .name(format!("mpu-upload-{}", upload_id))
            .spawn(move || {
                let result = scheduler::run_session(&run_session, transport, reader, policy);
                registry.remove_if_current(run_session.upload_id(), &run_session);
                run_session.close_events();
                let _ = tx.send(result);
            });
        if let Err(e) = spawned {
            session.fail(&format!("could not start upload thread: {}", e));
            self.remove_if_current(&upload_id, &session);
            session.close_events();
            return Ok(UploadHandle::finished(session.result()));
        }

        Ok(UploadHandle::new(upload_id, rx))
    }

    /// User pause. Fails with `NotFound` for unknown ids.
    pub fn pause_upload(&self, upload_id: &str) -> Result<(), UploadError> {
        self.get(upload_id)?.pause(PauseReason::User)
    }

    /// User resume; lifts both user and network pauses.
    pub fn resume_upload(&self, upload_id: &str) -> Result<(), UploadError> {
        self.get(upload_id)?.resume(PauseReason::User)
    }

    /// Cancels and unregisters the upload. Succeeds even if the id is unknown
    /// or the upload already ended.
    pub fn cancel_upload(&self, upload_id: &str) -> Result<(), UploadError> {
        let removed = self.write_sessions().remove(upload_id);
        match removed {
            Some(session) => {
                session.cancel();
            }
            None => tracing::debug!(upload_id, "cancel for unknown upload ignored"),
        }
        Ok(())
    }

    pub fn get_upload_state(&self, upload_id: &str) -> Result<Snapshot, UploadError> {
        Ok(self.get(upload_id)?.snapshot())
    }

    /// The live session for `upload_id`.
    pub fn get(&self, upload_id: &str) -> Result<Arc<UploadSession>, UploadError> {
        self.read_sessions()
            .get(upload_id)
            .cloned()
            .ok_or_else(|| UploadError::NotFound(upload_id.to_string()))
    }

    pub fn contains(&self, upload_id: &str) -> bool {
        self.read_sessions().contains_key(upload_id)
    }

    /// Ids of every registered upload, sorted.
    pub fn active_uploads(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.read_sessions().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Applies a connectivity transition to every registered upload.
    pub fn handle_network_event(&self, event: NetworkEvent) {
        let sessions: Vec<Arc<UploadSession>> = self.read_sessions().values().cloned().collect();
        tracing::info!(?event, uploads = sessions.len(), "connectivity changed");
        for session in sessions {
            match event {
                NetworkEvent::ConnectivityLost => session.network_lost(),
                NetworkEvent::ConnectivityRestored => session.network_restored(),
            }
        }
    }

    /// Runs `observer` on the current Tokio runtime and applies every event it
    /// reports. The task ends when the observer returns.
    pub fn attach_network_observer<O>(&self, observer: O) -> tokio::task::JoinHandle<()>
    where
        O: NetworkObserver,
    {
        let registry = self.clone();
        tokio::spawn(async move {
            let (tx, mut rx) = tokio::sync::mpsc::channel(16);
            let watcher = tokio::spawn(observer.watch(tx));
            while let Some(event) = rx.recv().await {
                registry.handle_network_event(event);
            }
            if let Err(e) = watcher.await {
                tracing::warn!("network observer task failed: {}", e);
            }
        })
    }

    /// Removes `upload_id` only if it still maps to `session`, so a late
    /// removal never evicts a newer upload that reused the id.
    fn remove_if_current(&self, upload_id: &str, session: &Arc<UploadSession>) -> bool {
        let mut sessions = self.write_sessions();
        match sessions.get(upload_id) {
            Some(current) if Arc::ptr_eq(current, session) => {
                sessions.remove(upload_id);
                true
            }
            _ => false,
        }
    }

    fn read_sessions(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<UploadSession>>> {
        self.inner
            .sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
    }

    fn write_sessions(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<UploadSession>>> {
        self.inner
            .sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests;
