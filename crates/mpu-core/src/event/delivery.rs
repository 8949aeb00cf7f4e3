//! Per-session delivery thread: preserves event order within one upload and
//! drives the keep-alive collaborator off the session lock.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::keepalive::KeepAlive;

use super::{EventBus, EventKind, UploadEvent};

/// Sending half owned by a session. Dropping it (or calling `close`) ends the
/// delivery thread after the queued events are delivered.
pub(crate) struct EventEmitter {
    tx: Option<mpsc::Sender<UploadEvent>>,
    thread: Option<JoinHandle<()>>,
}

impl EventEmitter {
    pub(crate) fn spawn(
        upload_id: &str,
        bus: Arc<EventBus>,
        keep_alive: Arc<dyn KeepAlive>,
    ) -> Self {
        let (tx, rx) = mpsc::channel::<UploadEvent>();
        let spawned = std::thread::Builder::new()
            .name(format!("mpu-events-{}", upload_id))
            .spawn(move || deliver(rx, &bus, keep_alive.as_ref()));
        match spawned {
            Ok(thread) => Self {
                tx: Some(tx),
                thread: Some(thread),
            },
            Err(e) => {
                tracing::warn!(upload_id, "could not start event delivery thread: {}", e);
                Self {
                    tx: None,
                    thread: None,
                }
            }
        }
    }

    /// Queue `event` for delivery. Never blocks.
    pub(crate) fn emit(&self, event: UploadEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }

    /// Stop accepting events and wait until every queued event is delivered.
    pub(crate) fn close(mut self) {
        self.tx.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("event delivery thread panicked");
            }
        }
    }
}

fn deliver(rx: mpsc::Receiver<UploadEvent>, bus: &EventBus, keep_alive: &dyn KeepAlive) {
    while let Ok(event) = rx.recv() {
        drive_keep_alive(keep_alive, &event);
        bus.dispatch(&event);
    }
}

fn drive_keep_alive(keep_alive: &dyn KeepAlive, event: &UploadEvent) {
    let id = event.upload_id.as_str();
    let res = match event.kind {
        EventKind::UploadStarted => keep_alive.begin(id),
        EventKind::UploadProgress => {
            let percent = (event.progress.unwrap_or(0.0) * 100.0).round().clamp(0.0, 100.0) as u8;
            keep_alive.update(id, percent, &format!("Uploading {}%", percent))
        }
        EventKind::UploadPaused => keep_alive.update(
            id,
            (event.progress.unwrap_or(0.0) * 100.0).round().clamp(0.0, 100.0) as u8,
            "Paused",
        ),
        kind if kind.is_terminal() => keep_alive.end(id),
        _ => Ok(()),
    };
    if let Err(e) = res {
        tracing::warn!(upload_id = id, event = %event.kind, "keep-alive call failed: {:#}", e);
    }
}
