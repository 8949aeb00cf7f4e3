//! Connectivity signals.
//!
//! A `NetworkObserver` reports connectivity transitions on a channel; the
//! registry applies each one to every active upload (see
//! `UploadRegistry::attach_network_observer`). Observers report transitions
//! only, never repeated states.

mod probe;

pub use probe::TcpProbeObserver;

use std::future::Future;
use std::pin::Pin;

use serde::Serialize;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NetworkEvent {
    ConnectivityLost,
    ConnectivityRestored,
}

/// Boxed future returned by [`NetworkObserver::watch`].
pub type WatchFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Source of connectivity transitions. `watch` runs until the observer has
/// nothing more to report or the receiving side of `tx` is dropped.
pub trait NetworkObserver: Send + 'static {
    fn watch(self, tx: mpsc::Sender<NetworkEvent>) -> WatchFuture;
}

/// Observer fed by hand, for hosts that already know about connectivity
/// changes (and for tests).
pub struct ChannelObserver {
    rx: mpsc::Receiver<NetworkEvent>,
}

impl ChannelObserver {
    /// The observer plus the sender used to feed it. The observer ends when
    /// every sender is dropped.
    pub fn new() -> (Self, mpsc::Sender<NetworkEvent>) {
        let (tx, rx) = mpsc::channel(16);
        (Self { rx }, tx)
    }
}

impl NetworkObserver for ChannelObserver {
    fn watch(mut self, tx: mpsc::Sender<NetworkEvent>) -> WatchFuture {
        Box::pin(async move {
            let mut last = None;
            while let Some(event) = self.rx.recv().await {
                if last == Some(event) {
                    continue;
                }
                last = Some(event);
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        })
    }
}

/// Collapses a stream of online/offline samples into transitions. The first
/// sample only reports if it is offline (the engine assumes it starts online).
#[derive(Debug, Default)]
pub(crate) struct Transitions {
    online: Option<bool>,
}

impl Transitions {
    pub(crate) fn observe(&mut self, online: bool) -> Option<NetworkEvent> {
        let previous = self.online.replace(online);
        match (previous.unwrap_or(true), online) {
            (true, false) => Some(NetworkEvent::ConnectivityLost),
            (false, true) => Some(NetworkEvent::ConnectivityRestored),
            _ => None,
        }
    }
}
