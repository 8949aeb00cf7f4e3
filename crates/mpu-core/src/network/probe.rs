//! Reachability probe: periodically opens a TCP connection to a known
//! endpoint and reports when that starts or stops working.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::mpsc;

use super::{NetworkEvent, NetworkObserver, Transitions, WatchFuture};

#[derive(Debug, Clone)]
pub struct TcpProbeObserver {
    addr: String,
    interval: Duration,
    timeout: Duration,
}

impl TcpProbeObserver {
    /// `addr` is a `host:port` string, resolved on every probe.
    pub fn new(addr: impl Into<String>, interval: Duration, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            interval,
            timeout,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn probe_once(&self) -> bool {
        match tokio::time::timeout(self.timeout, TcpStream::connect(&self.addr)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                tracing::debug!(addr = %self.addr, "probe failed: {}", e);
                false
            }
            Err(_) => {
                tracing::debug!(addr = %self.addr, "probe timed out");
                false
            }
        }
    }
}

impl NetworkObserver for TcpProbeObserver {
    fn watch(self, tx: mpsc::Sender<NetworkEvent>) -> WatchFuture {
        Box::pin(async move {
            let mut transitions = Transitions::default();
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = tx.closed() => break,
                }
                let online = self.probe_once().await;
                if let Some(event) = transitions.observe(online) {
                    tracing::info!(addr = %self.addr, ?event, "connectivity transition");
                    if tx.send(event).await.is_err() {
                        break;
                    }
                }
            }
        })
    }
}
