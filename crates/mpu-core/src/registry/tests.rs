use super::*;
use crate::control::CancelToken;
use crate::event::{EventKind, UploadEvent};
use crate::network::ChannelObserver;
use crate::retry::RetryPolicy;
use crate::session::SessionState;
use crate::transport::{PutResponse, TransportError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::NamedTempFile;

const MIB: u64 = 1024 * 1024;

/// In-memory transport: each URL answers 200 with an ETag derived from the
/// URL, after failing with 500 as many times as scripted for it.
#[derive(Default)]
struct ScriptedTransport {
    delay: Duration,
    failures: Mutex<HashMap<String, u32>>,
    calls: Mutex<Vec<String>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedTransport {
    fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    fn fail(self, url: &str, times: u32) -> Self {
        self.failures.lock().unwrap().insert(url.to_string(), times);
        self
    }

    fn calls_to(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
    }
}

impl PartTransport for ScriptedTransport {
    fn put(
        &self,
        url: &str,
        _body: &mut dyn std::io::Read,
        _len: u64,
        cancel: &CancelToken,
    ) -> Result<PutResponse, TransportError> {
        self.calls.lock().unwrap().push(url.to_string());
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let slept = cancel.sleep(self.delay);
        self.active.fetch_sub(1, Ordering::SeqCst);
        if slept.is_err() {
            return Err(TransportError::Aborted);
        }

        let mut failures = self.failures.lock().unwrap();
        if let Some(left) = failures.get_mut(url) {
            if *left > 0 {
                *left -= 1;
                return Ok(PutResponse {
                    status: 500,
                    headers: Vec::new(),
                });
            }
        }
        let tag = url.rsplit('=').next().unwrap_or_default();
        Ok(PutResponse {
            status: 200,
            headers: vec![("ETag".into(), format!("\"etag-{}\"", tag))],
        })
    }
}

fn file_of(size: u64) -> NamedTempFile {
    let file = NamedTempFile::new().unwrap();
    file.as_file().set_len(size).unwrap();
    file
}

fn url(n: usize) -> String {
    format!("https://store.example/obj?partNumber={}", n)
}

fn urls(count: usize) -> Vec<String> {
    (1..=count).map(url).collect()
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(5),
        jitter: false,
    }
}

fn request(id: &str, file: &NamedTempFile, parts: usize, parallel: usize) -> UploadRequest {
    UploadRequest::new(id, file.path(), urls(parts)).with_options(UploadOptions {
        max_parallel: parallel,
        retry: fast_retry(),
    })
}

fn record_events(registry: &UploadRegistry) -> Arc<Mutex<Vec<UploadEvent>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    registry.subscribe(EventFilter::Any, move |e: &UploadEvent| {
        sink.lock().unwrap().push(e.clone());
    });
    seen
}

#[tokio::test(flavor = "multi_thread")]
async fn uploads_every_part_and_orders_etags() {
    let transport = Arc::new(ScriptedTransport::with_delay(Duration::from_millis(10)));
    let registry = UploadRegistry::new(transport.clone());
    let seen = record_events(&registry);
    let file = file_of(15 * MIB);

    let handle = registry.start_upload(request("u-1", &file, 3, 2)).unwrap();
    let result = handle.wait().await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.state, SessionState::Completed);
    assert_eq!(result.etags, vec!["etag-1", "etag-2", "etag-3"]);
    assert!(transport.peak.load(Ordering::SeqCst) <= 2);
    assert!(!registry.contains("u-1"));

    let events = seen.lock().unwrap().clone();
    assert_eq!(events.first().map(|e| e.kind), Some(EventKind::UploadStarted));
    assert_eq!(events.last().map(|e| e.kind), Some(EventKind::UploadCompleted));
    let progress: Vec<u64> = events
        .iter()
        .filter(|e| e.kind == EventKind::UploadProgress)
        .filter_map(|e| e.bytes_uploaded)
        .collect();
    assert_eq!(progress, vec![5 * MIB, 10 * MIB, 15 * MIB]);
}

#[tokio::test(flavor = "multi_thread")]
async fn final_part_takes_remainder() {
    let transport = Arc::new(ScriptedTransport::with_delay(Duration::from_millis(100)));
    let registry = UploadRegistry::new(transport);
    let file = file_of(10 * MIB + 3);

    let handle = registry.start_upload(request("u-2", &file, 3, 3)).unwrap();
    let session = registry.get("u-2").unwrap();
    let sizes: Vec<u64> = session.parts().iter().map(|p| p.size).collect();
    assert_eq!(sizes, vec![5 * MIB, 5 * MIB, 3]);

    let result = handle.wait().await;
    assert!(result.success);
    assert_eq!(result.etags.len(), 3);
}

#[test]
fn rejects_file_too_small_for_url_count() {
    let registry = UploadRegistry::new(Arc::new(ScriptedTransport::default()));
    let file = file_of(8 * MIB);
    let err = registry.start_upload(request("u-3", &file, 3, 3)).unwrap_err();
    assert!(matches!(err, UploadError::Validation(_)));
    assert!(!registry.contains("u-3"));
}

#[test]
fn rejects_bad_url() {
    let registry = UploadRegistry::new(Arc::new(ScriptedTransport::default()));
    let file = file_of(MIB);
    let req = UploadRequest::new("u-4", file.path(), vec!["ftp://nope/x".into()]);
    assert!(matches!(registry.start_upload(req), Err(UploadError::Validation(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn duplicate_id_is_rejected_while_active() {
    let transport = Arc::new(ScriptedTransport::with_delay(Duration::from_secs(30)));
    let registry = UploadRegistry::new(transport);
    let file = file_of(10 * MIB);

    let handle = registry.start_upload(request("dup", &file, 2, 1)).unwrap();
    let err = registry.start_upload(request("dup", &file, 2, 1)).unwrap_err();
    assert!(matches!(err, UploadError::AlreadyInProgress(ref id) if id == "dup"));

    registry.cancel_upload("dup").unwrap();
    let result = handle.wait().await;
    assert!(result.is_cancelled());

    // the id is free again once the first upload is gone
    let again = registry.start_upload(request("dup", &file, 2, 1)).unwrap();
    registry.cancel_upload("dup").unwrap();
    assert!(again.wait().await.is_cancelled());
}

#[test]
fn registered_session_is_already_uploading() {
    let registry = UploadRegistry::new(Arc::new(ScriptedTransport::with_delay(Duration::from_secs(30))));
    let file = file_of(MIB);
    for n in 0..100 {
        let id = format!("early-{}", n);
        let pauser = {
            let registry = registry.clone();
            let id = id.clone();
            std::thread::spawn(move || loop {
                match registry.pause_upload(&id) {
                    Err(UploadError::NotFound(_)) => std::thread::yield_now(),
                    other => return other,
                }
            })
        };
        let handle = registry.start_upload(request(&id, &file, 1, 1)).unwrap();
        let paused = pauser.join().unwrap();
        assert!(paused.is_ok(), "pause right after registration: {:?}", paused);
        assert_eq!(registry.get_upload_state(&id).unwrap().state, SessionState::Paused);

        registry.cancel_upload(&id).unwrap();
        assert!(handle.wait_blocking().is_cancelled());
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn parallelism_is_clamped() {
    let transport = Arc::new(ScriptedTransport::with_delay(Duration::from_secs(30)));
    let registry = UploadRegistry::new(transport);
    let file = file_of(10 * MIB);

    let low = registry.start_upload(request("low", &file, 2, 0)).unwrap();
    let high = registry.start_upload(request("high", &file, 2, 25)).unwrap();
    assert_eq!(registry.get("low").unwrap().max_parallel(), 1);
    assert_eq!(registry.get("high").unwrap().max_parallel(), 10);
    assert_eq!(registry.active_uploads(), vec!["high".to_string(), "low".to_string()]);

    registry.cancel_upload("low").unwrap();
    registry.cancel_upload("high").unwrap();
    low.wait().await;
    high.wait().await;
    assert!(registry.active_uploads().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn pause_holds_dispatch_until_resume() {
    let transport = Arc::new(ScriptedTransport::with_delay(Duration::from_millis(50)));
    let registry = UploadRegistry::new(transport.clone());
    let file = file_of(15 * MIB);

    let handle = registry.start_upload(request("p-1", &file, 3, 1)).unwrap();
    registry.pause_upload("p-1").unwrap();
    let paused = registry.get_upload_state("p-1").unwrap();
    assert!(paused.is_paused);
    assert_eq!(paused.state, SessionState::Paused);

    tokio::time::sleep(Duration::from_millis(250)).await;
    let still = registry.get_upload_state("p-1").unwrap();
    assert_eq!(still.state, SessionState::Paused);
    assert!(still.parts_done <= 1);
    assert!(transport.calls.lock().unwrap().len() <= 1);

    registry.resume_upload("p-1").unwrap();
    let result = handle.wait().await;
    assert!(result.success);
    assert_eq!(result.etags, vec!["etag-1", "etag-2", "etag-3"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn network_loss_pauses_and_restore_resumes_unless_user_paused() {
    let transport = Arc::new(ScriptedTransport::with_delay(Duration::from_millis(50)));
    let registry = UploadRegistry::new(transport);
    let seen = record_events(&registry);
    let file = file_of(15 * MIB);

    let handle = registry.start_upload(request("n-1", &file, 3, 1)).unwrap();

    registry.handle_network_event(NetworkEvent::ConnectivityLost);
    let snap = registry.get_upload_state("n-1").unwrap();
    assert_eq!(snap.pause_reason, Some(PauseReason::Network));

    registry.handle_network_event(NetworkEvent::ConnectivityRestored);
    assert_eq!(registry.get_upload_state("n-1").unwrap().state, SessionState::Uploading);

    registry.pause_upload("n-1").unwrap();
    registry.handle_network_event(NetworkEvent::ConnectivityRestored);
    let snap = registry.get_upload_state("n-1").unwrap();
    assert_eq!(snap.state, SessionState::Paused);
    assert_eq!(snap.pause_reason, Some(PauseReason::User));

    registry.resume_upload("n-1").unwrap();
    assert!(handle.wait().await.success);

    let kinds: Vec<EventKind> = seen.lock().unwrap().iter().map(|e| e.kind).collect();
    let lost = kinds.iter().position(|k| *k == EventKind::NetworkLost).unwrap();
    assert_eq!(kinds[lost + 1], EventKind::UploadPaused);
}

#[tokio::test(flavor = "multi_thread")]
async fn transient_failures_are_retried() {
    let transport = Arc::new(ScriptedTransport::default().fail(&url(2), 2));
    let registry = UploadRegistry::new(transport.clone());
    let seen = record_events(&registry);
    let file = file_of(15 * MIB);

    let result = registry
        .start_upload(request("r-1", &file, 3, 3))
        .unwrap()
        .wait()
        .await;
    assert!(result.success, "{:?}", result.error);
    assert_eq!(transport.calls_to(&url(2)), 3);
    let kinds: Vec<EventKind> = seen.lock().unwrap().iter().map(|e| e.kind).collect();
    assert!(!kinds.contains(&EventKind::ChunkFailed));
}

#[tokio::test(flavor = "multi_thread")]
async fn exhausted_part_fails_upload() {
    let transport = Arc::new(ScriptedTransport::default().fail(&url(2), 99));
    let registry = UploadRegistry::new(transport.clone());
    let seen = record_events(&registry);
    let file = file_of(15 * MIB);

    let result = registry
        .start_upload(request("f-1", &file, 3, 3))
        .unwrap()
        .wait()
        .await;
    assert!(!result.success);
    assert_eq!(result.state, SessionState::Failed);
    assert!(result.etags.is_empty());
    assert_eq!(result.failed_parts, vec![2]);
    assert_eq!(transport.calls_to(&url(2)), 3);
    // other parts still ran to completion before the session failed
    assert_eq!(transport.calls_to(&url(1)), 1);
    assert_eq!(transport.calls_to(&url(3)), 1);

    let events = seen.lock().unwrap().clone();
    let failed: Vec<&UploadEvent> = events.iter().filter(|e| e.kind == EventKind::ChunkFailed).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].chunk_index, Some(1));
    assert_eq!(events.last().map(|e| e.kind), Some(EventKind::UploadFailed));
}

#[tokio::test(flavor = "multi_thread")]
async fn cancel_aborts_and_unregisters() {
    let transport = Arc::new(ScriptedTransport::with_delay(Duration::from_secs(30)));
    let registry = UploadRegistry::new(transport);
    let file = file_of(15 * MIB);

    let handle = registry.start_upload(request("c-1", &file, 3, 3)).unwrap();
    registry.cancel_upload("c-1").unwrap();
    assert!(matches!(registry.get_upload_state("c-1"), Err(UploadError::NotFound(_))));
    assert!(matches!(registry.pause_upload("c-1"), Err(UploadError::NotFound(_))));

    let result = tokio::time::timeout(Duration::from_secs(5), handle.wait())
        .await
        .expect("cancel should abort in-flight parts promptly");
    assert!(result.is_cancelled());
    assert!(result.etags.is_empty());

    registry.cancel_upload("c-1").unwrap();
    registry.cancel_upload("never-existed").unwrap();
}

#[test]
fn unknown_ids_are_not_found() {
    let registry = UploadRegistry::new(Arc::new(ScriptedTransport::default()));
    assert!(matches!(registry.pause_upload("x"), Err(UploadError::NotFound(_))));
    assert!(matches!(registry.resume_upload("x"), Err(UploadError::NotFound(_))));
    assert!(matches!(registry.get_upload_state("x"), Err(UploadError::NotFound(_))));
}

#[test]
fn blocking_wait_without_runtime() {
    let registry = UploadRegistry::new(Arc::new(ScriptedTransport::default()));
    let file = file_of(MIB);
    let result = registry
        .start_upload(request("b-1", &file, 1, 1))
        .unwrap()
        .wait_blocking();
    assert!(result.success);
    assert_eq!(result.etags, vec!["etag-1"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn observer_events_reach_sessions() {
    let transport = Arc::new(ScriptedTransport::with_delay(Duration::from_secs(30)));
    let registry = UploadRegistry::new(transport);
    let file = file_of(10 * MIB);
    let handle = registry.start_upload(request("o-1", &file, 2, 1)).unwrap();

    let (observer, tx) = ChannelObserver::new();
    let task = registry.attach_network_observer(observer);
    tx.send(NetworkEvent::ConnectivityLost).await.unwrap();

    let mut paused = false;
    for _ in 0..100 {
        if registry.get_upload_state("o-1").unwrap().is_paused {
            paused = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(paused);

    drop(tx);
    task.await.unwrap();
    registry.cancel_upload("o-1").unwrap();
    assert!(handle.wait().await.is_cancelled());
}
