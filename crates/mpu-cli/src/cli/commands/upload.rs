//! `mpu upload <file> --url ...` – run one upload in the foreground.
//!
//! Serves the control socket while running, so `mpu pause <id>` etc. from
//! another shell reach this upload. Ctrl-C cancels.

use anyhow::{bail, Context, Result};
use mpu_core::config::MpuConfig;
use mpu_core::event::EventKind;
use mpu_core::keepalive::LogKeepAlive;
use mpu_core::network::TcpProbeObserver;
use mpu_core::transport::CurlTransport;
use mpu_core::{EventFilter, UploadEvent, UploadRegistry, UploadRequest, UploadResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::cli::control_socket;

#[derive(Debug)]
pub struct UploadArgs {
    pub file: PathBuf,
    pub id: Option<String>,
    pub urls: Vec<String>,
    pub urls_file: Option<PathBuf>,
    pub parallel: Option<usize>,
    pub json: bool,
    pub probe: Option<String>,
}

/// One URL per line; blank lines and lines starting with `#` are skipped.
pub fn read_urls_file(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read URL list {}", path.display()))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(String::from)
        .collect())
}

/// Aborts a background task when dropped, so early returns stop it too.
struct AbortOnDrop(tokio::task::JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn default_upload_id(file: &Path) -> String {
    file.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string())
}

pub async fn run_upload(cfg: &MpuConfig, args: UploadArgs) -> Result<()> {
    let urls = match &args.urls_file {
        Some(path) => read_urls_file(path)?,
        None => args.urls.clone(),
    };
    if urls.is_empty() {
        bail!("no part URLs given (use --url or --urls-file)");
    }
    let upload_id = args.id.clone().unwrap_or_else(|| default_upload_id(&args.file));

    let transport = Arc::new(CurlTransport::new(cfg.curl_options()));
    let registry = UploadRegistry::with_keep_alive(transport, Arc::new(LogKeepAlive));
    subscribe_output(&registry, args.json);

    let control = match mpu_core::control::default_control_socket_path() {
        Ok(path) => match control_socket::spawn_control_listener(registry.clone(), &path) {
            Ok(listener) => {
                tracing::debug!(path = %listener.path().display(), "control socket listening");
                Some(listener)
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), "control socket unavailable: {}", e);
                None
            }
        },
        Err(e) => {
            tracing::warn!("no control socket path: {}", e);
            None
        }
    };

    let probe = args.probe.clone().or_else(|| cfg.network.probe_addr.clone());
    let observer = probe.map(|addr| {
        let observer = TcpProbeObserver::new(
            addr,
            Duration::from_secs(cfg.network.probe_interval_secs.max(1)),
            Duration::from_secs(cfg.network.probe_timeout_secs.max(1)),
        );
        tracing::info!(addr = observer.addr(), "watching connectivity");
        AbortOnDrop(registry.attach_network_observer(observer))
    });

    let request = UploadRequest::new(upload_id.clone(), args.file.clone(), urls)
        .with_options(cfg.upload_options(args.parallel));
    // On error the listener and observer guards shut both services down.
    let handle = registry.start_upload(request)?;

    let wait = handle.wait();
    tokio::pin!(wait);
    let result = tokio::select! {
        result = &mut wait => result,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("interrupted; cancelling upload {}", upload_id);
            registry.cancel_upload(&upload_id)?;
            wait.await
        }
    };

    drop(observer);
    drop(control);

    report(&result, args.json)?;
    if !result.success {
        bail!(
            "{}",
            result.error.as_deref().unwrap_or("upload did not complete")
        );
    }
    Ok(())
}

fn subscribe_output(registry: &UploadRegistry, json: bool) {
    if json {
        registry.subscribe(EventFilter::Any, |event: &UploadEvent| {
            match serde_json::to_string(event) {
                Ok(line) => println!("{}", line),
                Err(e) => tracing::warn!("event encode: {}", e),
            }
        });
        return;
    }
    registry.subscribe(EventFilter::Any, |event: &UploadEvent| match event.kind {
        EventKind::UploadProgress => {
            let done = event.bytes_uploaded.unwrap_or(0) as f64 / 1_048_576.0;
            let total = event.total_bytes.unwrap_or(0) as f64 / 1_048_576.0;
            let pct = event.progress.unwrap_or(0.0) * 100.0;
            println!("  {:.1} / {:.1} MiB ({:.1}%)", done, total, pct);
        }
        EventKind::ChunkFailed => eprintln!(
            "  part {} failed: {}",
            event.chunk_index.map(|i| i + 1).unwrap_or(0),
            event.error_message.as_deref().unwrap_or("unknown error")
        ),
        EventKind::UploadPaused
        | EventKind::UploadResumed
        | EventKind::NetworkLost
        | EventKind::NetworkRestored => println!("  {}", event.kind),
        _ => {}
    });
}

fn report(result: &UploadResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(result)?);
        return Ok(());
    }
    println!("{} {}", result.upload_id, result.state);
    for (i, etag) in result.etags.iter().enumerate() {
        println!("{:<6} {}", i + 1, etag);
    }
    if !result.failed_parts.is_empty() {
        let parts: Vec<String> = result.failed_parts.iter().map(|n| n.to_string()).collect();
        println!("failed parts: {}", parts.join(", "));
    }
    Ok(())
}
