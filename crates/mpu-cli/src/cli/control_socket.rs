//! Control socket: server (during `mpu upload`) and client (for `mpu pause`
//! and friends). Protocol: one request line "<action> <upload-id>", one reply
//! line: "ok", "error: <message>", or a JSON snapshot for `status`.

use anyhow::{bail, Result};
use mpu_core::UploadRegistry;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    Pause,
    Resume,
    Cancel,
    Status,
}

impl ControlAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ControlAction::Pause => "pause",
            ControlAction::Resume => "resume",
            ControlAction::Cancel => "cancel",
            ControlAction::Status => "status",
        }
    }
}

/// Parses "<action> <id>". Returns None for unknown actions or a missing id.
pub fn parse_request(line: &str) -> Option<(ControlAction, &str)> {
    let (action, id) = line.trim().split_once(char::is_whitespace)?;
    let id = id.trim();
    if id.is_empty() {
        return None;
    }
    let action = match action {
        "pause" => ControlAction::Pause,
        "resume" => ControlAction::Resume,
        "cancel" => ControlAction::Cancel,
        "status" => ControlAction::Status,
        _ => return None,
    };
    Some((action, id))
}

/// Applies one request to `registry` and returns the reply line (no newline).
pub fn execute(registry: &UploadRegistry, action: ControlAction, id: &str) -> String {
    let outcome = match action {
        ControlAction::Pause => registry.pause_upload(id).map(|_| "ok".to_string()),
        ControlAction::Resume => registry.resume_upload(id).map(|_| "ok".to_string()),
        ControlAction::Cancel => registry.cancel_upload(id).map(|_| "ok".to_string()),
        ControlAction::Status => registry.get_upload_state(id).map(|snapshot| {
            serde_json::to_string(&snapshot).unwrap_or_else(|e| format!("error: {}", e))
        }),
    };
    outcome.unwrap_or_else(|e| format!("error: {}", e))
}

/// A running control socket server. Dropping it stops the server and
/// removes the socket file.
#[derive(Debug)]
pub struct ControlListener {
    task: tokio::task::JoinHandle<()>,
    path: PathBuf,
}

impl ControlListener {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ControlListener {
    fn drop(&mut self) {
        self.task.abort();
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Spawns a task that listens on `path` and answers control requests against
/// `registry`. Removes a stale socket file first.
pub fn spawn_control_listener(
    registry: UploadRegistry,
    path: impl AsRef<Path>,
) -> Result<ControlListener> {
    let path = path.as_ref().to_path_buf();
    let _ = std::fs::remove_file(&path);
    let listener = UnixListener::bind(&path)?;
    let task = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let registry = registry.clone();
                    tokio::spawn(async move {
                        if let Err(e) = serve(stream, &registry).await {
                            tracing::debug!("control connection: {}", e);
                        }
                    });
                }
                Err(e) => tracing::debug!("control socket accept: {}", e),
            }
        }
    });
    Ok(ControlListener { task, path })
}

async fn serve(stream: UnixStream, registry: &UploadRegistry) -> Result<()> {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();
    while let Some(line) = lines.next_line().await? {
        let reply = match parse_request(&line) {
            Some((action, id)) => {
                tracing::info!(upload_id = id, action = action.as_str(), "control request");
                execute(registry, action, id)
            }
            None => format!("error: malformed request {:?}", line.trim()),
        };
        write.write_all(reply.as_bytes()).await?;
        write.write_all(b"\n").await?;
    }
    Ok(())
}

/// Sends one request and returns the reply line.
pub async fn send_request(socket_path: &Path, action: ControlAction, id: &str) -> Result<String> {
    if !socket_path.exists() {
        bail!(
            "no upload is running (control socket {} not found)",
            socket_path.display()
        );
    }
    let mut stream = UnixStream::connect(socket_path).await?;
    let msg = format!("{} {}\n", action.as_str(), id);
    stream.write_all(msg.as_bytes()).await?;
    let mut reply = String::new();
    BufReader::new(stream).read_line(&mut reply).await?;
    Ok(reply.trim_end().to_string())
}
