//! Keep-alive / notification collaborator.
//!
//! Hosts that must keep the process alive while an upload runs (background
//! execution, a progress notification) implement `KeepAlive`. Calls are
//! fire-and-forget: errors are logged by the caller and never fail an upload.

/// Told when an upload begins, progresses, and ends.
pub trait KeepAlive: Send + Sync {
    fn begin(&self, upload_id: &str) -> anyhow::Result<()>;
    fn update(&self, upload_id: &str, percent: u8, message: &str) -> anyhow::Result<()>;
    fn end(&self, upload_id: &str) -> anyhow::Result<()>;
}

/// Does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopKeepAlive;

impl KeepAlive for NoopKeepAlive {
    fn begin(&self, _upload_id: &str) -> anyhow::Result<()> {
        Ok(())
    }

    fn update(&self, _upload_id: &str, _percent: u8, _message: &str) -> anyhow::Result<()> {
        Ok(())
    }

    fn end(&self, _upload_id: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Reports keep-alive transitions to the log (used by the CLI).
#[derive(Debug, Default, Clone, Copy)]
pub struct LogKeepAlive;

impl KeepAlive for LogKeepAlive {
    fn begin(&self, upload_id: &str) -> anyhow::Result<()> {
        tracing::info!(upload_id, "keep-alive begin");
        Ok(())
    }

    fn update(&self, upload_id: &str, percent: u8, message: &str) -> anyhow::Result<()> {
        tracing::debug!(upload_id, percent, "{}", message);
        Ok(())
    }

    fn end(&self, upload_id: &str) -> anyhow::Result<()> {
        tracing::info!(upload_id, "keep-alive end");
        Ok(())
    }
}
