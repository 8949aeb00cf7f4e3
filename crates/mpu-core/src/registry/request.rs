//! Upload requests, options, and up-front validation.

use std::path::PathBuf;

use crate::error::UploadError;
use crate::planner::{plan_parts, PartRange};
use crate::retry::RetryPolicy;
use crate::source::FileRangeReader;

pub const MIN_PARALLEL: usize = 1;
pub const MAX_PARALLEL: usize = 10;

/// Clamp a requested parallelism to [`MIN_PARALLEL`, `MAX_PARALLEL`].
pub fn clamp_parallel(requested: usize) -> usize {
    requested.clamp(MIN_PARALLEL, MAX_PARALLEL)
}

/// Per-upload tuning.
#[derive(Debug, Clone, Copy)]
pub struct UploadOptions {
    /// Concurrent part attempts; clamped to [1, 10] at start.
    pub max_parallel: usize,
    pub retry: RetryPolicy,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            max_parallel: 3,
            retry: RetryPolicy::default(),
        }
    }
}

/// Everything needed to start one upload: one presigned URL per part, in part order.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub upload_id: String,
    pub file_path: PathBuf,
    pub urls: Vec<String>,
    pub options: UploadOptions,
}

impl UploadRequest {
    pub fn new(upload_id: impl Into<String>, file_path: impl Into<PathBuf>, urls: Vec<String>) -> Self {
        Self {
            upload_id: upload_id.into(),
            file_path: file_path.into(),
            urls,
            options: UploadOptions::default(),
        }
    }

    pub fn with_options(mut self, options: UploadOptions) -> Self {
        self.options = options;
        self
    }
}

/// Validated request: open reader and part plan.
pub(super) struct Prepared {
    pub(super) reader: FileRangeReader,
    pub(super) plan: Vec<PartRange>,
}

pub(super) fn prepare(request: &UploadRequest) -> Result<Prepared, UploadError> {
    if request.upload_id.trim().is_empty() {
        return Err(UploadError::Validation("upload id is empty".into()));
    }
    if request.file_path.as_os_str().is_empty() {
        return Err(UploadError::Validation("file path is empty".into()));
    }
    if request.urls.is_empty() {
        return Err(UploadError::Validation("no upload URLs given".into()));
    }
    for (i, raw) in request.urls.iter().enumerate() {
        validate_url(raw).map_err(|why| {
            UploadError::Validation(format!("URL for part {} {}", i + 1, why))
        })?;
    }

    let reader = FileRangeReader::open(&request.file_path).map_err(|e| {
        UploadError::Validation(format!(
            "cannot read {}: {}",
            request.file_path.display(),
            e
        ))
    })?;
    if reader.is_empty() {
        return Err(UploadError::Validation(format!(
            "file is empty: {}",
            request.file_path.display()
        )));
    }

    let plan = plan_parts(reader.len(), request.urls.len())
        .map_err(|e| UploadError::Validation(e.to_string()))?;
    Ok(Prepared { reader, plan })
}

fn validate_url(raw: &str) -> Result<(), String> {
    if raw.trim().is_empty() {
        return Err("is empty".into());
    }
    let parsed = url::Url::parse(raw).map_err(|e| format!("is invalid: {}", e))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(format!("has unsupported scheme {:?}", other)),
    }
}
