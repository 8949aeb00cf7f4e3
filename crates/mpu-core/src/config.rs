use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::registry::{clamp_parallel, UploadOptions};
use crate::retry::RetryPolicy;
use crate::transport::CurlOptions;

/// Upper bound on `retry.base_delay_secs`.
pub const MAX_BASE_DELAY: Duration = Duration::from_secs(3600);

/// `[retry]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per part, including the first.
    pub max_attempts: u32,
    /// Delay after attempt n is `base_delay_secs * n`.
    pub base_delay_secs: f64,
    /// Add up to 20% random jitter to each delay.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_secs: 1.0,
            jitter: true,
        }
    }
}

/// `[network]` section: optional reachability probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// `host:port` to probe; no probe when unset.
    pub probe_addr: Option<String>,
    pub probe_interval_secs: u64,
    pub probe_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            probe_addr: None,
            probe_interval_secs: 5,
            probe_timeout_secs: 3,
        }
    }
}

/// Global configuration loaded from `~/.config/mpu/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MpuConfig {
    /// Concurrent part uploads per upload when the caller does not say (1..=10).
    pub default_max_parallel: usize,
    pub connect_timeout_secs: u64,
    /// Wall-clock limit for one part attempt.
    pub part_timeout_secs: u64,
    pub retry: RetryConfig,
    pub network: NetworkConfig,
}

impl Default for MpuConfig {
    fn default() -> Self {
        Self {
            default_max_parallel: 3,
            connect_timeout_secs: 30,
            part_timeout_secs: 600,
            retry: RetryConfig::default(),
            network: NetworkConfig::default(),
        }
    }
}

impl MpuConfig {
    /// Rejects values that parse but cannot be used.
    pub fn validate(&self) -> Result<()> {
        let secs = self.retry.base_delay_secs;
        if secs.is_nan() || secs > MAX_BASE_DELAY.as_secs_f64() {
            bail!(
                "retry.base_delay_secs = {} is out of range (at most {})",
                secs,
                MAX_BASE_DELAY.as_secs()
            );
        }
        Ok(())
    }

    /// Retry policy with out-of-range values pulled back into range.
    pub fn retry_policy(&self) -> RetryPolicy {
        let secs = self.retry.base_delay_secs;
        let base = if secs > 0.0 {
            Duration::try_from_secs_f64(secs)
                .unwrap_or(MAX_BASE_DELAY)
                .min(MAX_BASE_DELAY)
        } else {
            Duration::ZERO
        };
        RetryPolicy {
            max_attempts: self.retry.max_attempts.max(1),
            base_delay: base,
            jitter: self.retry.jitter,
        }
    }

    pub fn curl_options(&self) -> CurlOptions {
        CurlOptions {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.part_timeout_secs),
            ..CurlOptions::default()
        }
    }

    /// Upload options with `parallel` (or the configured default) clamped.
    pub fn upload_options(&self, parallel: Option<usize>) -> UploadOptions {
        UploadOptions {
            max_parallel: clamp_parallel(parallel.unwrap_or(self.default_max_parallel)),
            retry: self.retry_policy(),
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("mpu")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, writing the defaults first if no file exists.
pub fn load_or_init() -> Result<MpuConfig> {
    let path = config_path()?;
    if !path.exists() {
        let cfg = MpuConfig::default();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml::to_string_pretty(&cfg)?)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(cfg);
    }
    load_from_path(&path)
}

pub fn load_from_path(path: &Path) -> Result<MpuConfig> {
    let data = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: MpuConfig =
        toml::from_str(&data).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}
