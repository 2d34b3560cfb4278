//! Pipeline configuration (folders, concurrency bound, timeouts).

use std::path::PathBuf;

use serde::Deserialize;

/// Default number of concurrent transfer workers.
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Maximum allowed concurrency for transfer workers.
pub const MAX_CONCURRENCY: usize = 10;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP socket read timeout (25 seconds).
///
/// Bounds a stalled read; there is deliberately no end-to-end per-item
/// timeout, so a slow but live connection keeps its slot.
pub const READ_TIMEOUT_SECS: u64 = 25;

/// Configuration for a [`Pipeline`](crate::Pipeline).
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Folder receiving `{id}.zip` archives and `{id}/` extraction folders.
    pub download_root: PathBuf,
    /// Shared icon cache; installs copy `{id}.png` here.
    pub images_root: PathBuf,
    /// Folder holding runtime asset files (bridge/runtime scripts) copied
    /// next to each package manifest so extracted content runs offline.
    #[serde(default)]
    pub runtime_assets_dir: Option<PathBuf>,
    /// Maximum concurrent transfer workers (clamped to 1..=10).
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// HTTP connect timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// HTTP socket read timeout in seconds.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_connect_timeout() -> u64 {
    CONNECT_TIMEOUT_SECS
}

fn default_read_timeout() -> u64 {
    READ_TIMEOUT_SECS
}

impl PipelineConfig {
    /// Creates a configuration with default concurrency and timeouts.
    pub fn new(download_root: impl Into<PathBuf>, images_root: impl Into<PathBuf>) -> Self {
        Self {
            download_root: download_root.into(),
            images_root: images_root.into(),
            runtime_assets_dir: None,
            concurrency: DEFAULT_CONCURRENCY,
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
            read_timeout_secs: READ_TIMEOUT_SECS,
        }
    }
}
