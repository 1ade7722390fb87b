//! Engine configuration.
//!
//! The core never consults the process environment: the proxy endpoint, worker
//! limits and capture timings are all handed in through [`EngineConfig`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Global engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Same-origin fetch proxy used when a direct media fetch fails.
    pub proxy: ProxyConfig,

    /// Encoder worker pool and output parameters.
    pub encoder: EncoderConfig,

    /// Post-seek readiness timings for the capture strategies.
    pub timings: CaptureTimings,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Fetch proxy endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Endpoint URL, e.g. `https://app.example/api/proxy-media`.
    /// `None` disables the proxy fallback.
    pub endpoint: Option<String>,

    /// Query parameter carrying the target URL.
    pub query_param: String,
}

/// Encoder worker pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Upper bound on background quantization workers.
    pub max_workers: usize,

    /// Frame-ingestion progress is reported every `progress_batch` frames.
    pub progress_batch: usize,

    /// Default quantizer quality, 1 (best) ..= 30 (fastest).
    pub default_quality: u8,

    /// Loop count written into the animation; 0 loops forever.
    pub repeat: u16,
}

/// Post-seek waits, in milliseconds.
///
/// Each value is the fallback timeout of a readiness poll: if the strategy's
/// readiness predicate never resolves, the loop proceeds after this long.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureTimings {
    /// Single-video strategy settle timeout.
    pub video_settle_ms: u64,

    /// Container-walk strategy settle timeout.
    pub container_settle_ms: u64,

    /// Generic surface strategy settle timeout.
    pub surface_settle_ms: u64,

    /// Snapshot fallback fixed delay.
    pub snapshot_delay_ms: u64,

    /// Upper bound on waiting for a local media copy to finish seeking.
    pub seek_timeout_ms: u64,

    /// Interval between readiness predicate checks.
    pub poll_interval_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "loopforge=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            query_param: "url".to_string(),
        }
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            progress_batch: 5,
            default_quality: 10,
            repeat: 0,
        }
    }
}

impl Default for CaptureTimings {
    fn default() -> Self {
        Self {
            video_settle_ms: 50,
            container_settle_ms: 100,
            surface_settle_ms: 150,
            snapshot_delay_ms: 80,
            seek_timeout_ms: 150,
            poll_interval_ms: 5,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl EncoderConfig {
    /// Worker count: `min(max_workers, available parallelism)`, falling back
    /// to 2 when parallelism cannot be queried.
    pub fn worker_count(&self) -> usize {
        let available = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(2);
        self.max_workers.min(available).max(1)
    }
}

impl EngineConfig {
    /// Load config from a JSON file.
    pub fn load_from(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(EngineError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from a JSON file, falling back to defaults on any failure.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::load_from(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config at {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    /// Save config as pretty JSON.
    pub fn save_to(&self, path: impl AsRef<Path>) -> EngineResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Reject values that would stall or break the pipeline.
    pub fn validate(&self) -> EngineResult<()> {
        if self.encoder.max_workers == 0 {
            return Err(EngineError::config("encoder.max_workers must be at least 1"));
        }
        if self.encoder.progress_batch == 0 {
            return Err(EngineError::config(
                "encoder.progress_batch must be at least 1",
            ));
        }
        if !(1..=30).contains(&self.encoder.default_quality) {
            return Err(EngineError::config(
                "encoder.default_quality must be within 1..=30",
            ));
        }
        if self.timings.poll_interval_ms == 0 {
            return Err(EngineError::config(
                "timings.poll_interval_ms must be at least 1",
            ));
        }
        if let Some(endpoint) = &self.proxy.endpoint {
            if endpoint.trim().is_empty() {
                return Err(EngineError::config("proxy.endpoint must not be empty"));
            }
        }
        Ok(())
    }
}
