//! Agent configuration, loaded from a JSON file. Every section has defaults so a
//! partial file only needs to name what it overrides.

use crate::batch::OverloadPolicy;
use crate::features::FlowSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NidsConfig {
    /// Scratch directory for per-batch capture files and flow tables
    pub work_dir: PathBuf,
    pub capture: CaptureConfig,
    pub batch: BatchConfig,
    pub pool: PoolConfig,
    pub extractor: ExtractorConfig,
    pub features: FeaturesConfig,
    pub model: ModelConfig,
    pub alerts: AlertConfig,
    pub log: LogConfig,
    /// How often the capture loop logs an accumulator status line (0 disables)
    pub status_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Interface for live capture (requires the `live-capture` feature)
    pub interface: Option<String>,
    /// Replay packets from a pcap file instead of a live interface
    pub replay_file: Option<PathBuf>,
    pub snaplen: i32,
    pub promiscuous: bool,
    /// Read timeout so the capture loop can observe shutdown
    pub timeout_ms: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Packets per sealed batch
    pub batch_size: usize,
    /// Seal and process the partial buffer when capture stops
    pub flush_partial_on_shutdown: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub workers: usize,
    /// Sealed batches allowed to wait for a worker
    pub queue_capacity: usize,
    pub overload: OverloadPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Flow extraction tool (e.g. CICFlowMeter's `cfm` launcher)
    pub tool_path: PathBuf,
    /// Working directory for the tool; defaults to the tool's own directory
    pub working_dir: Option<PathBuf>,
    /// Appended to the capture file name to form the expected output name
    pub output_suffix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeaturesConfig {
    pub schema: FlowSchema,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// ONNX autoencoder
    pub model_path: PathBuf,
    /// Exported scaler parameters (JSON)
    pub scaler_path: PathBuf,
    /// Reconstruction error above this is anomalous
    pub threshold: f64,
    /// Errors at or above threshold * ratio raise high-severity alerts
    pub high_severity_ratio: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Alert evidence (pcap) root; retained across runs
    pub alert_dir: PathBuf,
    /// In-memory alert history size
    pub history_capacity: usize,
    /// SQLite journal of alert records
    pub journal_path: Option<PathBuf>,
    /// Journal rows older than this many days are pruned at startup (0 keeps all)
    pub retention_days: u64,
    /// Append alerts as JSON lines to this file
    pub ndjson_path: Option<PathBuf>,
    /// POST each alert to this URL
    pub webhook_url: Option<String>,
    pub webhook_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
}

impl Default for NidsConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from(".nids/work"),
            capture: CaptureConfig::default(),
            batch: BatchConfig::default(),
            pool: PoolConfig::default(),
            extractor: ExtractorConfig::default(),
            features: FeaturesConfig::default(),
            model: ModelConfig::default(),
            alerts: AlertConfig::default(),
            log: LogConfig::default(),
            status_interval_secs: 30,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interface: None,
            replay_file: None,
            snaplen: 65535,
            promiscuous: true,
            timeout_ms: 500,
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 5000,
            flush_partial_on_shutdown: true,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 16,
            overload: OverloadPolicy::DropOldest,
        }
    }
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            tool_path: PathBuf::from("CICFlowMeter-4.0/bin/cfm"),
            working_dir: None,
            output_suffix: "_Flow.csv".to_string(),
        }
    }
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            schema: FlowSchema::default(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/autoencoder.onnx"),
            scaler_path: PathBuf::from("models/scaler.json"),
            threshold: 0.1,
            high_severity_ratio: 2.0,
        }
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            alert_dir: PathBuf::from(".nids/alerts"),
            history_capacity: 1000,
            journal_path: Some(PathBuf::from(".nids/alerts.db")),
            retention_days: 30,
            ndjson_path: None,
            webhook_url: None,
            webhook_timeout_secs: 10,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
        }
    }
}

impl NidsConfig {
    /// Load from JSON file if present; otherwise return default. A file that
    /// exists but does not parse is an error rather than a silent fallback.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}
