/*!
 * Configuration
 * Single configuration object, JSON file over built-in defaults
 */

use super::errors::ConfigError;
use super::limits;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Platform configuration. Every section has workable defaults; a JSON
/// config file overrides whatever it names.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ebpf: EbpfConfig,
    pub collectors: CollectorsConfig,
    pub ml: MlConfig,
    pub bus: BusConfig,
    pub processor: ProcessorConfig,
}

/// Kernel ingestion options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EbpfConfig {
    /// Start the kernel ring-buffer reader. Requires an attached probe;
    /// enabling this without one is fatal at startup.
    pub enable_syscall_trace: bool,
    /// Kernel ring buffer size in pages
    pub buffer_pages: usize,
    /// Records with latency below this are dropped before publication (ns)
    pub min_latency_ns: u64,
}

/// Poll periods for the user-space collectors (seconds)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorsConfig {
    pub cpu_interval: f64,
    pub memory_interval: f64,
    pub disk_interval: f64,
    pub network_interval: f64,
    pub process_interval: f64,
}

/// Anomaly detection and trend prediction options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MlConfig {
    /// Z-score firing threshold
    pub z_threshold: f64,
    /// Pipeline tick period (seconds)
    pub detection_interval: f64,
    /// Minimum samples before a metric is evaluated
    pub min_samples: usize,
    /// Per-(metric, method) suppression seconds
    pub cooldown: f64,
    /// Fused confidence firing threshold
    pub ensemble_threshold: f64,
    /// Minimum models that must fire for an ensemble anomaly
    pub min_voters: usize,
    /// Time-series buffer capacity per metric
    pub history_window_size: usize,
    /// Detection window over recent samples (seconds)
    pub window_seconds: f64,
    /// Samples used when fitting trainable models
    pub train_window: usize,
    /// Buffer growth that triggers a refit (samples)
    pub retrain_delta: usize,
    /// Enable the reconstruction (encoder-decoder) model
    pub enable_reconstruction: bool,
    /// Enable the trend prediction pipeline
    pub enable_trend: bool,
    /// Trend pipeline tick period (seconds)
    pub trend_interval: f64,
    /// Forecast horizon (steps)
    pub forecast_steps: usize,
    /// Forecast deviation in sigmas that fires a trend record
    pub trend_sigma: f64,
}

/// Event bus options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Per-subscriber queue capacity
    pub buffer_size: usize,
}

/// Stream processor options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Global event history ring capacity
    pub event_history_size: usize,
    /// Process cache max entries
    pub cache_capacity: usize,
    /// Process cache TTL seconds
    pub cache_ttl: f64,
}

impl Default for EbpfConfig {
    fn default() -> Self {
        Self {
            // Off by default: the probe program is an external collaborator
            enable_syscall_trace: false,
            buffer_pages: limits::DEFAULT_RING_PAGES,
            min_latency_ns: 0,
        }
    }
}

impl Default for CollectorsConfig {
    fn default() -> Self {
        Self {
            cpu_interval: 1.0,
            memory_interval: 1.0,
            disk_interval: 2.0,
            network_interval: 2.0,
            process_interval: 3.0,
        }
    }
}

impl Default for MlConfig {
    fn default() -> Self {
        Self {
            z_threshold: limits::DEFAULT_Z_THRESHOLD,
            detection_interval: limits::DEFAULT_DETECTION_INTERVAL_SECS,
            min_samples: limits::DEFAULT_MIN_SAMPLES,
            cooldown: limits::DEFAULT_COOLDOWN_SECS,
            ensemble_threshold: limits::DEFAULT_ENSEMBLE_THRESHOLD,
            min_voters: limits::DEFAULT_MIN_VOTERS,
            history_window_size: limits::DEFAULT_SERIES_CAPACITY,
            window_seconds: limits::DEFAULT_WINDOW_SECONDS,
            train_window: limits::DEFAULT_TRAIN_WINDOW,
            retrain_delta: limits::DEFAULT_RETRAIN_DELTA,
            enable_reconstruction: false,
            enable_trend: true,
            trend_interval: limits::DEFAULT_TREND_INTERVAL_SECS,
            forecast_steps: limits::DEFAULT_FORECAST_STEPS,
            trend_sigma: limits::DEFAULT_TREND_SIGMA,
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            buffer_size: limits::DEFAULT_BUS_BUFFER_SIZE,
        }
    }
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            event_history_size: limits::DEFAULT_EVENT_HISTORY_SIZE,
            cache_capacity: limits::DEFAULT_CACHE_CAPACITY,
            cache_ttl: limits::DEFAULT_CACHE_TTL_SECS,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file, overriding defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject malformed or out-of-range options. Fatal at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn positive(option: &str, value: f64) -> Result<(), ConfigError> {
            if value > 0.0 && value.is_finite() {
                Ok(())
            } else {
                Err(ConfigError::OutOfRange {
                    option: option.to_string(),
                    reason: format!("must be a positive number, got {value}"),
                })
            }
        }
        fn nonzero(option: &str, value: usize) -> Result<(), ConfigError> {
            if value > 0 {
                Ok(())
            } else {
                Err(ConfigError::OutOfRange {
                    option: option.to_string(),
                    reason: "must be at least 1".to_string(),
                })
            }
        }

        nonzero("bus.buffer_size", self.bus.buffer_size)?;
        nonzero("ebpf.buffer_pages", self.ebpf.buffer_pages)?;
        nonzero("ml.history_window_size", self.ml.history_window_size)?;
        nonzero("ml.min_voters", self.ml.min_voters)?;
        nonzero("ml.train_window", self.ml.train_window)?;
        nonzero("processor.event_history_size", self.processor.event_history_size)?;
        nonzero("processor.cache_capacity", self.processor.cache_capacity)?;

        positive("collectors.cpu_interval", self.collectors.cpu_interval)?;
        positive("collectors.memory_interval", self.collectors.memory_interval)?;
        positive("collectors.disk_interval", self.collectors.disk_interval)?;
        positive("collectors.network_interval", self.collectors.network_interval)?;
        positive("collectors.process_interval", self.collectors.process_interval)?;
        positive("ml.z_threshold", self.ml.z_threshold)?;
        positive("ml.detection_interval", self.ml.detection_interval)?;
        positive("ml.window_seconds", self.ml.window_seconds)?;
        positive("ml.trend_interval", self.ml.trend_interval)?;

        if self.ml.cooldown < 0.0 || !self.ml.cooldown.is_finite() {
            return Err(ConfigError::OutOfRange {
                option: "ml.cooldown".to_string(),
                reason: format!("must be non-negative, got {}", self.ml.cooldown),
            });
        }
        if self.processor.cache_ttl < 0.0 || !self.processor.cache_ttl.is_finite() {
            return Err(ConfigError::OutOfRange {
                option: "processor.cache_ttl".to_string(),
                reason: format!("must be non-negative, got {}", self.processor.cache_ttl),
            });
        }
        if !(0.0..=1.0).contains(&self.ml.ensemble_threshold) {
            return Err(ConfigError::OutOfRange {
                option: "ml.ensemble_threshold".to_string(),
                reason: format!("must be in [0, 1], got {}", self.ml.ensemble_threshold),
            });
        }

        Ok(())
    }
}
