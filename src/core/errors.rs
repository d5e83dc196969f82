/*!
 * Error Types
 * Centralized error handling with thiserror
 */

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors. Fatal at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Option {option} out of range: {reason}")]
    OutOfRange { option: String, reason: String },
}

/// Event bus errors with serialization support
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum BusError {
    #[error("Subscriber '{0}' already registered")]
    SubscriberConflict(String),

    #[error("Invalid queue capacity: {0}")]
    InvalidCapacity(usize),

    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    #[error("Bus is shut down")]
    Closed,
}

/// Kernel ingestion errors
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum EbpfError {
    #[error("Failed to attach kernel probe: {0}")]
    AttachFailed(String),

    #[error("Truncated kernel record: {len} bytes, expected {expected}")]
    TruncatedRecord { len: usize, expected: usize },

    #[error("Ring buffer poll failed: {0}")]
    PollFailed(String),
}

/// Anomaly model errors. A failing model is disabled for the tick.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum ModelError {
    #[error("Model fit failed: {0}")]
    Fit(String),

    #[error("Model predict failed: {0}")]
    Predict(String),

    #[error("Insufficient data: {have} samples, need {need}")]
    InsufficientData { have: usize, need: usize },
}

/// Unified platform error type
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Kernel ingestion error: {0}")]
    Ebpf(#[from] EbpfError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for MonitorError {
    fn from(err: std::io::Error) -> Self {
        MonitorError::Io(err.to_string())
    }
}
