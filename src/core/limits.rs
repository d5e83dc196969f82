/*!
 * System Limits and Constants
 *
 * Centralized location for defaults, thresholds, and tuning knobs.
 * Organized by domain. Values include rationale where it is not obvious.
 */

use std::time::Duration;

// =============================================================================
// EVENT BUS
// =============================================================================

/// Per-subscriber queue capacity (10,000 records)
/// Sized to absorb several seconds of full-rate syscall tracing
pub const DEFAULT_BUS_BUFFER_SIZE: usize = 10_000;

// =============================================================================
// KERNEL INGESTION
// =============================================================================

/// Kernel ring buffer size exposed through configuration (pages)
pub const DEFAULT_RING_PAGES: usize = 64;

/// Ring buffer reservation in the kernel probe program (pages)
/// Part of the probe contract; changing it requires rebuilding the probe
pub const KERNEL_RING_PAGES: usize = 256;

/// Maximum raw records drained from the ring per poll
/// Bounds the time the reader task holds the loop
pub const READER_BATCH_MAX: usize = 256;

/// Reader poll interval between ring buffer drains
pub const READER_POLL_INTERVAL: Duration = Duration::from_millis(100);

// =============================================================================
// STREAM PROCESSOR
// =============================================================================

/// Time-series buffer capacity per metric key (samples)
pub const DEFAULT_SERIES_CAPACITY: usize = 1000;

/// Global event history ring capacity
pub const DEFAULT_EVENT_HISTORY_SIZE: usize = 5000;

/// Process cache maximum entries, LRU eviction beyond this
pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;

/// Process cache entry TTL; entries older than this are refreshed on access
pub const DEFAULT_CACHE_TTL_SECS: f64 = 300.0;

// =============================================================================
// ANOMALY DETECTION
// =============================================================================

/// Pipeline tick period (seconds)
pub const DEFAULT_DETECTION_INTERVAL_SECS: f64 = 3.0;

/// Minimum samples before the pipeline evaluates a metric
pub const DEFAULT_MIN_SAMPLES: usize = 20;

/// Per-(metric, method) anomaly suppression window (seconds)
pub const DEFAULT_COOLDOWN_SECS: f64 = 30.0;

/// Z-score firing threshold (3 sigma = 99.7% confidence)
pub const DEFAULT_Z_THRESHOLD: f64 = 3.0;

/// Fused-confidence firing threshold for the ensemble
pub const DEFAULT_ENSEMBLE_THRESHOLD: f64 = 0.7;

/// Minimum models that must fire for an ensemble anomaly
pub const DEFAULT_MIN_VOTERS: usize = 2;

/// Detection window over recent samples (seconds, capped at buffer size)
pub const DEFAULT_WINDOW_SECONDS: f64 = 300.0;

/// Samples used when fitting a trainable model
pub const DEFAULT_TRAIN_WINDOW: usize = 100;

/// Buffer growth (samples) that triggers a refit
pub const DEFAULT_RETRAIN_DELTA: usize = 20;

/// Trees in the isolation ensemble
/// Diminishing returns past ~100 for one-dimensional series
pub const ISOLATION_TREES: usize = 64;

/// Isolation score above which a sample is considered anomalous
/// Standard isolation-forest convention: 0.5 is indistinct, >0.6 suspicious
pub const ISOLATION_SCORE_THRESHOLD: f64 = 0.6;

/// One-class boundary half-width in robust sigmas
pub const ONECLASS_BOUNDARY_K: f64 = 4.0;

/// Reconstruction model input window (values per sample)
pub const RECON_INPUT_DIM: usize = 8;

/// Reconstruction model bottleneck width
pub const RECON_HIDDEN_DIM: usize = 4;

/// Gradient descent epochs for the reconstruction model
pub const RECON_EPOCHS: usize = 60;

/// Consecutive failing ticks after which a model is permanently disabled
/// for that metric
pub const MODEL_FAILURE_DISABLE_LIMIT: u32 = 5;

// =============================================================================
// TREND PREDICTION
// =============================================================================

/// Minimum samples before the trend forecaster evaluates a metric
pub const TREND_MIN_SAMPLES: usize = 15;

/// Trend pipeline tick period (seconds)
pub const DEFAULT_TREND_INTERVAL_SECS: f64 = 10.0;

/// Forecast horizon (steps)
pub const DEFAULT_FORECAST_STEPS: usize = 3;

/// Forecast deviation (sigmas from window mean) that fires a trend record
pub const DEFAULT_TREND_SIGMA: f64 = 2.0;

// =============================================================================
// COLLECTORS
// =============================================================================

/// Processes reported per process-collector tick, ranked by CPU
pub const TOP_PROCESSES: usize = 10;

// =============================================================================
// LIFECYCLE
// =============================================================================

/// Grace period for bus queues to drain during shutdown
pub const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(5);
