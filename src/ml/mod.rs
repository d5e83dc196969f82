/*!
 * Anomaly Detection
 * Multi-model ensemble over windowed metric samples
 */

pub mod models;
mod pipeline;
mod trend;

pub use models::{
    AnomalyModel, Capability, IsolationModel, OneClassModel, ReconstructionModel, Verdict,
    ZScoreModel,
};
pub use pipeline::{DetectionPipeline, TrackState};
pub use trend::TrendPipeline;
