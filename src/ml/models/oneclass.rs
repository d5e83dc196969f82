/*!
 * One-Class Boundary Model
 * Robust interval learned from the training window
 *
 * Center and spread come from median and MAD, so the boundary itself
 * survives the occasional outlier in the training data. Fires when the
 * latest value lies outside `center +/- k * sigma`.
 */

use super::{AnomalyModel, Capability, FitDiscipline, Verdict};
use crate::core::errors::ModelError;
use crate::core::limits::ONECLASS_BOUNDARY_K;

/// Scale factor relating MAD to sigma under normality
const MAD_TO_SIGMA: f64 = 1.4826;

const SIGMA_FLOOR: f64 = 1e-9;

pub struct OneClassModel {
    center: f64,
    sigma: f64,
    trained: bool,
    train_window: usize,
    discipline: FitDiscipline,
}

impl OneClassModel {
    pub fn new(train_window: usize, retrain_delta: u64) -> Self {
        Self {
            center: 0.0,
            sigma: 0.0,
            trained: false,
            train_window: train_window.max(2),
            discipline: FitDiscipline::new(retrain_delta),
        }
    }

    /// Learned boundary half-width; zero while untrained or degenerate
    pub fn boundary(&self) -> f64 {
        ONECLASS_BOUNDARY_K * self.sigma
    }
}

fn median(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

impl AnomalyModel for OneClassModel {
    fn method(&self) -> &'static str {
        "one_class"
    }

    fn capability(&self) -> Capability {
        Capability::Available
    }

    fn ready(&self) -> bool {
        self.trained
    }

    fn wants_fit(&self, total_appended: u64) -> bool {
        self.discipline.due(total_appended)
    }

    fn fit(&mut self, window: &[f64], total_appended: u64) -> Result<(), ModelError> {
        let start = window.len().saturating_sub(self.train_window);
        let train = &window[start..];
        if train.len() < 2 {
            return Ok(());
        }

        let mut sorted = train.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let center = median(&sorted);

        let mut deviations: Vec<f64> = sorted.iter().map(|v| (v - center).abs()).collect();
        deviations.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        self.sigma = MAD_TO_SIGMA * median(&deviations);
        self.center = center;
        self.trained = true;
        self.discipline.mark(total_appended);
        Ok(())
    }

    fn score(&self, window: &[f64]) -> Result<Verdict, ModelError> {
        let Some(&latest) = window.last() else {
            return Ok(Verdict::QUIET);
        };
        if !self.trained {
            return Err(ModelError::Predict("one-class model not fitted".into()));
        }
        if self.sigma < SIGMA_FLOOR {
            // Degenerate training data, no usable boundary
            return Ok(Verdict::QUIET);
        }

        let bound = self.boundary();
        let distance = (latest - self.center).abs();
        Ok(Verdict {
            fired: distance > bound,
            score: (distance / (2.0 * bound)).min(1.0),
        })
    }
}
