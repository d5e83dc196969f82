/*!
 * Z-Score Model
 * Statistical outlier detection, always on, no training state
 */

use super::{mean_std, AnomalyModel, Verdict};
use crate::core::errors::ModelError;

/// Sigma floor below which a series is treated as constant
const SIGMA_FLOOR: f64 = 1e-9;

/// The mandatory model: fires when the latest value deviates from the
/// window mean by more than `threshold` standard deviations.
pub struct ZScoreModel {
    threshold: f64,
}

impl ZScoreModel {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Z-score of `latest` against the window it belongs to; zero for a
    /// constant series
    pub fn z_score(window: &[f64], latest: f64) -> f64 {
        let (mean, std) = mean_std(window);
        if std > SIGMA_FLOOR {
            (latest - mean).abs() / std
        } else {
            0.0
        }
    }
}

impl AnomalyModel for ZScoreModel {
    fn method(&self) -> &'static str {
        "z_score"
    }

    fn score(&self, window: &[f64]) -> Result<Verdict, ModelError> {
        let Some(&latest) = window.last() else {
            return Ok(Verdict::QUIET);
        };
        let z = Self::z_score(window, latest);
        Ok(Verdict {
            fired: z > self.threshold,
            score: (z / (2.0 * self.threshold)).min(1.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spike_fires() {
        let model = ZScoreModel::new(3.0);
        // Baseline oscillating mildly around 25, then a spike
        let mut window: Vec<f64> = (0..50).map(|i| 25.0 + (i % 3) as f64).collect();
        window.push(95.0);
        let verdict = model.score(&window).unwrap();
        assert!(verdict.fired);
        assert!(verdict.score > 0.5);
    }

    #[test]
    fn test_constant_series_never_fires() {
        let model = ZScoreModel::new(3.0);
        let window = vec![25.0; 40];
        let verdict = model.score(&window).unwrap();
        assert!(!verdict.fired);
        assert_eq!(verdict.score, 0.0);
    }

    #[test]
    fn test_normal_value_quiet() {
        let model = ZScoreModel::new(3.0);
        let mut window: Vec<f64> = (0..50).map(|i| 100.0 + (i % 10) as f64).collect();
        window.push(104.0);
        assert!(!model.score(&window).unwrap().fired);
    }

    #[test]
    fn test_single_sample_no_divide_by_zero() {
        let model = ZScoreModel::new(3.0);
        let verdict = model.score(&[42.0]).unwrap();
        assert!(!verdict.fired);
        assert_eq!(verdict.score, 0.0);
        assert!(!model.score(&[]).unwrap().fired);
    }

    #[test]
    fn test_score_saturates_at_one() {
        let model = ZScoreModel::new(3.0);
        let mut window: Vec<f64> = (0..100).map(|i| 10.0 + (i % 2) as f64 * 0.1).collect();
        window.push(1e9);
        let verdict = model.score(&window).unwrap();
        assert!(verdict.fired);
        assert_eq!(verdict.score, 1.0);
    }
}
