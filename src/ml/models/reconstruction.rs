/*!
 * Reconstruction Model
 * Compact linear encoder-decoder over sliding windows
 *
 * Trains a bottlenecked linear map on normalized windows of the series;
 * values the map cannot reconstruct are anomalous. Enabled only by
 * configuration, and the ensemble runs without it otherwise.
 */

use super::{mean_std, AnomalyModel, Capability, FitDiscipline, Verdict};
use crate::core::errors::ModelError;
use crate::core::limits::{RECON_EPOCHS, RECON_HIDDEN_DIM, RECON_INPUT_DIM};
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Minimum training rows before a fit takes
const MIN_TRAIN_ROWS: usize = 10;

const LEARNING_RATE: f64 = 0.01;

pub struct ReconstructionModel {
    encoder: Array2<f64>,
    decoder: Array2<f64>,
    norm_mean: f64,
    norm_std: f64,
    threshold: f64,
    trained: bool,
    train_window: usize,
    discipline: FitDiscipline,
    rng: StdRng,
}

impl ReconstructionModel {
    pub fn new(train_window: usize, retrain_delta: u64) -> Self {
        Self {
            encoder: Array2::zeros((RECON_INPUT_DIM, RECON_HIDDEN_DIM)),
            decoder: Array2::zeros((RECON_HIDDEN_DIM, RECON_INPUT_DIM)),
            norm_mean: 0.0,
            norm_std: 1.0,
            threshold: 0.0,
            trained: false,
            train_window: train_window.max(RECON_INPUT_DIM + MIN_TRAIN_ROWS),
            discipline: FitDiscipline::new(retrain_delta),
            rng: StdRng::from_entropy(),
        }
    }

    #[cfg(test)]
    pub fn with_seed(train_window: usize, retrain_delta: u64, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            ..Self::new(train_window, retrain_delta)
        }
    }

    fn normalize(&self, values: &[f64]) -> Array1<f64> {
        Array1::from_iter(values.iter().map(|v| (v - self.norm_mean) / self.norm_std))
    }

    /// Mean absolute reconstruction error per row
    fn row_errors(&self, x: &Array2<f64>) -> Array1<f64> {
        let reconstructed = x.dot(&self.encoder).dot(&self.decoder);
        (&reconstructed - x)
            .mapv(f64::abs)
            .mean_axis(Axis(1))
            .expect("non-empty rows")
    }

    /// Reconstruction error for the last window of `values`
    pub fn reconstruction_error(&self, values: &[f64]) -> Option<f64> {
        if !self.trained || values.len() < RECON_INPUT_DIM {
            return None;
        }
        let tail = &values[values.len() - RECON_INPUT_DIM..];
        let x = self
            .normalize(tail)
            .into_shape((1, RECON_INPUT_DIM))
            .expect("window shape");
        Some(self.row_errors(&x)[0])
    }
}

impl AnomalyModel for ReconstructionModel {
    fn method(&self) -> &'static str {
        "reconstruction"
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
        if train.len() < RECON_INPUT_DIM + MIN_TRAIN_ROWS {
            return Ok(());
        }

        let (mean, std) = mean_std(train);
        self.norm_mean = mean;
        self.norm_std = if std > 1e-9 { std } else { 1.0 };

        // Sliding windows, one row each
        let rows = train.len() - RECON_INPUT_DIM + 1;
        let mut x = Array2::zeros((rows, RECON_INPUT_DIM));
        for (r, chunk) in train.windows(RECON_INPUT_DIM).enumerate() {
            x.row_mut(r).assign(&self.normalize(chunk));
        }

        // Fresh small random weights each fit
        self.encoder =
            Array2::from_shape_fn((RECON_INPUT_DIM, RECON_HIDDEN_DIM), |_| {
                self.rng.gen_range(-0.1..0.1)
            });
        self.decoder =
            Array2::from_shape_fn((RECON_HIDDEN_DIM, RECON_INPUT_DIM), |_| {
                self.rng.gen_range(-0.1..0.1)
            });

        // Plain gradient descent on mean squared reconstruction error
        let n = rows as f64;
        for _ in 0..RECON_EPOCHS {
            let hidden = x.dot(&self.encoder);
            let output = hidden.dot(&self.decoder);
            let err = &output - &x;

            let grad_out = err.mapv(|e| 2.0 * e / n);
            let grad_decoder = hidden.t().dot(&grad_out);
            let grad_hidden = grad_out.dot(&self.decoder.t());
            let grad_encoder = x.t().dot(&grad_hidden);

            self.decoder = &self.decoder - &(grad_decoder * LEARNING_RATE);
            self.encoder = &self.encoder - &(grad_encoder * LEARNING_RATE);
        }

        // Threshold at the 95th percentile of training error
        let mut errors = self.row_errors(&x).to_vec();
        errors.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let idx = ((errors.len() as f64) * 0.95) as usize;
        self.threshold = errors[idx.min(errors.len() - 1)];

        self.trained = true;
        self.discipline.mark(total_appended);
        Ok(())
    }

    fn score(&self, window: &[f64]) -> Result<Verdict, ModelError> {
        if !self.trained {
            return Err(ModelError::Predict(
                "reconstruction model not fitted".into(),
            ));
        }
        let Some(error) = self.reconstruction_error(window) else {
            return Ok(Verdict::QUIET);
        };
        if self.threshold < 1e-9 {
            return Ok(Verdict::QUIET);
        }
        Ok(Verdict {
            fired: error > self.threshold,
            score: (error / (2.0 * self.threshold)).min(1.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn periodic(n: usize) -> Vec<f64> {
        (0..n).map(|i| 50.0 + 5.0 * ((i % 8) as f64)).collect()
    }

    #[test]
    fn test_fit_and_score_normal_window() {
        let mut model = ReconstructionModel::with_seed(100, 20, 3);
        let train = periodic(100);
        model.fit(&train, 100).unwrap();
        assert!(model.ready());

        let verdict = model.score(&train).unwrap();
        // The training tail reconstructs within the learned threshold band
        assert!(verdict.score <= 1.0);
    }

    #[test]
    fn test_disrupted_window_scores_higher() {
        let mut model = ReconstructionModel::with_seed(100, 20, 3);
        let train = periodic(100);
        model.fit(&train, 100).unwrap();

        let normal_err = model.reconstruction_error(&train).unwrap();
        let mut disrupted = train.clone();
        let len = disrupted.len();
        for v in &mut disrupted[len - 4..] {
            *v = 500.0;
        }
        let spike_err = model.reconstruction_error(&disrupted).unwrap();
        assert!(spike_err > normal_err);
    }

    #[test]
    fn test_fit_skips_short_window() {
        let mut model = ReconstructionModel::with_seed(100, 20, 3);
        model.fit(&periodic(10), 10).unwrap();
        assert!(!model.ready());
        assert!(model.score(&periodic(10)).is_err());
    }

    #[test]
    fn test_short_score_window_is_quiet() {
        let mut model = ReconstructionModel::with_seed(100, 20, 3);
        model.fit(&periodic(100), 100).unwrap();
        let verdict = model.score(&[1.0, 2.0]).unwrap();
        assert_eq!(verdict, Verdict::QUIET);
    }
}
