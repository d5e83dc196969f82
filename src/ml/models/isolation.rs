/*!
 * Isolation Model
 * Randomized split trees scoring how easily a value isolates
 *
 * One-dimensional variant of isolation-forest scoring: anomalous values
 * sit in sparse regions and isolate in few random splits. Score is the
 * usual `2^(-E[h]/c(n))` normalization of mean isolation depth.
 */

use super::{AnomalyModel, Capability, FitDiscipline, Verdict};
use crate::core::errors::ModelError;
use crate::core::limits::{ISOLATION_SCORE_THRESHOLD, ISOLATION_TREES};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

enum Node {
    Leaf {
        size: usize,
    },
    Split {
        threshold: f64,
        below: Box<Node>,
        above: Box<Node>,
    },
}

impl Node {
    fn build(values: &mut [f64], depth: usize, max_depth: usize, rng: &mut StdRng) -> Node {
        let (min, max) = values
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });

        if values.len() <= 1 || depth >= max_depth || max - min < f64::EPSILON {
            return Node::Leaf {
                size: values.len(),
            };
        }

        let threshold = rng.gen_range(min..max);
        let split = partition_below(values, threshold);
        let (lo, hi) = values.split_at_mut(split);
        Node::Split {
            threshold,
            below: Box::new(Node::build(lo, depth + 1, max_depth, rng)),
            above: Box::new(Node::build(hi, depth + 1, max_depth, rng)),
        }
    }

    fn path_length(&self, value: f64, depth: f64) -> f64 {
        match self {
            Node::Leaf { size } => depth + average_path(*size),
            Node::Split {
                threshold,
                below,
                above,
            } => {
                if value < *threshold {
                    below.path_length(value, depth + 1.0)
                } else {
                    above.path_length(value, depth + 1.0)
                }
            }
        }
    }
}

/// In-place partition: values < threshold first. Returns the split index.
fn partition_below(values: &mut [f64], threshold: f64) -> usize {
    let mut split = 0;
    for i in 0..values.len() {
        if values[i] < threshold {
            values.swap(i, split);
            split += 1;
        }
    }
    split
}

/// Expected path length of an unsuccessful BST search over `n` items
fn average_path(n: usize) -> f64 {
    if n <= 1 {
        return 0.0;
    }
    let n = n as f64;
    const EULER: f64 = 0.577_215_664_901_532_9;
    2.0 * ((n - 1.0).ln() + EULER) - 2.0 * (n - 1.0) / n
}

/// Trainable isolation-style model, one instance per metric key.
pub struct IsolationModel {
    trees: Vec<Node>,
    train_size: usize,
    train_window: usize,
    discipline: FitDiscipline,
    rng: StdRng,
}

impl IsolationModel {
    pub fn new(train_window: usize, retrain_delta: u64) -> Self {
        Self {
            trees: Vec::new(),
            train_size: 0,
            train_window: train_window.max(2),
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

    /// Isolation score in [0, 1] for one value
    pub fn raw_score(&self, value: f64) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        let mean_depth: f64 = self
            .trees
            .iter()
            .map(|t| t.path_length(value, 0.0))
            .sum::<f64>()
            / self.trees.len() as f64;
        let norm = average_path(self.train_size);
        if norm < f64::EPSILON {
            return 0.0;
        }
        2f64.powf(-mean_depth / norm)
    }
}

impl AnomalyModel for IsolationModel {
    fn method(&self) -> &'static str {
        "isolation"
    }

    fn capability(&self) -> Capability {
        Capability::Available
    }

    fn ready(&self) -> bool {
        !self.trees.is_empty()
    }

    fn wants_fit(&self, total_appended: u64) -> bool {
        self.discipline.due(total_appended)
    }

    fn fit(&mut self, window: &[f64], total_appended: u64) -> Result<(), ModelError> {
        let start = window.len().saturating_sub(self.train_window);
        let train = &window[start..];
        if train.len() < 2 {
            // Too little data; skip without becoming ready
            return Ok(());
        }

        let max_depth = (train.len() as f64).log2().ceil() as usize;
        self.trees = (0..ISOLATION_TREES)
            .map(|_| {
                let mut values = train.to_vec();
                Node::build(&mut values, 0, max_depth.max(1), &mut self.rng)
            })
            .collect();
        self.train_size = train.len();
        self.discipline.mark(total_appended);
        Ok(())
    }

    fn score(&self, window: &[f64]) -> Result<Verdict, ModelError> {
        let Some(&latest) = window.last() else {
            return Ok(Verdict::QUIET);
        };
        if !self.ready() {
            return Err(ModelError::Predict("isolation model not fitted".into()));
        }
        let score = self.raw_score(latest);
        Ok(Verdict {
            fired: score > ISOLATION_SCORE_THRESHOLD,
            score,
        })
    }
}
