//! Logistic-regression scorer.

use ndarray::{Array1, ArrayView1};

use crate::cascade::Scorer;
use crate::Error;

/// `sigmoid(w · x + b)` over the node's features.
///
/// Always yields a value in `[0, 1]`.
#[derive(Debug, Clone)]
pub struct LogisticScorer {
    weights: Array1<f64>,
    bias: f64,
}

impl LogisticScorer {
    pub fn new(weights: Vec<f64>, bias: f64) -> Result<Self, Error> {
        if weights.iter().chain(std::iter::once(&bias)).any(|w| !w.is_finite()) {
            return Err(Error::Config(
                "logistic model has non-finite coefficients".to_string(),
            ));
        }
        Ok(Self {
            weights: Array1::from_vec(weights),
            bias,
        })
    }

    /// Number of features this model expects.
    pub fn arity(&self) -> usize {
        self.weights.len()
    }
}

impl Scorer for LogisticScorer {
    fn kind(&self) -> &'static str {
        "logistic"
    }

    fn score(&self, features: &[f64]) -> Result<f64, Error> {
        if features.len() != self.weights.len() {
            return Err(Error::Config(format!(
                "logistic model expects {} features, got {}",
                self.weights.len(),
                features.len()
            )));
        }
        let z = self.weights.dot(&ArrayView1::from(features)) + self.bias;
        Ok(sigmoid(z))
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}
