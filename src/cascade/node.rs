//! Classifier node and its scoring trait.

use std::fmt;
use std::time::{Duration, Instant};

use crate::trace::is_valid_label;
use crate::{Connection, Error};

/// The scoring capability behind a classifier node.
///
/// Implementations map an ordered feature vector to a score in `[0, 1]`.
/// The cascade checks the range after every call; returning anything else
/// aborts the run.
///
/// # Implementation Notes
///
/// - The cascade calls `score_timed`, which by default times all of `score`
/// - Scorers with input conversion or locking override `score_timed` and wrap
///   only the model call in [`ScoreClock::time`] (or measure it and call
///   [`ScoreClock::add`])
/// - Use `kind` to identify the backing model type in logs
pub trait Scorer: Send + Sync {
    /// Short name of the model type (for debugging/logging).
    fn kind(&self) -> &'static str;

    /// Score one feature vector, ordered as the node's inputs.
    fn score(&self, features: &[f64]) -> Result<f64, Error>;

    /// Score one feature vector, charging only the scoring work to `clock`.
    fn score_timed(&self, features: &[f64], clock: &mut ScoreClock) -> Result<f64, Error> {
        clock.time(|| self.score(features))
    }
}

/// Accumulates time spent inside scoring calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreClock {
    elapsed: Duration,
}

impl ScoreClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f`, adding its wall time to the total.
    pub fn time<T>(&mut self, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let out = f();
        self.add(start.elapsed());
        out
    }

    /// Add a duration measured by the caller.
    pub fn add(&mut self, elapsed: Duration) {
        self.elapsed += elapsed;
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

/// One binary classifier in the cascade.
///
/// The node's verdict fires when its score reaches the threshold.
pub struct ClassifierNode {
    name: String,
    label: String,
    inputs: Vec<String>,
    threshold: f64,
    scorer: Box<dyn Scorer>,
}

impl ClassifierNode {
    /// Create a node whose label attribute has the same name as the node.
    pub fn new(
        name: &str,
        inputs: Vec<String>,
        threshold: f64,
        scorer: Box<dyn Scorer>,
    ) -> Result<Self, Error> {
        Self::with_label(name, name, inputs, threshold, scorer)
    }

    /// Create a node with an explicit label attribute name.
    pub fn with_label(
        name: &str,
        label: &str,
        inputs: Vec<String>,
        threshold: f64,
        scorer: Box<dyn Scorer>,
    ) -> Result<Self, Error> {
        if !is_valid_label(name) {
            return Err(Error::Config(format!("invalid node name {:?}", name)));
        }
        if !is_valid_label(label) {
            return Err(Error::Config(format!(
                "node '{}' has invalid label attribute {:?}",
                name, label
            )));
        }
        if !(0.0..=1.0).contains(&threshold) {
            return Err(Error::Config(format!(
                "node '{}' threshold {} is outside [0, 1]",
                name, threshold
            )));
        }

        Ok(Self {
            name: name.to_string(),
            label: label.to_string(),
            inputs,
            threshold,
            scorer,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the connection attribute that flags this node's label.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn scorer(&self) -> &dyn Scorer {
        self.scorer.as_ref()
    }

    /// Whether `score` reaches this node's threshold.
    pub fn fires(&self, score: f64) -> bool {
        score >= self.threshold
    }

    /// Pull this node's input features out of a connection, in input order.
    pub fn extract(&self, conn: &Connection) -> Result<Vec<f64>, Error> {
        self.inputs
            .iter()
            .map(|feature| {
                conn.get(feature).ok_or_else(|| Error::MissingFeature {
                    node: self.name.clone(),
                    feature: feature.clone(),
                })
            })
            .collect()
    }
}

impl fmt::Debug for ClassifierNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassifierNode")
            .field("name", &self.name)
            .field("label", &self.label)
            .field("inputs", &self.inputs)
            .field("threshold", &self.threshold)
            .field("scorer", &self.scorer.kind())
            .finish()
    }
}
