//! ONNX model scorer.
//!
//! Feeds the node's features as a single `1 x n` f32 row and reads the first
//! element of the named output tensor as the score.

use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

use ndarray::Array2;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;

use crate::cascade::{ScoreClock, Scorer};
use crate::Error;

/// Default input tensor name.
pub const DEFAULT_INPUT: &str = "input";
/// Default output tensor name.
pub const DEFAULT_OUTPUT: &str = "output";

/// Scorer backed by an onnxruntime session.
pub struct OnnxScorer {
    session: Mutex<Session>,
    input: String,
    output: String,
}

impl OnnxScorer {
    /// Load a model from disk using the default tensor names.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        Self::from_file_with_names(path, DEFAULT_INPUT, DEFAULT_OUTPUT)
    }

    /// Load a model from disk with explicit input and output tensor names.
    pub fn from_file_with_names<P: AsRef<Path>>(
        path: P,
        input: &str,
        output: &str,
    ) -> Result<Self, Error> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::Config(format!(
                "ONNX model {} does not exist",
                path.display()
            )));
        }

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(ort::Error::from)?
            .commit_from_file(path)?;

        Ok(Self {
            session: Mutex::new(session),
            input: input.to_string(),
            output: output.to_string(),
        })
    }

    pub fn input_name(&self) -> &str {
        &self.input
    }

    pub fn output_name(&self) -> &str {
        &self.output
    }
}

impl Scorer for OnnxScorer {
    fn kind(&self) -> &'static str {
        "onnx"
    }

    fn score(&self, features: &[f64]) -> Result<f64, Error> {
        self.score_timed(features, &mut ScoreClock::new())
    }

    /// Only `session.run` is charged to the clock; tensor setup, locking and
    /// output extraction happen outside it.
    fn score_timed(&self, features: &[f64], clock: &mut ScoreClock) -> Result<f64, Error> {
        let row: Vec<f32> = features.iter().map(|&x| x as f32).collect();
        let input_arr = Array2::from_shape_vec((1, row.len()), row)?;
        let input_tensor = Tensor::from_array(input_arr)?;

        // Lock the mutex to get mutable access to the session
        let mut session = self
            .session
            .lock()
            .map_err(|_| Error::Config("ONNX session mutex poisoned".to_string()))?;

        let start = Instant::now();
        let result = session.run(ort::inputs![self.input.as_str() => input_tensor]);
        clock.add(start.elapsed());
        let outputs = result?;

        let output_arr = outputs[self.output.as_str()].try_extract_array::<f32>()?;
        let score = output_arr.iter().next().copied().ok_or_else(|| {
            Error::Config(format!("model output '{}' is empty", self.output))
        })?;

        Ok(score as f64)
    }
}
