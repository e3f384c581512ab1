//! Built-in scoring backends for classifier nodes.
//!
//! - `OnnxScorer`: runs an exported ONNX model via onnxruntime
//! - `LogisticScorer`: sigmoid over a linear model, for lightweight exports

mod logistic;
mod onnx;

pub use logistic::LogisticScorer;
pub use onnx::{OnnxScorer, DEFAULT_INPUT, DEFAULT_OUTPUT};
