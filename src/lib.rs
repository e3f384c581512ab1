//! Cascade IDS - hierarchical intrusion detection evaluator
//!
//! Drives network connections through a fixed three-level tree of binary
//! classifiers and reduces the resulting evaluation traces into a
//! confusion-matrix style quality and timing report.
//!
//! # Architecture
//!
//! The pipeline has three parts:
//! 1. A [`cascade::Cascade`] evaluates one [`Connection`] at a time, producing
//!    an [`EvaluationTrace`] (true labels, predicted labels, timing, scores)
//! 2. Traces are serialized one per line by the [`trace`] module
//! 3. The [`stats`] module folds a trace stream into an [`AggregateReport`]
//!
//! # Example
//!
//! ```no_run
//! use cascade_ids::cascade::Cascade;
//! use cascade_ids::provider::{CsvProvider, FeatureProvider};
//!
//! let cascade = Cascade::from_manifest("cascade.json").unwrap();
//! let provider = CsvProvider::open("connections.csv").unwrap();
//! let connections = provider.fetch(&cascade.required_fields(), None).unwrap();
//!
//! for conn in &connections {
//!     let trace = cascade.evaluate(conn).unwrap();
//!     println!("{}", trace);
//! }
//! ```

pub use error::{Error, ErrorKind};
pub use provider::Connection;
pub use stats::{AggregateReport, Tally};
pub use trace::{EvaluationTrace, LabelSet};

/// The label of the virtual root gate and the default verdict.
pub const NORMAL: &str = "normal";

// Cascade evaluation (topology, nodes, scorers)
pub mod cascade;

// Cascade manifest loading
pub mod manifest;

// Labeled connection sources
pub mod provider;

// Aggregate statistics over trace streams
pub mod stats;

// Line-oriented trace record format
pub mod trace;

mod error {
    use std::fmt;

    use thiserror::Error;

    /// Which failure class an error belongs to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum ErrorKind {
        Configuration,
        DataFormat,
        Arithmetic,
        Io,
    }

    impl ErrorKind {
        pub fn as_str(&self) -> &'static str {
            match self {
                ErrorKind::Configuration => "configuration",
                ErrorKind::DataFormat => "data-format",
                ErrorKind::Arithmetic => "arithmetic",
                ErrorKind::Io => "io",
            }
        }
    }

    impl fmt::Display for ErrorKind {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.as_str())
        }
    }

    #[derive(Debug, Error)]
    pub enum Error {
        #[error("Configuration error: {0}")]
        Config(String),

        #[error("Configuration error: node '{node}' requires feature '{feature}' which the connection lacks")]
        MissingFeature { node: String, feature: String },

        #[error("Configuration error: node '{node}' scored {score} (outside [0, 1])")]
        ScoreOutOfRange { node: String, score: f64 },

        #[error("Data format error at line {line}: {reason} (record: {record:?})")]
        DataFormat {
            line: usize,
            record: String,
            reason: String,
        },

        #[error("Arithmetic error: {0}")]
        Arithmetic(String),

        #[error("Unknown connection id {0}")]
        UnknownConnection(i64),

        #[error("IO error: {0}")]
        Io(#[from] std::io::Error),

        #[error("JSON error: {0}")]
        Json(#[from] serde_json::Error),

        #[error("ORT error: {0}")]
        Ort(#[from] ort::Error),

        #[error("Shape error: {0}")]
        Shape(#[from] ndarray::ShapeError),
    }

    impl Error {
        /// Classify the error into its failure class.
        pub fn kind(&self) -> ErrorKind {
            match self {
                Error::Config(_)
                | Error::MissingFeature { .. }
                | Error::ScoreOutOfRange { .. }
                | Error::UnknownConnection(_)
                | Error::Json(_)
                | Error::Ort(_)
                | Error::Shape(_) => ErrorKind::Configuration,
                Error::DataFormat { .. } => ErrorKind::DataFormat,
                Error::Arithmetic(_) => ErrorKind::Arithmetic,
                Error::Io(_) => ErrorKind::Io,
            }
        }
    }

}
