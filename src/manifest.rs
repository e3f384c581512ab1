//! Cascade manifest loading.
//!
//! A manifest is a JSON document naming every classifier node, its model,
//! and the parent -> children topology:
//!
//! ```json
//! {
//!   "root": "normal",
//!   "nodes": [
//!     { "name": "normal", "inputs": ["src_bytes", "count"], "threshold": 0.5,
//!       "model": { "kind": "onnx", "path": "models/normal.onnx" } },
//!     { "name": "dos", "inputs": ["count"], "threshold": 0.6,
//!       "model": { "kind": "logistic", "weights": [0.8], "bias": -0.1 } }
//!   ],
//!   "topology": { "normal": ["dos"] }
//! }
//! ```
//!
//! Relative model paths resolve against the manifest's directory.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use serde::Deserialize;

use crate::cascade::scorers::{LogisticScorer, OnnxScorer, DEFAULT_INPUT, DEFAULT_OUTPUT};
use crate::cascade::{Cascade, ClassifierNode, Scorer, Topology};
use crate::{Error, NORMAL};

fn default_root() -> String {
    NORMAL.to_string()
}

fn default_input() -> String {
    DEFAULT_INPUT.to_string()
}

fn default_output() -> String {
    DEFAULT_OUTPUT.to_string()
}

/// Parsed (not yet validated) cascade manifest.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CascadeManifest {
    #[serde(default = "default_root")]
    pub root: String,
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub topology: HashMap<String, Vec<String>>,
    /// Directory relative model paths resolve against.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// One classifier node entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeSpec {
    pub name: String,
    /// Label attribute name; defaults to the node name.
    #[serde(default)]
    pub label: Option<String>,
    pub inputs: Vec<String>,
    pub threshold: f64,
    pub model: ModelSpec,
}

/// The scoring backend of a node.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ModelSpec {
    Onnx {
        path: PathBuf,
        #[serde(default = "default_input")]
        input: String,
        #[serde(default = "default_output")]
        output: String,
    },
    Logistic {
        weights: Vec<f64>,
        #[serde(default)]
        bias: f64,
    },
}

impl CascadeManifest {
    /// Read a manifest file. Relative model paths resolve against its directory.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = fs::read_to_string(path)?;
        let mut manifest = Self::from_json(&text)?;
        manifest.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        info!(
            "Loaded manifest {} ({} nodes)",
            path.display(),
            manifest.nodes.len()
        );
        Ok(manifest)
    }

    /// Parse a manifest from JSON text. Relative paths resolve against the
    /// current directory.
    pub fn from_json(text: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(text)?)
    }

    /// Instantiate every model and validate the whole cascade.
    pub fn build(self) -> Result<Cascade, Error> {
        let topology = Topology::new(&self.root, self.topology)?;

        let mut nodes = Vec::with_capacity(self.nodes.len());
        for spec in self.nodes {
            let scorer = build_scorer(&spec, &self.base_dir)?;
            let label = spec.label.as_deref().unwrap_or(&spec.name);
            nodes.push(ClassifierNode::with_label(
                &spec.name,
                label,
                spec.inputs,
                spec.threshold,
                scorer,
            )?);
        }

        Cascade::new(nodes, topology)
    }
}

fn build_scorer(spec: &NodeSpec, base_dir: &Path) -> Result<Box<dyn Scorer>, Error> {
    match &spec.model {
        ModelSpec::Onnx {
            path,
            input,
            output,
        } => {
            let path = if path.is_relative() {
                base_dir.join(path)
            } else {
                path.clone()
            };
            Ok(Box::new(OnnxScorer::from_file_with_names(path, input, output)?))
        }
        ModelSpec::Logistic { weights, bias } => {
            if weights.len() != spec.inputs.len() {
                return Err(Error::Config(format!(
                    "node '{}' has {} inputs but {} logistic weights",
                    spec.name,
                    spec.inputs.len(),
                    weights.len()
                )));
            }
            Ok(Box::new(LogisticScorer::new(weights.clone(), *bias)?))
        }
    }
}
