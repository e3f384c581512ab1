//! Cascade evaluation.
//!
//! The cascade is a fixed tree of at most three levels of binary
//! classifiers. A connection starts at the virtual root gate; every node
//! that fires passes the connection on to its children, and nodes that fire
//! on the deepest level name the predicted attack.
//!
//! # Example
//!
//! ```no_run
//! use cascade_ids::cascade::Cascade;
//! use cascade_ids::Connection;
//!
//! let cascade = Cascade::from_manifest("cascade.json").unwrap();
//!
//! let conn = Connection::new(1)
//!     .with("count", 511.0)
//!     .with("srv_count", 511.0)
//!     .with("normal", 0.0)
//!     .with("dos", 1.0);
//!
//! let trace = cascade.evaluate(&conn).unwrap();
//! println!("{} -> {} in {} layers", trace.truth, trace.predicted, trace.layers);
//! ```

mod node;
pub mod scorers;
mod topology;


pub use node::{ClassifierNode, ScoreClock, Scorer};
pub use scorers::{LogisticScorer, OnnxScorer};
pub use topology::Topology;

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

use log::{debug, info, warn};

use crate::manifest::CascadeManifest;
use crate::{Connection, Error, EvaluationTrace, LabelSet};

/// Maximum number of levels, counting the root gate.
pub const MAX_LEVELS: usize = 3;

/// A validated classifier tree.
#[derive(Debug)]
pub struct Cascade {
    nodes: HashMap<String, ClassifierNode>,
    /// Node names in definition order.
    order: Vec<String>,
    topology: Topology,
}

impl Cascade {
    /// Build a cascade from nodes and a topology.
    ///
    /// Every name in the topology, including the root, must have a node.
    pub fn new(nodes: Vec<ClassifierNode>, topology: Topology) -> Result<Self, Error> {
        let mut by_name = HashMap::new();
        let mut order = Vec::with_capacity(nodes.len());

        for node in nodes {
            let name = node.name().to_string();
            if by_name.contains_key(&name) {
                return Err(Error::Config(format!("node '{}' is defined twice", name)));
            }
            order.push(name.clone());
            by_name.insert(name, node);
        }

        for name in topology.names() {
            if !by_name.contains_key(name) {
                return Err(Error::Config(format!(
                    "topology references undefined node '{}'",
                    name
                )));
            }
        }

        for name in &order {
            let reachable = topology.levels().iter().flatten().any(|n| n == name);
            if !reachable {
                warn!("Node '{}' is not reachable from '{}'", name, topology.root());
            }
        }

        info!(
            "Cascade ready: {} nodes over {} levels",
            by_name.len(),
            topology.levels().len()
        );

        Ok(Self {
            nodes: by_name,
            order,
            topology,
        })
    }

    /// Load and validate a cascade from a JSON manifest file.
    pub fn from_manifest<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        CascadeManifest::load(path.as_ref())?.build()
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn node(&self, name: &str) -> Option<&ClassifierNode> {
        self.nodes.get(name)
    }

    /// Number of nodes in the cascade.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Fields a connection source must supply: every node input, then every
    /// label attribute, without duplicates.
    pub fn required_fields(&self) -> Vec<String> {
        let mut fields: Vec<String> = Vec::new();
        let nodes = self.ordered_nodes();

        let inputs = nodes.clone().flat_map(|n| n.inputs().iter().map(String::as_str));
        let labels = nodes.map(|n| n.label());
        for field in inputs.chain(labels) {
            if !fields.iter().any(|f| f == field) {
                fields.push(field.to_string());
            }
        }
        fields
    }

    /// Labels of every node whose label attribute is 1 on the connection.
    ///
    /// An attribute missing from the connection counts as not flagged.
    pub fn true_labels(&self, conn: &Connection) -> LabelSet {
        self.ordered_nodes()
            .filter(|n| conn.get(n.label()) == Some(1.0))
            .map(|n| n.label())
            .collect()
    }

    /// Drive one connection through the cascade.
    pub fn evaluate(&self, conn: &Connection) -> Result<EvaluationTrace, Error> {
        let mut candidates: Vec<&str> = vec![self.topology.root()];
        let mut predicted = LabelSet::new();
        let mut scores: Vec<(String, f64)> = Vec::new();
        let mut clock = ScoreClock::new();
        let mut layers: u8 = 0;

        for level in 0..MAX_LEVELS {
            if candidates.is_empty() {
                break;
            }

            let mut next: Vec<&str> = Vec::new();
            for &name in &candidates {
                let node = self.nodes.get(name).ok_or_else(|| {
                    Error::Config(format!("node '{}' is not defined", name))
                })?;
                let features = node.extract(conn)?;

                let score = node.scorer().score_timed(&features, &mut clock)?;
                if !(0.0..=1.0).contains(&score) {
                    return Err(Error::ScoreOutOfRange {
                        node: name.to_string(),
                        score,
                    });
                }
                scores.push((name.to_string(), score));

                // The root gate scores "looks normal"; firing there means stop.
                let fires = if level == 0 {
                    !node.fires(score)
                } else {
                    node.fires(score)
                };
                debug!(
                    "conn {} level {} node '{}' score {:.6} -> {}",
                    conn.id,
                    level + 1,
                    name,
                    score,
                    if fires { "descend" } else { "stop" }
                );
                if !fires {
                    continue;
                }

                if level + 1 < MAX_LEVELS {
                    let children = self.topology.children(name);
                    if children.is_empty() && level > 0 {
                        warn!("Node '{}' fired for conn {} but has no children", name, conn.id);
                    }
                    for child in children {
                        if !next.contains(&child.as_str()) {
                            next.push(child);
                        }
                    }
                } else {
                    predicted.insert(name);
                }
            }

            layers += 1;
            candidates = next;
        }

        if predicted.is_empty() {
            predicted = LabelSet::normal();
        }

        Ok(EvaluationTrace {
            truth: self.true_labels(conn),
            predicted,
            elapsed_secs: clock.elapsed().as_secs_f64(),
            layers,
            scores,
        })
    }

    /// Evaluate connections one at a time, writing one trace record line
    /// per connection to `sink`. Returns the number of records written.
    pub fn evaluate_all<W: Write>(&self, conns: &[Connection], sink: &mut W) -> Result<usize, Error> {
        for conn in conns {
            let trace = self.evaluate(conn)?;
            writeln!(sink, "{}", trace)?;
            sink.flush()?;
        }
        Ok(conns.len())
    }

    fn ordered_nodes(&self) -> impl Iterator<Item = &ClassifierNode> + Clone {
        self.order.iter().filter_map(|name| self.nodes.get(name))
    }
}
