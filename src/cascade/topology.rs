//! Static cascade topology.

use std::collections::HashMap;

use log::warn;

use super::MAX_LEVELS;
use crate::Error;

/// Immutable parent -> ordered children mapping rooted at a virtual gate.
///
/// Validated on construction: every node sits at exactly one level, and
/// nodes on the deepest level have no children. Together these rule out
/// cycles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    root: String,
    children: HashMap<String, Vec<String>>,
    levels: Vec<Vec<String>>,
}

impl Topology {
    pub fn new(root: &str, children: HashMap<String, Vec<String>>) -> Result<Self, Error> {
        let levels = compute_levels(root, &children)?;

        let reachable: Vec<&String> = levels.iter().flatten().collect();
        for parent in children.keys() {
            if !reachable.contains(&parent) {
                warn!("Topology entry '{}' is not reachable from '{}'", parent, root);
            }
        }

        Ok(Self {
            root: root.to_string(),
            children,
            levels,
        })
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Children of `name`; empty for leaves and unknown names.
    pub fn children(&self, name: &str) -> &[String] {
        self.children.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Nodes reachable at each level, starting with `[root]`.
    pub fn levels(&self) -> &[Vec<String>] {
        &self.levels
    }

    /// Every name mentioned as a parent or child, plus the root.
    pub fn names(&self) -> Vec<&str> {
        let mut names = vec![self.root.as_str()];
        for (parent, kids) in &self.children {
            for name in std::iter::once(parent).chain(kids) {
                if !names.contains(&name.as_str()) {
                    names.push(name.as_str());
                }
            }
        }
        names
    }
}

fn compute_levels(root: &str, children: &HashMap<String, Vec<String>>) -> Result<Vec<Vec<String>>, Error> {
    let mut levels: Vec<Vec<String>> = Vec::new();
    let mut level_of: HashMap<&str, usize> = HashMap::new();
    let mut current: Vec<&str> = vec![root];

    for depth in 0..MAX_LEVELS {
        if current.is_empty() {
            break;
        }

        let mut next: Vec<&str> = Vec::new();
        for &name in &current {
            if let Some(&seen) = level_of.get(name) {
                if seen != depth {
                    return Err(Error::Config(format!(
                        "node '{}' is reachable at levels {} and {}",
                        name,
                        seen + 1,
                        depth + 1
                    )));
                }
            }
            level_of.insert(name, depth);

            let kids = children.get(name).map(Vec::as_slice).unwrap_or(&[]);
            if depth + 1 == MAX_LEVELS && !kids.is_empty() {
                return Err(Error::Config(format!(
                    "node '{}' on level {} has children; the cascade is limited to {} levels",
                    name,
                    depth + 1,
                    MAX_LEVELS
                )));
            }
            for kid in kids {
                if !next.contains(&kid.as_str()) {
                    next.push(kid);
                }
            }
        }

        levels.push(current.iter().map(|s| s.to_string()).collect());
        current = next;
    }

    Ok(levels)
}
