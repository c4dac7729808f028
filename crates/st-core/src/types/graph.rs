//! Links and full graph snapshots.

use serde::{Deserialize, Serialize};

use super::node::{GraphNode, NodeId};
use crate::hash::{FxHashMap, FxHashSet, fx_hash_map_with_capacity};

/// A directed parent → child edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphLink {
    /// Parent directory id.
    pub source: NodeId,
    /// Child id.
    pub target: NodeId,
}

impl GraphLink {
    /// Creates a link from `source` to `target`.
    #[inline]
    #[must_use]
    pub const fn new(source: NodeId, target: NodeId) -> Self {
        Self { source, target }
    }
}

/// A complete node/link graph, the unit of full-refresh transfer.
///
/// Array order carries no meaning. Consumers must compare graphs by node id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphData {
    /// All nodes.
    pub nodes: Vec<GraphNode>,
    /// All parent → child links.
    pub links: Vec<GraphLink>,
}

/// A structural defect found by [`GraphData::verify`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphInvariantError {
    /// Two nodes share an id.
    #[error("duplicate node id: {0}")]
    DuplicateNode(NodeId),

    /// A non-empty graph has no parentless node, or more than one.
    #[error("expected exactly one parentless node, found {0}")]
    RootCount(usize),

    /// A node's level disagrees with whether it has a parent.
    #[error("node {id} has level {level}")]
    Level {
        /// The offending node.
        id: NodeId,
        /// Its level.
        level: u8,
    },

    /// A node is targeted by more than one link.
    #[error("node {id} has {count} incoming links")]
    ParentCount {
        /// The offending node.
        id: NodeId,
        /// Number of incoming links.
        count: usize,
    },

    /// A link references a node that is not in the graph.
    #[error("link {parent} -> {child} references a missing node")]
    DanglingLink {
        /// Link source.
        parent: NodeId,
        /// Link target.
        child: NodeId,
    },

    /// A link's source is not an ancestor directory of its target.
    #[error("link {parent} -> {child} does not point from an ancestor directory")]
    NotAncestor {
        /// Link source.
        parent: NodeId,
        /// Link target.
        child: NodeId,
    },
}

impl GraphData {
    /// Creates an empty graph.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the graph has no nodes.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The node with `level == 0`, if any.
    #[must_use]
    pub fn root(&self) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.level == 0)
    }

    /// Looks up a node by id.
    #[must_use]
    pub fn find(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id.as_str() == id)
    }

    /// Returns `true` if a node with this id exists.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.find(id).is_some()
    }

    /// All node ids.
    #[must_use]
    pub fn node_ids(&self) -> FxHashSet<&NodeId> {
        self.nodes.iter().map(|n| &n.id).collect()
    }

    /// Checks the structural invariants of a scan result.
    ///
    /// - ids are unique
    /// - a non-empty graph has exactly one parentless node, at level 0
    /// - every other node is at level 1 with exactly one incoming link
    /// - every link's source is present and is an ancestor directory of its target
    pub fn verify(&self) -> Result<(), GraphInvariantError> {
        let mut by_id: FxHashMap<&NodeId, &GraphNode> = fx_hash_map_with_capacity(self.len());
        for node in &self.nodes {
            if by_id.insert(&node.id, node).is_some() {
                return Err(GraphInvariantError::DuplicateNode(node.id.clone()));
            }
        }

        let mut incoming: FxHashMap<&NodeId, usize> = fx_hash_map_with_capacity(self.len());
        for link in &self.links {
            let dangling = || GraphInvariantError::DanglingLink {
                parent: link.source.clone(),
                child: link.target.clone(),
            };
            let source = by_id.get(&link.source).ok_or_else(dangling)?;
            by_id.get(&link.target).ok_or_else(dangling)?;

            if !source.node_type.is_container()
                || !link.target.as_path().starts_with(link.source.as_path())
                || link.source == link.target
            {
                return Err(GraphInvariantError::NotAncestor {
                    parent: link.source.clone(),
                    child: link.target.clone(),
                });
            }

            *incoming.entry(&link.target).or_default() += 1;
        }

        let mut roots = 0;
        for node in &self.nodes {
            match incoming.get(&node.id).copied().unwrap_or(0) {
                0 => {
                    roots += 1;
                    if node.level != 0 {
                        return Err(GraphInvariantError::Level {
                            id: node.id.clone(),
                            level: node.level,
                        });
                    }
                }
                1 => {
                    if node.level != 1 {
                        return Err(GraphInvariantError::Level {
                            id: node.id.clone(),
                            level: node.level,
                        });
                    }
                }
                count => {
                    return Err(GraphInvariantError::ParentCount {
                        id: node.id.clone(),
                        count,
                    });
                }
            }
        }

        if !self.is_empty() && roots != 1 {
            return Err(GraphInvariantError::RootCount(roots));
        }

        Ok(())
    }
}
