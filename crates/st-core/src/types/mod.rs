//! Domain types for synaptree.
//!
//! # Module Organization
//!
//! - [`node`] - Node identity, node kinds, and version-control status
//! - [`graph`] - Links and full graph snapshots
//! - [`message`] - Messages exchanged with the rendering surface
//!
//! Everything is re-exported here and at the crate root:
//!
//! ```
//! use st_core::{GraphData, GraphNode, NodeId, SinkMessage};
//! ```

mod graph;
mod message;
mod node;

pub use graph::{GraphData, GraphInvariantError, GraphLink};
pub use message::{NodeAction, SinkMessage, StatusChanges, UiMessage};
pub use node::{GitStatus, GraphNode, NodeId, NodeType};
