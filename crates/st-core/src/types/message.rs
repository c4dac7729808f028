//! Messages exchanged with the rendering surface.
//!
//! Both directions are closed unions discriminated by a `command` field, so
//! the wire format looks like this:
//!
//! ```text
//! core ──► sink   {"command": "removeNode", "id": "/w/a.ts"}
//! ui   ──► core   {"command": "nodeAction", "action": "rename", "path": "/w/a.ts", "name": "b.ts"}
//! ```
//!
//! Outbound messages are applied by the sink strictly in arrival order. That
//! order is the only thing serializing full snapshots against incremental
//! deltas.

use std::collections::BTreeMap;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use super::graph::GraphData;
use super::node::{GitStatus, GraphNode, NodeId};
use crate::config::Config;

/// Batched status patch. `None` clears a previously reported status.
pub type StatusChanges = BTreeMap<NodeId, Option<GitStatus>>;

/// A message from the core to the graph sink.
///
/// # Examples
///
/// ```
/// use st_core::{NodeId, SinkMessage};
///
/// let msg = SinkMessage::RemoveNode { id: NodeId::new("/w/a.ts") };
/// let json = serde_json::to_string(&msg).unwrap();
/// assert_eq!(json, r#"{"command":"removeNode","id":"/w/a.ts"}"#);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum SinkMessage {
    /// Replace the whole graph.
    #[serde(rename_all = "camelCase")]
    SetData {
        /// The new graph.
        #[serde(flatten)]
        data: GraphData,
        /// Whether the graph is rooted somewhere other than the workspace root.
        is_custom_root: bool,
    },

    /// Insert one node. The sink dedupes by id.
    #[serde(rename_all = "camelCase")]
    AddNode {
        /// The node to insert.
        node: GraphNode,
        /// Id of its containing directory.
        parent_id: NodeId,
    },

    /// Delete one node and every link touching it.
    RemoveNode {
        /// The node to delete.
        id: NodeId,
    },

    /// Patch the status of one node.
    #[serde(rename_all = "camelCase")]
    UpdateNodeStatus {
        /// The node to patch.
        id: NodeId,
        /// New status, `null` when clean.
        git_status: Option<GitStatus>,
    },

    /// Patch the status of many nodes.
    UpdateNodeStatusBatch {
        /// Id → new status.
        changes: StatusChanges,
    },

    /// Move the camera or selection to a node.
    FocusNode {
        /// The node to focus.
        id: NodeId,
    },
}

impl SinkMessage {
    /// Wire name of the message, for logging.
    #[must_use]
    pub const fn command(&self) -> &'static str {
        match self {
            Self::SetData { .. } => "setData",
            Self::AddNode { .. } => "addNode",
            Self::RemoveNode { .. } => "removeNode",
            Self::UpdateNodeStatus { .. } => "updateNodeStatus",
            Self::UpdateNodeStatusBatch { .. } => "updateNodeStatusBatch",
            Self::FocusNode { .. } => "focusNode",
        }
    }
}

/// Structural action requested from a node's context menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeAction {
    /// Re-root the graph at a directory.
    SetRoot,
    /// Return to the workspace root.
    ResetRoot,
    /// Create a directory inside `path`.
    CreateFolder,
    /// Create an empty file inside `path`.
    CreateFile,
    /// Rename `path` within its parent.
    Rename,
    /// Move `path` to the trash.
    Delete,
}

impl NodeAction {
    /// Returns `true` if the action needs a user-supplied name.
    #[inline]
    #[must_use]
    pub const fn requires_name(self) -> bool {
        matches!(self, Self::CreateFolder | Self::CreateFile | Self::Rename)
    }
}

/// A message from the UI (or its host) to the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum UiMessage {
    /// The UI is loaded and wants its first snapshot.
    Ready,

    /// Rebuild the snapshot of the current root.
    Refresh,

    /// Open a file in the editor.
    OpenFile {
        /// File to open.
        path: Utf8PathBuf,
    },

    /// Run a structural action.
    NodeAction {
        /// What to do.
        action: NodeAction,
        /// The node it applies to.
        path: Utf8PathBuf,
        /// New entry name for create and rename actions.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },

    /// The active editor changed to `path`.
    Reveal {
        /// The active file.
        path: Utf8PathBuf,
    },

    /// Replace the configuration. Always triggers a full rescan.
    Configure {
        /// The new configuration document.
        config: Box<Config>,
    },

    /// Diagnostic text forwarded from the UI.
    Log {
        /// The message.
        text: String,
    },
}
