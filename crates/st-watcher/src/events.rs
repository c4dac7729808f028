//! Event types flowing through the watcher and the change processor.
//!
//! # Event Flow
//!
//! ```text
//! notify event
//!      │  translate (rename → delete + create, .git → Repository)
//!      ▼
//! WatchEvent ──► session
//!      │
//!      ├─ File(FileEvent) ──► ChangeProcessor::queue ──► GraphDelta
//!      └─ Content / Repository ──► StatusSynchronizer::sync
//! ```

use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use st_core::{GraphNode, NodeId};

/// The only two structural changes the processor understands.
///
/// Renames arrive as a delete of the old path and a create of the new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// A path appeared.
    Create,
    /// A path disappeared.
    Delete,
}

impl ChangeKind {
    /// The kind that cancels this one.
    #[inline]
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Create => Self::Delete,
            Self::Delete => Self::Create,
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Delete => "delete",
        })
    }
}

/// A structural change to one path.
///
/// # Examples
///
/// ```
/// use st_watcher::{ChangeKind, FileEvent};
///
/// let event = FileEvent::create("/w/b.ts");
/// assert_eq!(event.kind, ChangeKind::Create);
/// assert!(event.cancels(&FileEvent::delete("/w/b.ts")));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileEvent {
    /// What happened.
    pub kind: ChangeKind,
    /// Absolute path of the entry.
    pub path: Utf8PathBuf,
}

impl FileEvent {
    /// Creates an event.
    #[inline]
    #[must_use]
    pub fn new(kind: ChangeKind, path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }

    /// Shorthand for a [`ChangeKind::Create`] event.
    #[inline]
    #[must_use]
    pub fn create(path: impl Into<Utf8PathBuf>) -> Self {
        Self::new(ChangeKind::Create, path)
    }

    /// Shorthand for a [`ChangeKind::Delete`] event.
    #[inline]
    #[must_use]
    pub fn delete(path: impl Into<Utf8PathBuf>) -> Self {
        Self::new(ChangeKind::Delete, path)
    }

    /// Returns `true` if `other` is the opposite change to the same path.
    #[inline]
    #[must_use]
    pub fn cancels(&self, other: &Self) -> bool {
        self.path == other.path && self.kind == other.kind.opposite()
    }

    /// The directory containing this path, as a node id.
    #[must_use]
    pub fn parent_id(&self) -> Option<NodeId> {
        self.path.parent().map(NodeId::from)
    }
}

/// What the watcher reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// A structural change inside the workspace.
    File(FileEvent),
    /// A file's content changed. Not structural, but its status may have.
    Content(Utf8PathBuf),
    /// Something under the repository metadata directory changed. Status
    /// may be stale.
    Repository,
}

/// Events produced from a single notify event. A rename yields two.
pub type WatchEvents = SmallVec<[WatchEvent; 2]>;

/// A node to insert, together with the id of its containing directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeAddition {
    /// The resolved node, already tagged with its status.
    pub node: GraphNode,
    /// `dirname(node.path)`.
    pub parent_id: NodeId,
}

/// Output of one drain chunk.
///
/// Within a chunk, [`GraphDelta::Removed`] is always sent before
/// [`GraphDelta::Added`]. Empty batches are never sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphDelta {
    /// Ids to remove. No filesystem lookup is involved.
    Removed(Vec<NodeId>),
    /// Nodes to insert.
    Added(Vec<NodeAddition>),
}

impl GraphDelta {
    /// Number of entries in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Removed(ids) => ids.len(),
            Self::Added(nodes) => nodes.len(),
        }
    }

    /// Returns `true` if the batch is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Returns `true` if `path` lies under the `.git` directory of `root`.
pub(crate) fn is_repository_path(root: &Utf8Path, path: &Utf8Path) -> bool {
    path.strip_prefix(root)
        .ok()
        .and_then(|rel| rel.components().next())
        .is_some_and(|first| first.as_str() == ".git")
}
