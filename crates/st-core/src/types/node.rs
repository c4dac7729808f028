//! Graph nodes and their identity.

use std::borrow::Borrow;
use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

/// Identity of a graph node: its absolute path.
///
/// Ids are stable across a session for unchanged paths, which is what lets
/// incremental add/remove messages address nodes from an earlier snapshot.
///
/// # Examples
///
/// ```
/// use st_core::NodeId;
/// use camino::Utf8Path;
///
/// let id = NodeId::from_path(Utf8Path::new("/w/src/main.rs"));
/// assert_eq!(id.as_str(), "/w/src/main.rs");
/// assert_eq!(id.parent().map(|p| p.to_string()), Some("/w/src".to_owned()));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Creates an id from a raw string.
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Creates an id from a path.
    #[inline]
    #[must_use]
    pub fn from_path(path: &Utf8Path) -> Self {
        Self(path.as_str().to_owned())
    }

    /// The id as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The id as a path.
    #[inline]
    #[must_use]
    pub fn as_path(&self) -> &Utf8Path {
        Utf8Path::new(&self.0)
    }

    /// Id of the containing directory, if any.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        self.as_path()
            .parent()
            .filter(|p| !p.as_str().is_empty())
            .map(Self::from_path)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&Utf8Path> for NodeId {
    fn from(path: &Utf8Path) -> Self {
        Self::from_path(path)
    }
}

impl From<Utf8PathBuf> for NodeId {
    fn from(path: Utf8PathBuf) -> Self {
        Self(path.into_string())
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

/// Kind of a graph node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// The scan's starting directory.
    Root,
    /// Any directory below the root.
    Directory,
    /// Anything that is not a directory.
    File,
}

impl NodeType {
    /// Returns `true` for roots and directories.
    #[inline]
    #[must_use]
    pub const fn is_container(self) -> bool {
        matches!(self, Self::Root | Self::Directory)
    }
}

/// Version-control status of a path. Absence means clean or unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GitStatus {
    /// Working tree differs from the index.
    Modified,
    /// Index differs from `HEAD`.
    Staged,
    /// Not tracked and not ignored.
    Untracked,
}

impl GitStatus {
    /// Wire name of the status.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Modified => "modified",
            Self::Staged => "staged",
            Self::Untracked => "untracked",
        }
    }
}

impl fmt::Display for GitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single entry in the workspace graph.
///
/// `level` is a two-tier signal: `0` for the parentless scan root and `1` for
/// every other entry regardless of nesting depth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    /// Absolute path, unique within a graph.
    pub id: NodeId,

    /// Basename.
    pub name: String,

    /// Absolute path.
    pub path: Utf8PathBuf,

    /// Node kind.
    #[serde(rename = "type")]
    pub node_type: NodeType,

    /// `0` for the root, `1` otherwise.
    pub level: u8,

    /// Display color.
    pub color: String,

    /// Version-control status, omitted when clean.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_status: Option<GitStatus>,
}

impl GraphNode {
    /// Returns `true` if this is the root node.
    #[inline]
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.node_type == NodeType::Root
    }

    /// Sets the version-control status.
    #[must_use]
    pub fn with_git_status(mut self, status: Option<GitStatus>) -> Self {
        self.git_status = status;
        self
    }
}
