//! Seams between the change processor and its collaborators.
//!
//! The processor never touches the filesystem or the repository itself. It
//! asks a [`NodeResolver`] to turn a created path into a node and a
//! [`StatusLookup`] for that path's current status. Both are injected at
//! construction, which keeps the processor testable with in-memory fakes.

use camino::Utf8Path;
use futures_util::future::BoxFuture;

use crate::types::{GitStatus, GraphNode, NodeId};

/// Resolves a freshly created path into a graph node.
pub trait NodeResolver: Send + Sync {
    /// Builds the node for `path` under `parent`.
    ///
    /// Returns `None` when the path is already gone, cannot be read, or is
    /// excluded by an ignore pattern. Never fails loudly.
    fn resolve<'a>(
        &'a self,
        path: &'a Utf8Path,
        parent: &'a NodeId,
    ) -> BoxFuture<'a, Option<GraphNode>>;
}

/// Answers "what is the version-control status of this path right now".
pub trait StatusLookup: Send + Sync {
    /// Current status of `path`, `None` when clean or unknown.
    fn status_of(&self, path: &Utf8Path) -> Option<GitStatus>;
}

/// A [`StatusLookup`] that reports every path as clean.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoStatus;

impl StatusLookup for NoStatus {
    fn status_of(&self, _path: &Utf8Path) -> Option<GitStatus> {
        None
    }
}

impl<T: StatusLookup + ?Sized> StatusLookup for std::sync::Arc<T> {
    fn status_of(&self, path: &Utf8Path) -> Option<GitStatus> {
        (**self).status_of(path)
    }
}

impl<T: NodeResolver + ?Sized> NodeResolver for std::sync::Arc<T> {
    fn resolve<'a>(
        &'a self,
        path: &'a Utf8Path,
        parent: &'a NodeId,
    ) -> BoxFuture<'a, Option<GraphNode>> {
        (**self).resolve(path, parent)
    }
}
