//! Turning filesystem entries into graph nodes.
//!
//! [`build_node`] is the pure half: given a path, whether it is a directory,
//! and its parent, it applies the ignore patterns and the color rules.
//! [`make_node`] adds the single `stat` needed to learn the entry kind.
//!
//! | has parent | is directory | type        | level | color                |
//! |------------|--------------|-------------|-------|----------------------|
//! | no         | yes          | `root`      | 0     | root color           |
//! | no         | no           | `file`      | 0     | extension or default |
//! | yes        | yes          | `directory` | 1     | directory color      |
//! | yes        | no           | `file`      | 1     | extension or default |

use std::sync::Arc;

use camino::Utf8Path;
use futures_util::future::BoxFuture;
use parking_lot::RwLock;
use st_core::{GraphNode, NodeId, NodeResolver, NodeType, WorkspaceConfig};
use tracing::debug;

/// Basename of `path`, or the whole path for `/` and other name-less roots.
pub(crate) fn entry_name(path: &Utf8Path) -> &str {
    path.file_name().unwrap_or(path.as_str())
}

/// Builds a node without touching the filesystem.
///
/// Returns `None` if the basename matches an ignore pattern.
#[must_use]
pub fn build_node(
    path: &Utf8Path,
    is_dir: bool,
    parent: Option<&NodeId>,
    config: &WorkspaceConfig,
) -> Option<GraphNode> {
    let name = entry_name(path);
    if config.is_ignored(name) {
        return None;
    }

    let (node_type, color) = match (parent.is_some(), is_dir) {
        (false, true) => (NodeType::Root, config.root_color()),
        (true, true) => (NodeType::Directory, config.dir_color()),
        (_, false) => (NodeType::File, config.file_color(name)),
    };

    Some(GraphNode {
        id: NodeId::from_path(path),
        name: name.to_owned(),
        path: path.to_path_buf(),
        node_type,
        level: u8::from(parent.is_some()),
        color: color.to_owned(),
        git_status: None,
    })
}

/// Stats `path` and builds its node.
///
/// Returns `None` if the entry is ignored or cannot be stat'd. Symlinks are
/// reported as files unless `follow_links` is set.
pub async fn make_node(
    path: &Utf8Path,
    parent: Option<&NodeId>,
    config: &WorkspaceConfig,
    follow_links: bool,
) -> Option<GraphNode> {
    if config.is_ignored(entry_name(path)) {
        return None;
    }

    let metadata = if follow_links {
        tokio::fs::metadata(path).await
    } else {
        tokio::fs::symlink_metadata(path).await
    };

    match metadata {
        Ok(meta) => build_node(path, meta.is_dir(), parent, config),
        Err(e) => {
            debug!(path = %path, error = %e, "Entry vanished before it could be stat'd");
            None
        }
    }
}

/// Swappable handle to the current [`WorkspaceConfig`] snapshot.
///
/// Readers take a snapshot (`Arc` clone) and never observe a half-applied
/// change. Replacing the snapshot does not affect readers already holding one.
#[derive(Debug, Clone)]
pub struct SharedConfig(Arc<RwLock<Arc<WorkspaceConfig>>>);

impl SharedConfig {
    /// Wraps an initial snapshot.
    #[must_use]
    pub fn new(config: WorkspaceConfig) -> Self {
        Self(Arc::new(RwLock::new(Arc::new(config))))
    }

    /// The current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<WorkspaceConfig> {
        Arc::clone(&self.0.read())
    }

    /// Installs a new snapshot.
    pub fn replace(&self, config: WorkspaceConfig) {
        *self.0.write() = Arc::new(config);
    }
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self::new(WorkspaceConfig::default())
    }
}

/// [`NodeResolver`] backed by [`make_node`] and a [`SharedConfig`].
///
/// Each resolution reads the snapshot current at that moment.
#[derive(Debug, Clone, Default)]
pub struct NodeFactory {
    config: SharedConfig,
    follow_links: bool,
}

impl NodeFactory {
    /// Creates a factory reading from `config`.
    #[must_use]
    pub const fn new(config: SharedConfig) -> Self {
        Self {
            config,
            follow_links: false,
        }
    }

    /// Follow symbolic links when stat'ing.
    #[must_use]
    pub const fn with_follow_links(mut self, follow: bool) -> Self {
        self.follow_links = follow;
        self
    }
}

impl NodeResolver for NodeFactory {
    fn resolve<'a>(
        &'a self,
        path: &'a Utf8Path,
        parent: &'a NodeId,
    ) -> BoxFuture<'a, Option<GraphNode>> {
        Box::pin(async move {
            let config = self.config.snapshot();
            make_node(path, Some(parent), &config, self.follow_links).await
        })
    }
}
