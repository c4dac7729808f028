//! Concurrent full-graph scanner.
//!
//! # Algorithm
//!
//! Depth-first from the root, fanning out over each directory's children
//! concurrently and joining them before the directory counts as done:
//!
//! ```text
//! visit(path, parent)
//!   ├─ ignored name?            → skip
//!   ├─ gate(stat)               → error: log, skip entry
//!   ├─ push node, push link(parent → path)
//!   └─ directory?
//!        ├─ gate(readdir)       → error: log, skip subtree
//!        └─ join_all(visit(child, path) for child)
//! ```
//!
//! The node is pushed before its children are visited, so every link's
//! source is already present when the link is recorded. Sibling order is
//! whatever order the concurrent visits complete in.
//!
//! All visits run as futures on the calling task; parallelism comes from the
//! blocking pool behind `tokio::fs`, bounded by the [`ConcurrencyGate`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use futures_util::future::{BoxFuture, join_all};
use parking_lot::Mutex;
use st_core::{FxHashSet, GraphData, GraphLink, NodeId, ScanConfig, WorkspaceConfig};
use tracing::{debug, info, warn};

use crate::error::ScanError;
use crate::factory::{build_node, entry_name};
use crate::gate::ConcurrencyGate;
use crate::stats::{ScanStats, StatsSnapshot};

/// Everything a scan produced.
#[derive(Debug, Default)]
pub struct ScanReport {
    /// The graph.
    pub data: GraphData,
    /// Entries and subtrees that were skipped, in the order they failed.
    pub errors: Vec<ScanError>,
    /// Counters.
    pub stats: StatsSnapshot,
    /// Wall-clock duration.
    pub elapsed: Duration,
}

/// Builds [`GraphData`] for a directory tree.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use st_core::{ScanConfig, WorkspaceConfig};
/// use st_scanner::Scanner;
/// use camino::Utf8Path;
///
/// # async fn example() {
/// let scanner = Scanner::new(Arc::new(WorkspaceConfig::default()), &ScanConfig::default());
/// let graph = scanner.scan(Utf8Path::new("/path/to/workspace")).await;
/// println!("{} nodes", graph.len());
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Scanner {
    config: Arc<WorkspaceConfig>,
    gate: ConcurrencyGate,
    follow_links: bool,
}

impl Scanner {
    /// Creates a scanner with its own gate sized from `scan`.
    #[must_use]
    pub fn new(config: Arc<WorkspaceConfig>, scan: &ScanConfig) -> Self {
        Self {
            config,
            gate: ConcurrencyGate::new(scan.max_concurrent_ops),
            follow_links: scan.follow_links,
        }
    }

    /// Uses `gate` instead of a private one.
    #[must_use]
    pub fn with_gate(mut self, gate: ConcurrencyGate) -> Self {
        self.gate = gate;
        self
    }

    /// The gate bounding this scanner's filesystem operations.
    #[inline]
    #[must_use]
    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    /// The config snapshot this scanner applies.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &WorkspaceConfig {
        &self.config
    }

    /// Scans `root` and returns the graph.
    ///
    /// Never fails. Unreadable entries and subtrees are logged and left out.
    pub async fn scan(&self, root: &Utf8Path) -> GraphData {
        self.scan_with_report(root).await.data
    }

    /// Scans `root` and returns the graph together with skipped entries and
    /// counters.
    pub async fn scan_with_report(&self, root: &Utf8Path) -> ScanReport {
        info!(root = %root, budget = self.gate.budget(), "Starting scan");
        let started = Instant::now();

        let traversal = Traversal {
            scanner: self,
            graph: Mutex::new(GraphData::new()),
            errors: Mutex::new(Vec::new()),
            stats: ScanStats::new(),
            visited: Mutex::new(FxHashSet::default()),
        };
        traversal.visit(root.to_path_buf(), None).await;

        let report = ScanReport {
            data: traversal.graph.into_inner(),
            errors: traversal.errors.into_inner(),
            stats: traversal.stats.snapshot(),
            elapsed: started.elapsed(),
        };

        info!(
            root = %root,
            nodes = report.data.nodes.len(),
            links = report.data.links.len(),
            ignored = report.stats.ignored,
            errors = report.stats.errors,
            elapsed_ms = u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX),
            "Scan complete"
        );

        report
    }
}

/// Per-scan state shared by every visit of one traversal.
struct Traversal<'s> {
    scanner: &'s Scanner,
    graph: Mutex<GraphData>,
    errors: Mutex<Vec<ScanError>>,
    stats: ScanStats,
    visited: Mutex<FxHashSet<Utf8PathBuf>>,
}

impl Traversal<'_> {
    fn visit(&self, path: Utf8PathBuf, parent: Option<NodeId>) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let config = &self.scanner.config;
            if config.is_ignored(entry_name(&path)) {
                debug!(path = %path, "Ignored");
                self.stats.increment_ignored();
                return;
            }

            let is_dir = match self.stat(&path).await {
                Ok(is_dir) => is_dir,
                Err(e) => return self.record(e),
            };

            let Some(node) = build_node(&path, is_dir, parent.as_ref(), config) else {
                return;
            };
            let id = node.id.clone();
            {
                let mut graph = self.graph.lock();
                graph.nodes.push(node);
                if let Some(parent) = parent {
                    graph.links.push(GraphLink::new(parent, id.clone()));
                }
            }

            if !is_dir {
                self.stats.increment_files();
                return;
            }
            self.stats.increment_directories();

            if self.scanner.follow_links && !self.first_visit(&path).await {
                debug!(path = %path, "Directory already visited through another link");
                return;
            }

            let children = match self.list(&path).await {
                Ok(children) => children,
                Err(e) => return self.record(e),
            };

            join_all(
                children
                    .into_iter()
                    .map(|child| self.visit(child, Some(id.clone()))),
            )
            .await;
        })
    }

    /// Gated stat. Returns whether the entry is a directory.
    async fn stat(&self, path: &Utf8Path) -> Result<bool, ScanError> {
        let follow = self.scanner.follow_links;
        let metadata = self
            .scanner
            .gate
            .run(async {
                if follow {
                    tokio::fs::metadata(path).await
                } else {
                    tokio::fs::symlink_metadata(path).await
                }
            })
            .await?;
        metadata
            .map(|meta| meta.is_dir())
            .map_err(|e| ScanError::metadata(path, e))
    }

    /// Gated directory listing. Non-UTF-8 names are recorded and skipped.
    async fn list(&self, path: &Utf8Path) -> Result<Vec<Utf8PathBuf>, ScanError> {
        let entries = self
            .scanner
            .gate
            .run(async {
                let mut dir = tokio::fs::read_dir(path).await?;
                let mut entries = Vec::new();
                while let Some(entry) = dir.next_entry().await? {
                    entries.push(entry.path());
                }
                Ok::<_, std::io::Error>(entries)
            })
            .await?
            .map_err(|e| ScanError::read_dir(path, e))?;

        let mut children = Vec::with_capacity(entries.len());
        for entry in entries {
            match Utf8PathBuf::from_path_buf(entry) {
                Ok(child) => children.push(child),
                Err(raw) => self.record(ScanError::NonUtf8Path(raw)),
            }
        }
        Ok(children)
    }

    /// Returns `false` if the canonical directory was already entered.
    async fn first_visit(&self, path: &Utf8Path) -> bool {
        let canonical = self
            .scanner
            .gate
            .run(tokio::fs::canonicalize(path))
            .await
            .ok()
            .and_then(Result::ok)
            .and_then(|p| Utf8PathBuf::from_path_buf(p).ok())
            .unwrap_or_else(|| path.to_path_buf());
        self.visited.lock().insert(canonical)
    }

    fn record(&self, error: ScanError) {
        warn!(error = %error, "Skipping entry");
        self.stats.increment_errors();
        self.errors.lock().push(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use st_core::{IgnoreMatcher, NodeType};
    use std::fs;
    use tempfile::TempDir;

    fn utf8(dir: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 temp dir")
    }

    fn scanner() -> Scanner {
        Scanner::new(Arc::new(WorkspaceConfig::default()), &ScanConfig::default())
    }

    fn ids(graph: &GraphData) -> FxHashSet<String> {
        graph.nodes.iter().map(|n| n.id.to_string()).collect()
    }

    /// w/
    ///   a.ts
    ///   node_modules/x.js
    fn workspace_with_node_modules() -> (TempDir, Utf8PathBuf) {
        let dir = TempDir::new().expect("temp dir");
        let root = utf8(&dir);
        fs::write(root.join("a.ts"), "").expect("write");
        fs::create_dir(root.join("node_modules")).expect("mkdir");
        fs::write(root.join("node_modules/x.js"), "").expect("write");
        (dir, root)
    }

    fn nested_workspace() -> (TempDir, Utf8PathBuf) {
        let dir = TempDir::new().expect("temp dir");
        let root = utf8(&dir);
        for sub in ["src/core", "src/ui/widgets", "docs", "empty"] {
            fs::create_dir_all(root.join(sub)).expect("mkdir");
        }
        for file in [
            "Cargo.toml",
            "src/lib.rs",
            "src/core/mod.rs",
            "src/ui/widgets/button.rs",
            "src/ui/widgets/list.rs",
            "docs/README.md",
        ] {
            fs::write(root.join(file), "").expect("write");
        }
        (dir, root)
    }

    #[tokio::test]
    async fn test_ignored_directory_is_absent() {
        let (_dir, root) = workspace_with_node_modules();
        let graph = scanner().scan(&root).await;

        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.links.len(), 1);

        let root_node = graph.root().expect("root");
        assert_eq!(root_node.node_type, NodeType::Root);
        assert_eq!(root_node.path, root);

        let file = graph.find(root.join("a.ts").as_str()).expect("a.ts");
        assert_eq!(file.node_type, NodeType::File);
        assert_eq!(graph.links[0].source, root_node.id);
        assert_eq!(graph.links[0].target, file.id);

        assert!(!graph.contains(root.join("node_modules").as_str()));
        assert!(!graph.contains(root.join("node_modules/x.js").as_str()));
    }

    #[tokio::test]
    async fn test_scan_satisfies_graph_invariants() {
        let (_dir, root) = nested_workspace();
        let report = scanner().scan_with_report(&root).await;

        assert_eq!(report.data.verify(), Ok(()));
        assert!(report.errors.is_empty());
        // root, src, src/core, src/ui, src/ui/widgets, docs, empty
        assert_eq!(report.stats.directories, 7);
        assert_eq!(report.stats.files, 6);
        assert_eq!(report.data.links.len(), report.data.nodes.len() - 1);
        assert!(report.data.nodes.iter().filter(|n| n.level == 0).count() == 1);
    }

    #[tokio::test]
    async fn test_rescan_is_idempotent_by_id() {
        let (_dir, root) = nested_workspace();
        let scanner = scanner();
        let first = scanner.scan(&root).await;
        let second = scanner.scan(&root).await;
        assert_eq!(ids(&first), ids(&second));
        assert_eq!(first.links.len(), second.links.len());
    }

    #[tokio::test]
    async fn test_wildcard_ignore_drops_nodes_and_links() {
        let (_dir, root) = nested_workspace();
        fs::write(root.join("src/debug.LOG"), "").expect("write");

        let config = WorkspaceConfig::default()
            .with_ignore(IgnoreMatcher::new(["*.log", "widgets"]).expect("patterns"));
        let scanner = Scanner::new(Arc::new(config), &ScanConfig::default());
        let report = scanner.scan_with_report(&root).await;
        let graph = &report.data;

        for gone in ["src/debug.LOG", "src/ui/widgets", "src/ui/widgets/list.rs"] {
            let id = root.join(gone);
            assert!(!graph.contains(id.as_str()), "{gone} should be ignored");
            assert!(
                graph
                    .links
                    .iter()
                    .all(|l| l.source.as_str() != id.as_str() && l.target.as_str() != id.as_str())
            );
        }
        assert!(graph.contains(root.join("src/ui").as_str()));
        assert_eq!(report.stats.ignored, 2);
        assert_eq!(graph.verify(), Ok(()));
    }

    #[tokio::test]
    async fn test_gate_budget_is_respected() {
        let (_dir, root) = nested_workspace();
        for i in 0..40 {
            fs::write(root.join(format!("docs/page{i}.md")), "").expect("write");
        }

        let gate = ConcurrencyGate::new(2);
        let scanner = scanner().with_gate(gate.clone());
        let graph = scanner.scan(&root).await;

        assert_eq!(graph.verify(), Ok(()));
        assert!(gate.peak_in_flight() <= 2);
        assert_eq!(gate.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_missing_root_yields_empty_graph() {
        let dir = TempDir::new().expect("temp dir");
        let root = utf8(&dir).join("missing");
        let report = scanner().scan_with_report(&root).await;

        assert!(report.data.is_empty());
        assert_eq!(report.errors.len(), 1);
        assert!(matches!(report.errors[0], ScanError::Metadata { .. }));
        assert_eq!(report.stats.errors, 1);
    }

    #[tokio::test]
    async fn test_file_root_is_single_node() {
        let dir = TempDir::new().expect("temp dir");
        let file = utf8(&dir).join("only.rs");
        fs::write(&file, "").expect("write");

        let graph = scanner().scan(&file).await;
        assert_eq!(graph.nodes.len(), 1);
        assert!(graph.links.is_empty());
        assert_eq!(graph.nodes[0].node_type, NodeType::File);
        assert_eq!(graph.nodes[0].level, 0);
    }

    #[tokio::test]
    async fn test_closed_gate_skips_everything() {
        let (_dir, root) = nested_workspace();
        let gate = ConcurrencyGate::new(4);
        gate.close();
        let report = scanner().with_gate(gate).scan_with_report(&root).await;
        assert!(report.data.is_empty());
        assert!(report.errors.iter().all(ScanError::is_fatal));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_loop_terminates() {
        let (_dir, root) = nested_workspace();
        std::os::unix::fs::symlink(&root, root.join("src/loop")).expect("symlink");

        let plain = scanner().scan(&root).await;
        let link = plain.find(root.join("src/loop").as_str()).expect("link node");
        assert_eq!(link.node_type, NodeType::File);

        let following = ScanConfig {
            follow_links: true,
            ..ScanConfig::default()
        };
        let scanner = Scanner::new(Arc::new(WorkspaceConfig::default()), &following);
        let graph = scanner.scan(&root).await;
        let link = graph.find(root.join("src/loop").as_str()).expect("link node");
        assert_eq!(link.node_type, NodeType::Directory);
        assert!(!graph.contains(root.join("src/loop/src").as_str()));
        assert_eq!(graph.verify(), Ok(()));
    }
}
