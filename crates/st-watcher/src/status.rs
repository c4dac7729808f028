//! Version-control status snapshots and diffs.
//!
//! A [`StatusSource`] reads the full set of non-clean paths. The
//! [`StatusSynchronizer`] keeps the last snapshot and turns each new one into
//! a [`StatusDelta`]:
//!
//! ```text
//!   previous            current             delta (incremental)
//!   a.ts  modified      a.ts  modified      -
//!   b.ts  untracked     b.ts  staged        b.ts → staged
//!   c.ts  modified                          c.ts → null
//!                       d.ts  untracked     d.ts → untracked
//! ```
//!
//! A forced sync additionally repeats every unchanged entry (`a.ts` above).

use std::collections::BTreeMap;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use git2::{ErrorCode, Repository, Status, StatusOptions};
use parking_lot::RwLock;
use tracing::{debug, trace};

use st_core::{FxHashMap, GitStatus, NodeId, StatusChanges, StatusLookup};

use crate::error::WatchError;

/// Every non-clean path, keyed by absolute path id.
pub type StatusMap = FxHashMap<NodeId, GitStatus>;

/// Reads the current status of a workspace. Called on the blocking pool.
pub trait StatusSource: Send + Sync + 'static {
    /// Returns every path that is not clean.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository cannot be read. A workspace that
    /// is not under version control is not an error: it has no status.
    fn snapshot(&self) -> Result<StatusMap, WatchError>;
}

/// [`StatusSource`] backed by the git repository containing a workspace.
#[derive(Debug, Clone)]
pub struct GitStatusSource {
    root: Utf8PathBuf,
}

impl GitStatusSource {
    /// Creates a source for the repository that contains `root`.
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The workspace path the repository is discovered from.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }
}

impl StatusSource for GitStatusSource {
    fn snapshot(&self) -> Result<StatusMap, WatchError> {
        let repo = match Repository::discover(self.root.as_std_path()) {
            Ok(repo) => repo,
            Err(e) if e.code() == ErrorCode::NotFound => {
                trace!(root = %self.root, "Not inside a git repository");
                return Ok(StatusMap::default());
            }
            Err(e) => return Err(e.into()),
        };
        let Some(workdir) = repo.workdir() else {
            return Ok(StatusMap::default());
        };
        let workdir = Utf8Path::from_path(workdir)
            .ok_or_else(|| WatchError::non_utf8_path(workdir))?
            .to_path_buf();

        let mut options = StatusOptions::new();
        options
            .include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false);

        let statuses = repo.statuses(Some(&mut options))?;
        let mut map = StatusMap::default();
        for entry in statuses.iter() {
            let (Some(relative), Some(status)) = (entry.path(), classify(entry.status())) else {
                continue;
            };
            let path = workdir.join(relative.trim_end_matches('/'));
            map.insert(NodeId::from(path), status);
        }

        debug!(root = %self.root, dirty = map.len(), "Read git status");
        Ok(map)
    }
}

/// Collapses git's status bits into one indicator. Working-tree state wins
/// over index state.
fn classify(status: Status) -> Option<GitStatus> {
    if status.is_ignored() {
        None
    } else if status.is_wt_new() {
        Some(GitStatus::Untracked)
    } else if status.intersects(
        Status::WT_MODIFIED
            | Status::WT_DELETED
            | Status::WT_RENAMED
            | Status::WT_TYPECHANGE
            | Status::CONFLICTED,
    ) {
        Some(GitStatus::Modified)
    } else if status.intersects(
        Status::INDEX_NEW
            | Status::INDEX_MODIFIED
            | Status::INDEX_DELETED
            | Status::INDEX_RENAMED
            | Status::INDEX_TYPECHANGE,
    ) {
        Some(GitStatus::Staged)
    } else {
        None
    }
}

/// A status patch ready for the sink. `None` clears a previous status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusDelta {
    /// Id → new status.
    pub changes: StatusChanges,
}

impl StatusDelta {
    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Returns `true` if nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// The single entry, if there is exactly one.
    #[must_use]
    pub fn single(&self) -> Option<(&NodeId, Option<GitStatus>)> {
        match self.changes.len() {
            1 => self.changes.iter().next().map(|(id, status)| (id, *status)),
            _ => None,
        }
    }

    /// Keeps only entries whose id satisfies `keep`.
    #[must_use]
    pub fn retain(mut self, mut keep: impl FnMut(&NodeId) -> bool) -> Self {
        self.changes.retain(|id, _| keep(id));
        self
    }
}

/// Computes the patch that turns `previous` into `current`.
#[must_use]
pub fn diff_status(previous: &StatusMap, current: &StatusMap, force: bool) -> StatusChanges {
    let mut changes = StatusChanges::new();
    for (id, status) in current {
        if force || previous.get(id) != Some(status) {
            changes.insert(id.clone(), Some(*status));
        }
    }
    for id in previous.keys() {
        if !current.contains_key(id) {
            changes.insert(id.clone(), None);
        }
    }
    changes
}

/// Tracks the last status snapshot of a workspace.
pub struct StatusSynchronizer {
    source: Arc<dyn StatusSource>,
    last: RwLock<StatusMap>,
}

impl std::fmt::Debug for StatusSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusSynchronizer")
            .field("known", &self.last.read().len())
            .finish_non_exhaustive()
    }
}

impl StatusSynchronizer {
    /// Creates a synchronizer with an empty last snapshot.
    #[must_use]
    pub fn new(source: Arc<dyn StatusSource>) -> Self {
        Self {
            source,
            last: RwLock::new(StatusMap::default()),
        }
    }

    /// Reads a fresh snapshot and returns what changed since the last one.
    ///
    /// With `force`, every currently non-clean path is included whether or
    /// not it changed. Clearances are always included.
    ///
    /// # Errors
    ///
    /// Returns the source's error. The last snapshot is left untouched.
    pub async fn sync(&self, force: bool) -> Result<StatusDelta, WatchError> {
        let source = Arc::clone(&self.source);
        let current = tokio::task::spawn_blocking(move || source.snapshot()).await??;

        let mut last = self.last.write();
        let changes = diff_status(&last, &current, force);
        *last = current;
        drop(last);

        trace!(changes = changes.len(), force, "Status synchronized");
        Ok(StatusDelta { changes })
    }

    /// The last snapshot, sorted by id.
    #[must_use]
    pub fn current(&self) -> BTreeMap<NodeId, GitStatus> {
        self.last
            .read()
            .iter()
            .map(|(id, status)| (id.clone(), *status))
            .collect()
    }

    /// Forgets the last snapshot, so the next sync reports everything.
    pub fn reset(&self) {
        self.last.write().clear();
    }
}

impl StatusLookup for StatusSynchronizer {
    fn status_of(&self, path: &Utf8Path) -> Option<GitStatus> {
        self.last.read().get(path.as_str()).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::Signature;
    use parking_lot::Mutex;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    struct FakeSource(Mutex<StatusMap>);

    impl FakeSource {
        fn set(&self, entries: &[(&str, GitStatus)]) {
            *self.0.lock() = entries
                .iter()
                .map(|(path, status)| (NodeId::new(*path), *status))
                .collect();
        }
    }

    impl StatusSource for FakeSource {
        fn snapshot(&self) -> Result<StatusMap, WatchError> {
            Ok(self.0.lock().clone())
        }
    }

    fn fake() -> (Arc<FakeSource>, StatusSynchronizer) {
        let source = Arc::new(FakeSource(Mutex::new(StatusMap::default())));
        let sync = StatusSynchronizer::new(Arc::clone(&source) as Arc<dyn StatusSource>);
        (source, sync)
    }

    fn change(delta: &StatusDelta, id: &str) -> Option<Option<GitStatus>> {
        delta.changes.get(id).copied()
    }

    #[tokio::test]
    async fn test_incremental_sync_reports_transitions() {
        let (source, sync) = fake();
        source.set(&[
            ("/w/a.ts", GitStatus::Modified),
            ("/w/b.ts", GitStatus::Untracked),
            ("/w/c.ts", GitStatus::Modified),
        ]);
        let first = sync.sync(false).await.expect("sync");
        assert_eq!(first.len(), 3);

        let unchanged = sync.sync(false).await.expect("sync");
        assert!(unchanged.is_empty());

        source.set(&[
            ("/w/a.ts", GitStatus::Modified),
            ("/w/b.ts", GitStatus::Staged),
            ("/w/d.ts", GitStatus::Untracked),
        ]);
        let delta = sync.sync(false).await.expect("sync");
        assert_eq!(delta.len(), 3);
        assert_eq!(change(&delta, "/w/a.ts"), None);
        assert_eq!(change(&delta, "/w/b.ts"), Some(Some(GitStatus::Staged)));
        assert_eq!(change(&delta, "/w/c.ts"), Some(None));
        assert_eq!(change(&delta, "/w/d.ts"), Some(Some(GitStatus::Untracked)));
    }

    #[tokio::test]
    async fn test_forced_sync_repeats_everything() {
        let (source, sync) = fake();
        source.set(&[("/w/a.ts", GitStatus::Modified)]);
        sync.sync(false).await.expect("sync");

        let forced = sync.sync(true).await.expect("sync");
        assert_eq!(forced.single(), Some((&NodeId::new("/w/a.ts"), Some(GitStatus::Modified))));
    }

    #[tokio::test]
    async fn test_lookup_uses_last_snapshot() {
        let (source, sync) = fake();
        assert_eq!(sync.status_of(Utf8Path::new("/w/a.ts")), None);
        source.set(&[("/w/a.ts", GitStatus::Staged)]);
        sync.sync(false).await.expect("sync");
        assert_eq!(
            sync.status_of(Utf8Path::new("/w/a.ts")),
            Some(GitStatus::Staged)
        );
        assert_eq!(sync.current().len(), 1);

        sync.reset();
        assert_eq!(sync.status_of(Utf8Path::new("/w/a.ts")), None);
        assert_eq!(sync.sync(false).await.expect("sync").len(), 1);
    }

    #[test]
    fn test_retain_and_single() {
        let mut changes = StatusChanges::new();
        changes.insert(NodeId::new("/w/a.ts"), Some(GitStatus::Modified));
        changes.insert(NodeId::new("/x/b.ts"), None);
        let delta = StatusDelta { changes };
        assert!(delta.single().is_none());

        let kept = delta.retain(|id| id.as_path().starts_with("/w"));
        assert_eq!(kept.single(), Some((&NodeId::new("/w/a.ts"), Some(GitStatus::Modified))));
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(Status::WT_NEW), Some(GitStatus::Untracked));
        assert_eq!(classify(Status::INDEX_NEW), Some(GitStatus::Staged));
        assert_eq!(
            classify(Status::INDEX_MODIFIED | Status::WT_MODIFIED),
            Some(GitStatus::Modified)
        );
        assert_eq!(classify(Status::IGNORED), None);
        assert_eq!(classify(Status::CURRENT), None);
    }

    fn canonical_dir() -> (TempDir, Utf8PathBuf) {
        let dir = TempDir::new().expect("temp dir");
        let root = Utf8PathBuf::from_path_buf(dir.path().canonicalize().expect("canonicalize"))
            .expect("utf-8");
        (dir, root)
    }

    fn commit(repo: &Repository, files: &[&str]) {
        let mut index = repo.index().expect("index");
        for file in files {
            index.add_path(Path::new(file)).expect("add");
        }
        index.write().expect("write index");
        let tree = repo
            .find_tree(index.write_tree().expect("write tree"))
            .expect("tree");
        let signature = Signature::now("Test", "test@example.com").expect("signature");
        repo.commit(Some("HEAD"), &signature, &signature, "init", &tree, &[])
            .expect("commit");
    }

    fn status_by_name(map: &StatusMap, name: &str) -> Option<GitStatus> {
        map.iter()
            .find(|(id, _)| id.as_path().file_name() == Some(name))
            .map(|(_, status)| *status)
    }

    #[test]
    fn test_git_source_reads_repository() {
        let (_dir, root) = canonical_dir();
        let repo = Repository::init(&root).expect("init");

        fs::write(root.join("clean.txt"), "a").expect("write");
        fs::write(root.join("edited.txt"), "a").expect("write");
        commit(&repo, &["clean.txt", "edited.txt"]);

        fs::write(root.join("edited.txt"), "edited contents").expect("write");
        fs::write(root.join("staged.txt"), "a").expect("write");
        let mut index = repo.index().expect("index");
        index.add_path(Path::new("staged.txt")).expect("add");
        index.write().expect("write index");
        fs::write(root.join(".gitignore"), "*.log\n").expect("write");
        fs::write(root.join("debug.log"), "x").expect("write");
        fs::create_dir(root.join("fresh")).expect("mkdir");
        fs::write(root.join("fresh/new.txt"), "x").expect("write");

        let map = GitStatusSource::new(root.clone()).snapshot().expect("snapshot");

        assert_eq!(status_by_name(&map, "clean.txt"), None);
        assert_eq!(status_by_name(&map, "edited.txt"), Some(GitStatus::Modified));
        assert_eq!(status_by_name(&map, "staged.txt"), Some(GitStatus::Staged));
        assert_eq!(status_by_name(&map, "new.txt"), Some(GitStatus::Untracked));
        assert_eq!(status_by_name(&map, "debug.log"), None);
        assert!(map.contains_key(root.join("fresh/new.txt").as_str()));
    }

    #[test]
    fn test_worktree_change_wins_over_staged() {
        let (_dir, root) = canonical_dir();
        let repo = Repository::init(&root).expect("init");
        fs::write(root.join("a.txt"), "1").expect("write");
        commit(&repo, &["a.txt"]);

        fs::write(root.join("a.txt"), "22").expect("write");
        let mut index = repo.index().expect("index");
        index.add_path(Path::new("a.txt")).expect("add");
        index.write().expect("write index");
        fs::write(root.join("a.txt"), "333").expect("write");

        let map = GitStatusSource::new(root).snapshot().expect("snapshot");
        assert_eq!(status_by_name(&map, "a.txt"), Some(GitStatus::Modified));
    }

    #[test]
    fn test_outside_repository_is_clean() {
        let (_dir, root) = canonical_dir();
        let map = GitStatusSource::new(root).snapshot().expect("snapshot");
        assert!(map.is_empty());
    }
}
