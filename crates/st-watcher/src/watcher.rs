//! Filesystem watcher bridged to the async runtime.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────── blocking thread (spawn_blocking) ─────────────────────┐
//! │  RecommendedWatcher (notify) ──► translate ──► FileFilter ──► blocking_send │
//! └──────────────────────────────────────────────────────────────────┬──────────┘
//!                                                                    ▼
//!                                        FileWatcher::recv ◄── mpsc::Receiver
//! ```
//!
//! No debouncing happens here. Coalescing belongs to the
//! [`ChangeProcessor`](crate::ChangeProcessor), which needs to see every
//! create and delete to apply its cancellation rule.
//!
//! # Translation
//!
//! | notify kind                  | forwarded as                                  |
//! |------------------------------|-----------------------------------------------|
//! | `Create(_)`                  | create                                        |
//! | `Remove(_)`                  | delete                                        |
//! | `Modify(Name(From))`         | delete                                        |
//! | `Modify(Name(To))`           | create                                        |
//! | `Modify(Name(Both))`         | delete old, create new                        |
//! | `Modify(Name(Any \| Other))` | create if the path exists, else delete        |
//! | `Modify(Data \| Any)`        | [`WatchEvent::Content`]                       |
//! | anything under `<root>/.git` | [`WatchEvent::Repository`]                    |
//! | everything else              | dropped                                       |

use camino::{Utf8Path, Utf8PathBuf};
use notify::event::{EventKind, ModifyKind, RenameMode};
use notify::{RecursiveMode, Watcher};
use smallvec::SmallVec;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use st_core::WatchConfig;

use crate::error::WatchError;
use crate::events::{ChangeKind, FileEvent, WatchEvent, WatchEvents, is_repository_path};
use crate::filter::FileFilter;

/// Default channel capacity for watch events.
const DEFAULT_CHANNEL_CAPACITY: usize = 100;

/// Watches a workspace and streams structural changes to async code.
///
/// Dropping the watcher signals the blocking thread to stop. Use
/// [`shutdown`](Self::shutdown) to also wait for it.
///
/// # Examples
///
/// ```no_run
/// use camino::Utf8Path;
/// use st_core::WatchConfig;
/// use st_watcher::{AcceptAllFilter, FileWatcher, WatchEvent};
///
/// # async fn example() -> Result<(), st_watcher::WatchError> {
/// let mut watcher = FileWatcher::new(
///     Utf8Path::new("./"),
///     &WatchConfig::default(),
///     AcceptAllFilter,
/// )?;
///
/// while let Some(event) = watcher.recv().await {
///     if let WatchEvent::File(change) = event {
///         println!("{} {}", change.kind, change.path);
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub struct FileWatcher {
    shutdown_tx: Option<oneshot::Sender<()>>,
    task_handle: Option<JoinHandle<Result<(), WatchError>>>,
    event_rx: mpsc::Receiver<WatchEvent>,
    watch_path: Utf8PathBuf,
}

impl std::fmt::Debug for FileWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWatcher")
            .field("watch_path", &self.watch_path)
            .field("is_running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl FileWatcher {
    /// Starts watching `path`.
    ///
    /// # Errors
    ///
    /// - [`WatchError::PathNotFound`] if `path` does not exist
    /// - [`WatchError::NoRuntime`] if called outside a tokio runtime
    /// - [`WatchError::Io`] if the path cannot be canonicalized
    ///
    /// Failures to start the underlying notify watcher surface from
    /// [`shutdown`](Self::shutdown), and the event stream ends immediately.
    pub fn new<F: FileFilter>(
        path: &Utf8Path,
        config: &WatchConfig,
        filter: F,
    ) -> Result<Self, WatchError> {
        Self::with_capacity(path, config, filter, DEFAULT_CHANNEL_CAPACITY)
    }

    /// Starts watching `path` with a custom event channel capacity.
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new).
    pub fn with_capacity<F: FileFilter>(
        path: &Utf8Path,
        config: &WatchConfig,
        filter: F,
        channel_capacity: usize,
    ) -> Result<Self, WatchError> {
        if !path.exists() {
            return Err(WatchError::path_not_found(path));
        }
        let handle = tokio::runtime::Handle::try_current()?;
        let watch_path = path.canonicalize_utf8()?;

        let (event_tx, event_rx) = mpsc::channel(channel_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let task_path = watch_path.clone();
        let recursive = config.recursive;
        let task_handle = handle.spawn_blocking(move || {
            run_watcher_loop(task_path, recursive, event_tx, shutdown_rx, filter)
        });

        Ok(Self {
            shutdown_tx: Some(shutdown_tx),
            task_handle: Some(task_handle),
            event_rx,
            watch_path,
        })
    }

    /// Receives the next event. `None` once the watcher has stopped.
    pub async fn recv(&mut self) -> Option<WatchEvent> {
        self.event_rx.recv().await
    }

    /// The canonical path being watched.
    #[must_use]
    pub fn watch_path(&self) -> &Utf8Path {
        &self.watch_path
    }

    /// Returns `true` while the watcher thread is alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shutdown_tx.is_some() && self.task_handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stops the watcher and waits for its thread.
    ///
    /// # Errors
    ///
    /// Returns the error the watcher thread stopped with, if any.
    pub async fn shutdown(mut self) -> Result<(), WatchError> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.task_handle.take() {
            handle.await??;
        }
        Ok(())
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

#[allow(clippy::needless_pass_by_value)] // Owned for the lifetime of the blocking task
fn run_watcher_loop<F: FileFilter>(
    path: Utf8PathBuf,
    recursive: bool,
    event_tx: mpsc::Sender<WatchEvent>,
    shutdown_rx: oneshot::Receiver<()>,
    filter: F,
) -> Result<(), WatchError> {
    let root = path.clone();
    let mut watcher =
        notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
            Ok(event) => {
                for translated in translate(&root, event, &filter) {
                    if event_tx.blocking_send(translated).is_err() {
                        debug!("Event channel closed, dropping watch events");
                        break;
                    }
                }
            }
            Err(error) => warn!(error = %error, "Watcher error"),
        })?;

    let mode = if recursive {
        RecursiveMode::Recursive
    } else {
        RecursiveMode::NonRecursive
    };
    watcher.watch(path.as_std_path(), mode)?;

    info!(path = %path, recursive, "File watcher started");
    let _ = shutdown_rx.blocking_recv();
    info!(path = %path, "File watcher stopped");

    Ok(())
}

/// Maps one notify event onto zero, one or two [`WatchEvent`]s.
pub(crate) fn translate<F: FileFilter + ?Sized>(
    root: &Utf8Path,
    event: notify::Event,
    filter: &F,
) -> WatchEvents {
    let mut out = WatchEvents::new();
    if matches!(event.kind, EventKind::Access(_)) {
        return out;
    }

    let mut paths: SmallVec<[Utf8PathBuf; 2]> = SmallVec::new();
    for raw in event.paths {
        match Utf8PathBuf::from_path_buf(raw) {
            Ok(path) => paths.push(path),
            Err(raw) => warn!(path = %raw.display(), "Skipping non-UTF-8 path in watch event"),
        }
    }

    if paths.iter().any(|p| is_repository_path(root, p)) {
        out.push(WatchEvent::Repository);
        return out;
    }

    if matches!(event.kind, EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any)) {
        out.extend(
            paths
                .into_iter()
                .filter(|p| filter.should_process(p))
                .map(WatchEvent::Content),
        );
        return out;
    }

    let mut push = |kind: ChangeKind, path: Utf8PathBuf| {
        if filter.should_process(&path) {
            out.push(WatchEvent::File(FileEvent::new(kind, path)));
        } else {
            trace!(path = %path, "Filtered out watch event");
        }
    };

    match event.kind {
        EventKind::Create(_) => paths.into_iter().for_each(|p| push(ChangeKind::Create, p)),
        EventKind::Remove(_) => paths.into_iter().for_each(|p| push(ChangeKind::Delete, p)),
        EventKind::Modify(ModifyKind::Name(mode)) => match mode {
            RenameMode::From => paths.into_iter().for_each(|p| push(ChangeKind::Delete, p)),
            RenameMode::To => paths.into_iter().for_each(|p| push(ChangeKind::Create, p)),
            RenameMode::Both => {
                let mut paths = paths.into_iter();
                if let Some(old) = paths.next() {
                    push(ChangeKind::Delete, old);
                }
                if let Some(new) = paths.next() {
                    push(ChangeKind::Create, new);
                }
            }
            RenameMode::Any | RenameMode::Other => {
                for path in paths {
                    let kind = if path.exists() {
                        ChangeKind::Create
                    } else {
                        ChangeKind::Delete
                    };
                    push(kind, path);
                }
            }
        },
        _ => {}
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{AcceptAllFilter, IgnoreFilter};
    use notify::event::{AccessKind, CreateKind, DataChange, RemoveKind};
    use st_core::IgnoreMatcher;
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::TempDir;

    fn event(kind: EventKind, paths: &[&str]) -> notify::Event {
        paths
            .iter()
            .fold(notify::Event::new(kind), |e, p| e.add_path(PathBuf::from(p)))
    }

    fn run(kind: EventKind, paths: &[&str]) -> Vec<WatchEvent> {
        translate(Utf8Path::new("/w"), event(kind, paths), &AcceptAllFilter).into_vec()
    }

    fn file(kind: ChangeKind, path: &str) -> WatchEvent {
        WatchEvent::File(FileEvent::new(kind, path))
    }

    #[test]
    fn test_create_and_remove() {
        assert_eq!(
            run(EventKind::Create(CreateKind::File), &["/w/a.ts"]),
            vec![file(ChangeKind::Create, "/w/a.ts")]
        );
        assert_eq!(
            run(EventKind::Remove(RemoveKind::Folder), &["/w/src"]),
            vec![file(ChangeKind::Delete, "/w/src")]
        );
    }

    #[test]
    fn test_rename_both_is_delete_then_create() {
        assert_eq!(
            run(
                EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
                &["/w/a.ts", "/w/b.ts"]
            ),
            vec![
                file(ChangeKind::Delete, "/w/a.ts"),
                file(ChangeKind::Create, "/w/b.ts"),
            ]
        );
    }

    #[test]
    fn test_rename_halves() {
        assert_eq!(
            run(EventKind::Modify(ModifyKind::Name(RenameMode::From)), &["/w/a.ts"]),
            vec![file(ChangeKind::Delete, "/w/a.ts")]
        );
        assert_eq!(
            run(EventKind::Modify(ModifyKind::Name(RenameMode::To)), &["/w/b.ts"]),
            vec![file(ChangeKind::Create, "/w/b.ts")]
        );
    }

    #[test]
    fn test_ambiguous_rename_checks_existence() {
        let dir = TempDir::new().expect("temp dir");
        let root = Utf8Path::from_path(dir.path()).expect("utf-8");
        let present = root.join("present.ts");
        std::fs::write(&present, "").expect("write");
        let absent = root.join("absent.ts");

        let out = translate(
            root,
            event(
                EventKind::Modify(ModifyKind::Name(RenameMode::Any)),
                &[present.as_str(), absent.as_str()],
            ),
            &AcceptAllFilter,
        );
        assert_eq!(
            out.into_vec(),
            vec![
                file(ChangeKind::Create, present.as_str()),
                file(ChangeKind::Delete, absent.as_str()),
            ]
        );
    }

    #[test]
    fn test_repository_changes_collapse() {
        assert_eq!(
            run(EventKind::Modify(ModifyKind::Any), &["/w/.git/index"]),
            vec![WatchEvent::Repository]
        );
        assert_eq!(
            run(EventKind::Create(CreateKind::File), &["/w/.git/index.lock"]),
            vec![WatchEvent::Repository]
        );
    }

    #[test]
    fn test_content_change_is_not_structural() {
        assert_eq!(
            run(
                EventKind::Modify(ModifyKind::Data(DataChange::Content)),
                &["/w/a.ts"]
            ),
            vec![WatchEvent::Content(Utf8PathBuf::from("/w/a.ts"))]
        );
        assert!(run(EventKind::Access(AccessKind::Read), &["/w/a.ts"]).is_empty());
        assert!(run(EventKind::Other, &["/w/a.ts"]).is_empty());
    }

    #[test]
    fn test_filter_applies_to_each_half_of_a_rename() {
        let filter = IgnoreFilter::new("/w", IgnoreMatcher::new(["dist"]).expect("patterns"));
        let out = translate(
            Utf8Path::new("/w"),
            event(
                EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
                &["/w/dist/a.js", "/w/src/a.js"],
            ),
            &filter,
        );
        assert_eq!(out.into_vec(), vec![file(ChangeKind::Create, "/w/src/a.js")]);
    }

    #[tokio::test]
    async fn test_watcher_path_not_found() {
        let result = FileWatcher::new(
            Utf8Path::new("/nonexistent/path/that/does/not/exist"),
            &WatchConfig::default(),
            AcceptAllFilter,
        );
        assert!(matches!(result, Err(WatchError::PathNotFound(_))));
    }

    #[test]
    fn test_watcher_requires_runtime() {
        let dir = TempDir::new().expect("temp dir");
        let path = Utf8Path::from_path(dir.path()).expect("utf-8");
        let result = FileWatcher::new(path, &WatchConfig::default(), AcceptAllFilter);
        assert!(matches!(result, Err(WatchError::NoRuntime(_))));
    }

    #[tokio::test]
    async fn test_watcher_lifecycle() {
        let dir = TempDir::new().expect("temp dir");
        let path = Utf8Path::from_path(dir.path()).expect("utf-8");

        let watcher = FileWatcher::new(path, &WatchConfig::default(), AcceptAllFilter)
            .expect("watcher");
        assert!(watcher.is_running());
        assert!(!watcher.watch_path().as_str().is_empty());
        watcher.shutdown().await.expect("shutdown");
    }

    #[tokio::test]
    async fn test_watcher_reports_created_file() {
        let dir = TempDir::new().expect("temp dir");
        let path = Utf8Path::from_path(dir.path()).expect("utf-8");
        let mut watcher = FileWatcher::new(path, &WatchConfig::default(), AcceptAllFilter)
            .expect("watcher");

        // Give the backend a moment to register the watch.
        tokio::time::sleep(Duration::from_millis(100)).await;
        std::fs::write(dir.path().join("new.ts"), "x").expect("write");

        let received = tokio::time::timeout(Duration::from_secs(2), async {
            while let Some(event) = watcher.recv().await {
                if let WatchEvent::File(change) = event {
                    return Some(change);
                }
            }
            None
        })
        .await;

        // Timing-dependent across platforms, only check what did arrive.
        if let Ok(Some(change)) = received {
            assert!(change.path.as_str().ends_with("new.ts"));
        }
        watcher.shutdown().await.expect("shutdown");
    }
}
