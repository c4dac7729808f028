//! The session-scoped context: one workspace, one sink, one ordered stream.

use std::future::Future;
use std::sync::Arc;

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use st_core::{
    Config, GraphData, NodeAction, NodeId, SinkMessage, StatusLookup, UiMessage, WorkspaceConfig,
};
use st_scanner::{
    ConcurrencyGate, NodeFactory, ScanGenerations, ScanTicket, Scanner, SharedConfig,
};
use st_watcher::{
    ChangeProcessor, FileEvent, FileWatcher, GitStatusSource, GraphDelta, IgnoreFilter,
    NodeAddition, StatusDelta, StatusSource, StatusSynchronizer,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::error::{OpError, SessionError};
use crate::ops;
use crate::protocol::{HostCommand, Outbound};

/// What the caller must do after a UI message was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Followup {
    /// Nothing further.
    None,
    /// Start a full scan of the current root.
    Rescan,
    /// The configuration changed: restart the watcher and rescan.
    Reconfigured,
}

/// A finished scan, waiting to be applied.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    /// Generation the scan was started under.
    pub ticket: ScanTicket,
    /// The root that was scanned.
    pub root: Utf8PathBuf,
    /// Whether `root` differs from the workspace root.
    pub is_custom_root: bool,
    /// The resulting graph.
    pub data: GraphData,
}

/// Serves one workspace to one sink.
///
/// All outbound traffic goes through a single ordered channel, which is what
/// serializes full snapshots against incremental deltas.
pub struct Session {
    workspace_root: Utf8PathBuf,
    custom_root: Option<Utf8PathBuf>,
    config: Config,
    workspace: SharedConfig,
    gate: ConcurrencyGate,
    generations: ScanGenerations,
    processor: ChangeProcessor,
    status: Arc<StatusSynchronizer>,
    outbound: mpsc::Sender<Outbound>,
    pending_focus: Option<NodeId>,
    status_dirty: bool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("workspace_root", &self.workspace_root)
            .field("custom_root", &self.custom_root)
            .field("processor", &self.processor)
            .field("pending_focus", &self.pending_focus)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Opens a session on `root` with git-backed status.
    ///
    /// Returns the session and the receiving end of its change processor.
    /// Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Fails if the root cannot be canonicalized, the configuration is
    /// invalid, or there is no runtime.
    pub fn new(
        root: &Utf8Path,
        config: Config,
        outbound: mpsc::Sender<Outbound>,
    ) -> Result<(Self, mpsc::Receiver<GraphDelta>), SessionError> {
        let root = root
            .canonicalize_utf8()
            .map_err(|source| SessionError::Root {
                path: root.to_path_buf(),
                source,
            })?;
        let source = Arc::new(GitStatusSource::new(root.clone()));
        Self::with_status_source(root, config, source, outbound)
    }

    /// Opens a session with a custom status source.
    ///
    /// `root` must already be absolute and canonical.
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid or there is no runtime.
    pub fn with_status_source(
        root: Utf8PathBuf,
        config: Config,
        source: Arc<dyn StatusSource>,
        outbound: mpsc::Sender<Outbound>,
    ) -> Result<(Self, mpsc::Receiver<GraphDelta>), SessionError> {
        config.validate()?;
        let workspace = SharedConfig::new(config.workspace_config()?);
        let status = Arc::new(StatusSynchronizer::new(source));

        let resolver =
            NodeFactory::new(workspace.clone()).with_follow_links(config.scan.follow_links);
        let lookup: Arc<dyn StatusLookup> = Arc::clone(&status) as Arc<dyn StatusLookup>;
        let (processor, deltas) =
            ChangeProcessor::new(config.processor, Arc::new(resolver), lookup)?;

        info!(root = %root, "Session opened");
        let session = Self {
            gate: ConcurrencyGate::new(config.scan.max_concurrent_ops),
            workspace_root: root,
            custom_root: None,
            config,
            workspace,
            generations: ScanGenerations::new(),
            processor,
            status,
            outbound,
            pending_focus: None,
            status_dirty: false,
        };
        Ok((session, deltas))
    }

    /// The workspace root.
    #[must_use]
    pub fn workspace_root(&self) -> &Utf8Path {
        &self.workspace_root
    }

    /// The root currently displayed: the custom root if set, else the
    /// workspace root.
    #[must_use]
    pub fn current_root(&self) -> &Utf8Path {
        self.custom_root.as_deref().unwrap_or(&self.workspace_root)
    }

    /// Returns `true` if the graph is rooted below the workspace root.
    #[must_use]
    pub fn is_custom_root(&self) -> bool {
        self.custom_root.is_some()
    }

    /// The current configuration document.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The current display snapshot.
    #[must_use]
    pub fn workspace_config(&self) -> Arc<WorkspaceConfig> {
        self.workspace.snapshot()
    }

    /// The change processor fed by this session.
    #[must_use]
    pub fn processor(&self) -> &ChangeProcessor {
        &self.processor
    }

    /// Returns `true` if a status refresh is due.
    #[must_use]
    pub fn is_status_dirty(&self) -> bool {
        self.status_dirty
    }

    /// Handles one message from the UI.
    ///
    /// Request failures are reported to the host as `showError` and do not
    /// fail this call.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::ChannelClosed`] if the sink is gone.
    pub async fn handle_ui(&mut self, msg: UiMessage) -> Result<Followup, SessionError> {
        match msg {
            UiMessage::Ready | UiMessage::Refresh => Ok(Followup::Rescan),
            UiMessage::OpenFile { path } => {
                self.send(HostCommand::OpenFile { path }).await?;
                Ok(Followup::None)
            }
            UiMessage::NodeAction { action, path, name } => {
                match self.run_action(action, &path, name.as_deref()).await {
                    Ok(followup) => Ok(followup),
                    Err(err) => {
                        warn!(?action, path = %path, error = %err, "Node action failed");
                        self.report(err.to_string()).await?;
                        Ok(Followup::None)
                    }
                }
            }
            UiMessage::Reveal { path } => {
                self.reveal(&path).await?;
                Ok(Followup::None)
            }
            UiMessage::Configure { config } => match self.reconfigure(*config) {
                Ok(()) => Ok(Followup::Reconfigured),
                Err(err) => {
                    warn!(error = %err, "Rejected configuration");
                    self.report(err.to_string()).await?;
                    Ok(Followup::None)
                }
            },
            UiMessage::Log { text } => {
                info!(target: "synaptree::ui", "{text}");
                Ok(Followup::None)
            }
        }
    }

    async fn run_action(
        &mut self,
        action: NodeAction,
        path: &Utf8Path,
        name: Option<&str>,
    ) -> Result<Followup, OpError> {
        let require_name = || name.ok_or(OpError::MissingName(action));

        match action {
            NodeAction::SetRoot => self.set_root(path).await,
            NodeAction::ResetRoot => {
                self.custom_root = None;
                info!("Root reset to workspace");
                Ok(Followup::Rescan)
            }
            NodeAction::CreateFolder | NodeAction::CreateFile => {
                let name = require_name()?;
                self.ensure_within(path, true)?;
                let dir = ops::target_directory(path).await?;
                let created = if action == NodeAction::CreateFolder {
                    ops::create_folder(&dir, name).await?
                } else {
                    ops::create_file(&dir, name).await?
                };
                self.queue_change(FileEvent::create(created.clone()));
                self.focus_when_added(&created);
                Ok(Followup::None)
            }
            NodeAction::Rename => {
                let name = require_name()?;
                self.ensure_within(path, false)?;
                let renamed = ops::rename(path, name).await?;
                if renamed.as_path() == path {
                    return Ok(Followup::None);
                }
                if is_dir(&renamed).await {
                    // Descendants moved with it.
                    self.forget_custom_root_under(path);
                    return Ok(Followup::Rescan);
                }
                self.queue_change(FileEvent::delete(path));
                self.queue_change(FileEvent::create(renamed.clone()));
                self.focus_when_added(&renamed);
                Ok(Followup::None)
            }
            NodeAction::Delete => {
                self.ensure_within(path, false)?;
                let was_dir = is_dir(path).await;
                ops::delete(path).await?;
                if was_dir {
                    self.forget_custom_root_under(path);
                    return Ok(Followup::Rescan);
                }
                self.queue_change(FileEvent::delete(path));
                Ok(Followup::None)
            }
        }
    }

    async fn set_root(&mut self, path: &Utf8Path) -> Result<Followup, OpError> {
        self.ensure_within(path, true)?;
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| OpError::from_io(path, e))?;
        if !metadata.is_dir() {
            return Err(OpError::NotADirectory(path.to_path_buf()));
        }

        self.custom_root = (path != self.workspace_root.as_path()).then(|| path.to_path_buf());
        info!(root = %self.current_root(), custom = self.is_custom_root(), "Root changed");
        Ok(Followup::Rescan)
    }

    /// Lexical containment check. `..` and `.` components are refused
    /// outright, since `starts_with` compares components without resolving
    /// them.
    fn ensure_within(&self, path: &Utf8Path, allow_root: bool) -> Result<(), OpError> {
        let plain = path
            .components()
            .all(|c| !matches!(c, Utf8Component::ParentDir | Utf8Component::CurDir));
        let inside = plain
            && path.starts_with(&self.workspace_root)
            && (allow_root || path != self.workspace_root.as_path());
        if inside {
            Ok(())
        } else {
            Err(OpError::OutsideWorkspace(path.to_path_buf()))
        }
    }

    fn forget_custom_root_under(&mut self, path: &Utf8Path) {
        if self.custom_root.as_deref().is_some_and(|root| root.starts_with(path)) {
            info!(path = %path, "Custom root removed, returning to workspace root");
            self.custom_root = None;
        }
    }

    fn focus_when_added(&mut self, path: &Utf8Path) {
        if self.config.general.auto_focus {
            self.pending_focus = Some(NodeId::from(path));
        }
    }

    async fn reveal(&mut self, path: &Utf8Path) -> Result<(), SessionError> {
        if !self.config.general.auto_focus || !path.starts_with(self.current_root()) {
            debug!(path = %path, "Reveal ignored");
            return Ok(());
        }
        self.send(SinkMessage::FocusNode {
            id: NodeId::from(path),
        })
        .await
    }

    fn reconfigure(&mut self, config: Config) -> Result<(), SessionError> {
        config.validate()?;
        let snapshot = config.workspace_config()?;
        if config.scan.max_concurrent_ops != self.config.scan.max_concurrent_ops {
            self.gate = ConcurrencyGate::new(config.scan.max_concurrent_ops);
        }
        if config.processor != self.config.processor {
            warn!("Processor settings take effect in the next session");
        }
        self.workspace.replace(snapshot);
        self.config = config;
        info!("Configuration replaced");
        Ok(())
    }

    /// Starts a full scan of the current root.
    ///
    /// The returned future owns everything it needs and can be spawned. Its
    /// outcome must go through [`apply_scan`](Self::apply_scan), which drops
    /// it if another scan was started in the meantime.
    pub fn begin_scan(&self) -> impl Future<Output = ScanOutcome> + Send + 'static {
        let ticket = self.generations.begin();
        let scanner =
            Scanner::new(self.workspace.snapshot(), &self.config.scan).with_gate(self.gate.clone());
        let root = self.current_root().to_path_buf();
        let is_custom_root = self.is_custom_root();
        debug!(root = %root, generation = ticket.value(), "Scan requested");

        async move {
            let data = scanner.scan(&root).await;
            ScanOutcome {
                ticket,
                root,
                is_custom_root,
                data,
            }
        }
    }

    /// Sends a finished scan as `setData`, followed by a forced status
    /// sync. Returns `false` if the scan was stale and dropped.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::ChannelClosed`] if the sink is gone.
    pub async fn apply_scan(&mut self, outcome: ScanOutcome) -> Result<bool, SessionError> {
        if !self.generations.is_current(outcome.ticket) {
            debug!(
                root = %outcome.root,
                generation = outcome.ticket.value(),
                "Discarding stale scan"
            );
            return Ok(false);
        }

        info!(
            root = %outcome.root,
            nodes = outcome.data.nodes.len(),
            links = outcome.data.links.len(),
            "Sending graph"
        );
        self.send(SinkMessage::SetData {
            data: outcome.data,
            is_custom_root: outcome.is_custom_root,
        })
        .await?;
        self.sync_status(true).await?;
        Ok(true)
    }

    /// Queues a structural change and marks status as stale.
    pub fn queue_change(&mut self, event: FileEvent) {
        self.processor.queue_event(event);
        self.status_dirty = true;
    }

    /// Marks status as stale. The next refresh tick will sync it.
    pub fn mark_status_dirty(&mut self) {
        self.status_dirty = true;
    }

    /// Forwards one processor batch to the sink.
    ///
    /// Additions outside the displayed root, or below an ignored directory,
    /// are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::ChannelClosed`] if the sink is gone.
    pub async fn apply_delta(&mut self, delta: GraphDelta) -> Result<(), SessionError> {
        match delta {
            GraphDelta::Removed(ids) => {
                debug!(count = ids.len(), "Removing nodes");
                for id in ids {
                    self.send(SinkMessage::RemoveNode { id }).await?;
                }
            }
            GraphDelta::Added(additions) => {
                debug!(count = additions.len(), "Adding nodes");
                let root = self.current_root().to_path_buf();
                let config = self.workspace.snapshot();
                for NodeAddition { node, parent_id } in additions {
                    if !is_displayable(&root, &node.path, &config) {
                        debug!(path = %node.path, "Addition outside displayed tree");
                        continue;
                    }
                    let focus = self.pending_focus.as_ref() == Some(&node.id);
                    let id = node.id.clone();
                    self.send(SinkMessage::AddNode { node, parent_id }).await?;
                    if focus {
                        self.pending_focus = None;
                        self.send(SinkMessage::FocusNode { id }).await?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Syncs status if it was marked stale.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::ChannelClosed`] if the sink is gone.
    pub async fn refresh_status_if_dirty(&mut self) -> Result<(), SessionError> {
        if self.status_dirty {
            self.sync_status(false).await?;
        }
        Ok(())
    }

    /// Takes a status snapshot and sends what changed under the displayed
    /// root. `force` sends every current entry.
    ///
    /// A failing status source is logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::ChannelClosed`] if the sink is gone.
    pub async fn sync_status(&mut self, force: bool) -> Result<(), SessionError> {
        self.status_dirty = false;
        let delta = match self.status.sync(force).await {
            Ok(delta) => delta,
            Err(err) => {
                warn!(error = %err, "Status sync failed");
                return Ok(());
            }
        };
        let root = self.current_root().to_path_buf();
        let delta = delta.retain(|id| id.as_path().starts_with(&root));
        self.send_status(delta).await
    }

    async fn send_status(&mut self, delta: StatusDelta) -> Result<(), SessionError> {
        if delta.is_empty() {
            return Ok(());
        }
        let single = delta.single().map(|(id, status)| (id.clone(), status));
        let msg = match single {
            Some((id, git_status)) => SinkMessage::UpdateNodeStatus { id, git_status },
            None => SinkMessage::UpdateNodeStatusBatch {
                changes: delta.changes,
            },
        };
        self.send(msg).await
    }

    /// Starts a watcher on the workspace root, or `None` if watching is
    /// disabled or fails to start.
    #[must_use]
    pub fn start_watcher(&self) -> Option<FileWatcher> {
        if !self.config.watch.enabled {
            info!("File watching disabled");
            return None;
        }
        let filter = IgnoreFilter::new(
            self.workspace_root.clone(),
            self.workspace.snapshot().ignore().clone(),
        );
        match FileWatcher::new(&self.workspace_root, &self.config.watch, filter) {
            Ok(watcher) => {
                info!(path = %watcher.watch_path(), "Watching workspace");
                Some(watcher)
            }
            Err(err) => {
                error!(error = %err, "Failed to start file watcher, live updates disabled");
                None
            }
        }
    }

    /// Stops the change processor. Pending events are dropped.
    pub fn shutdown(&self) {
        self.generations.invalidate();
        self.processor.shutdown();
        info!(root = %self.workspace_root, "Session closed");
    }

    async fn report(&self, message: String) -> Result<(), SessionError> {
        self.send(HostCommand::ShowError { message }).await
    }

    async fn send(&self, msg: impl Into<Outbound>) -> Result<(), SessionError> {
        self.outbound
            .send(msg.into())
            .await
            .map_err(|_| SessionError::ChannelClosed)
    }
}

/// Whether `path` is a real directory. Links count as leaves, as in the scan.
async fn is_dir(path: &Utf8Path) -> bool {
    tokio::fs::symlink_metadata(path)
        .await
        .is_ok_and(|meta| meta.is_dir())
}

fn is_displayable(root: &Utf8Path, path: &Utf8Path, config: &WorkspaceConfig) -> bool {
    match path.strip_prefix(root) {
        Ok(rel) if !rel.as_str().is_empty() => {
            rel.components().all(|c| !config.is_ignored(c.as_str()))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use st_core::{GitStatus, GraphNode, NodeType};
    use st_watcher::{StatusMap, WatchError};
    use tokio::time::timeout;

    use super::*;

    #[derive(Default)]
    struct FakeSource(Mutex<StatusMap>);

    impl FakeSource {
        fn set(&self, entries: &[(&Utf8PathBuf, GitStatus)]) {
            let mut map = self.0.lock().expect("lock");
            map.clear();
            for (path, status) in entries {
                map.insert(NodeId::from(path.as_path()), *status);
            }
        }
    }

    impl StatusSource for FakeSource {
        fn snapshot(&self) -> Result<StatusMap, WatchError> {
            Ok(self.0.lock().expect("lock").clone())
        }
    }

    struct Harness {
        _dir: tempfile::TempDir,
        root: Utf8PathBuf,
        session: Session,
        deltas: mpsc::Receiver<GraphDelta>,
        out: mpsc::Receiver<Outbound>,
        source: Arc<FakeSource>,
    }

    fn test_config() -> Config {
        let mut config = Config::default();
        config.processor.debounce_ms = 20;
        config.watch.enabled = false;
        config
    }

    fn harness_with(config: Config) -> Harness {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(dir.path().canonicalize().expect("canonicalize"))
            .expect("utf8 tempdir");
        std::fs::create_dir_all(root.join("src")).expect("mkdir");
        std::fs::create_dir_all(root.join("node_modules/pkg")).expect("mkdir");
        std::fs::write(root.join("src/main.rs"), "fn main() {}").expect("write");
        std::fs::write(root.join("src/lib.rs"), "").expect("write");
        std::fs::write(root.join("README.md"), "# hi").expect("write");
        std::fs::write(root.join("node_modules/pkg/index.js"), "").expect("write");

        let (tx, out) = mpsc::channel(256);
        let source = Arc::new(FakeSource::default());
        let dyn_source: Arc<dyn StatusSource> = Arc::clone(&source) as Arc<dyn StatusSource>;
        let (session, deltas) =
            Session::with_status_source(root.clone(), config, dyn_source, tx).expect("session");
        Harness {
            _dir: dir,
            root,
            session,
            deltas,
            out,
            source,
        }
    }

    fn harness() -> Harness {
        harness_with(test_config())
    }

    async fn next_out(out: &mut mpsc::Receiver<Outbound>) -> Outbound {
        timeout(Duration::from_secs(5), out.recv())
            .await
            .expect("outbound timed out")
            .expect("outbound closed")
    }

    async fn next_delta(deltas: &mut mpsc::Receiver<GraphDelta>) -> GraphDelta {
        timeout(Duration::from_secs(5), deltas.recv())
            .await
            .expect("delta timed out")
            .expect("delta channel closed")
    }

    async fn scan_and_apply(h: &mut Harness) -> GraphData {
        let outcome = h.session.begin_scan().await;
        assert!(h.session.apply_scan(outcome).await.expect("apply"));
        match next_out(&mut h.out).await {
            Outbound::Sink(SinkMessage::SetData { data, .. }) => data,
            other => panic!("expected setData, got {other:?}"),
        }
    }

    fn node(path: &Utf8Path) -> GraphNode {
        GraphNode {
            id: NodeId::from(path),
            name: path.file_name().unwrap_or_default().to_owned(),
            path: path.to_path_buf(),
            node_type: NodeType::File,
            level: 1,
            color: "#aaaaaa".to_owned(),
            git_status: None,
        }
    }

    #[tokio::test]
    async fn test_ready_scans_workspace() {
        let mut h = harness();
        assert_eq!(
            h.session.handle_ui(UiMessage::Ready).await.expect("ready"),
            Followup::Rescan
        );

        let outcome = h.session.begin_scan().await;
        assert!(h.session.apply_scan(outcome).await.expect("apply"));
        match next_out(&mut h.out).await {
            Outbound::Sink(SinkMessage::SetData {
                data,
                is_custom_root,
            }) => {
                assert!(!is_custom_root);
                assert_eq!(data.root().map(|n| n.path.clone()), Some(h.root.clone()));
                assert_eq!(data.len(), 5);
                assert!(!data.contains(h.root.join("node_modules").as_str()));
                data.verify().expect("valid graph");
            }
            other => panic!("expected setData, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stale_scan_is_discarded() {
        let mut h = harness();
        let first = h.session.begin_scan();
        let second = h.session.begin_scan();

        let (first, second) = tokio::join!(first, second);
        assert!(!h.session.apply_scan(first).await.expect("apply"));
        assert!(h.out.try_recv().is_err());
        assert!(h.session.apply_scan(second).await.expect("apply"));
        assert!(matches!(
            next_out(&mut h.out).await,
            Outbound::Sink(SinkMessage::SetData { .. })
        ));
    }

    #[tokio::test]
    async fn test_set_root_and_reset() {
        let mut h = harness();
        let src = h.root.join("src");
        let followup = h
            .session
            .handle_ui(UiMessage::NodeAction {
                action: NodeAction::SetRoot,
                path: src.clone(),
                name: None,
            })
            .await
            .expect("set root");
        assert_eq!(followup, Followup::Rescan);
        assert_eq!(h.session.current_root(), src.as_path());

        let outcome = h.session.begin_scan().await;
        assert!(outcome.is_custom_root);
        assert!(h.session.apply_scan(outcome).await.expect("apply"));
        match next_out(&mut h.out).await {
            Outbound::Sink(SinkMessage::SetData {
                data,
                is_custom_root,
            }) => {
                assert!(is_custom_root);
                assert_eq!(data.root().map(|n| n.path.clone()), Some(src.clone()));
                assert_eq!(data.len(), 3);
            }
            other => panic!("expected setData, got {other:?}"),
        }

        h.session
            .handle_ui(UiMessage::NodeAction {
                action: NodeAction::ResetRoot,
                path: src,
                name: None,
            })
            .await
            .expect("reset");
        assert_eq!(h.session.current_root(), h.root.as_path());
        assert!(!h.session.is_custom_root());
    }

    #[tokio::test]
    async fn test_set_root_on_file_reports_error() {
        let mut h = harness();
        let followup = h
            .session
            .handle_ui(UiMessage::NodeAction {
                action: NodeAction::SetRoot,
                path: h.root.join("README.md"),
                name: None,
            })
            .await
            .expect("handled");
        assert_eq!(followup, Followup::None);
        assert!(!h.session.is_custom_root());
        assert!(matches!(
            next_out(&mut h.out).await,
            Outbound::Host(HostCommand::ShowError { .. })
        ));
    }

    #[tokio::test]
    async fn test_create_file_adds_then_focuses() {
        let mut h = harness();
        let followup = h
            .session
            .handle_ui(UiMessage::NodeAction {
                action: NodeAction::CreateFile,
                path: h.root.join("src/main.rs"),
                name: Some("new.rs".to_owned()),
            })
            .await
            .expect("create");
        assert_eq!(followup, Followup::None);
        let created = h.root.join("src/new.rs");
        assert!(created.is_file());

        let delta = next_delta(&mut h.deltas).await;
        h.session.apply_delta(delta).await.expect("apply");

        match next_out(&mut h.out).await {
            Outbound::Sink(SinkMessage::AddNode { node, parent_id }) => {
                assert_eq!(node.path, created);
                assert_eq!(parent_id, NodeId::from(h.root.join("src").as_path()));
            }
            other => panic!("expected addNode, got {other:?}"),
        }
        assert_eq!(
            next_out(&mut h.out).await,
            Outbound::Sink(SinkMessage::FocusNode {
                id: NodeId::from(created.as_path())
            })
        );
    }

    #[tokio::test]
    async fn test_create_without_focus() {
        let mut config = test_config();
        config.general.auto_focus = false;
        let mut h = harness_with(config);
        h.session
            .handle_ui(UiMessage::NodeAction {
                action: NodeAction::CreateFolder,
                path: h.root.clone(),
                name: Some("docs".to_owned()),
            })
            .await
            .expect("create");

        let delta = next_delta(&mut h.deltas).await;
        h.session.apply_delta(delta).await.expect("apply");
        assert!(matches!(
            next_out(&mut h.out).await,
            Outbound::Sink(SinkMessage::AddNode { .. })
        ));
        assert!(h.out.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_rename_file_removes_then_adds() {
        let mut h = harness();
        let old = h.root.join("README.md");
        h.session
            .handle_ui(UiMessage::NodeAction {
                action: NodeAction::Rename,
                path: old.clone(),
                name: Some("GUIDE.md".to_owned()),
            })
            .await
            .expect("rename");

        assert_eq!(
            next_delta(&mut h.deltas).await,
            GraphDelta::Removed(vec![NodeId::from(old.as_path())])
        );
        match next_delta(&mut h.deltas).await {
            GraphDelta::Added(nodes) => {
                assert_eq!(nodes.len(), 1);
                assert_eq!(nodes[0].node.path, h.root.join("GUIDE.md"));
            }
            other => panic!("expected additions, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rename_directory_rescans() {
        let mut h = harness();
        let followup = h
            .session
            .handle_ui(UiMessage::NodeAction {
                action: NodeAction::Rename,
                path: h.root.join("src"),
                name: Some("lib".to_owned()),
            })
            .await
            .expect("rename");
        assert_eq!(followup, Followup::Rescan);
        assert!(h.root.join("lib/main.rs").exists());
    }

    #[tokio::test]
    async fn test_action_failures_become_show_error() {
        let mut h = harness();
        let cases = [
            (NodeAction::Rename, h.root.join("README.md"), None),
            (NodeAction::Rename, h.root.join("README.md"), Some("a/b")),
            (NodeAction::CreateFile, h.root.clone(), Some("README.md")),
            (NodeAction::Delete, h.root.join("missing.txt"), None),
            (NodeAction::Delete, h.root.clone(), None),
            (NodeAction::CreateFile, "/elsewhere".into(), Some("x")),
        ];
        for (action, path, name) in cases {
            let followup = h
                .session
                .handle_ui(UiMessage::NodeAction {
                    action,
                    path,
                    name: name.map(str::to_owned),
                })
                .await
                .expect("handled");
            assert_eq!(followup, Followup::None);
            assert!(matches!(
                next_out(&mut h.out).await,
                Outbound::Host(HostCommand::ShowError { .. })
            ));
        }
        assert!(h.root.join("README.md").is_file());
        assert_eq!(h.session.processor().stats().pending, 0);
    }

    #[tokio::test]
    async fn test_is_dir_does_not_follow_links() {
        let h = harness();
        assert!(is_dir(&h.root.join("src")).await);
        assert!(!is_dir(&h.root.join("README.md")).await);
        assert!(!is_dir(&h.root.join("missing")).await);

        #[cfg(unix)]
        {
            let link = h.root.join("src-link");
            std::os::unix::fs::symlink(h.root.join("src"), &link).expect("symlink");
            assert!(!is_dir(&link).await);
        }
    }

    #[tokio::test]
    async fn test_parent_components_cannot_leave_workspace() {
        let mut h = harness();
        let outside = tempfile::tempdir().expect("tempdir");
        let outside_root =
            Utf8PathBuf::from_path_buf(outside.path().canonicalize().expect("canonicalize"))
                .expect("utf8 tempdir");
        let victim = outside_root.join("victim.txt");
        std::fs::write(&victim, "keep").expect("write");
        let other = outside_root.file_name().expect("tempdir name");
        let escaping = h.root.join("..").join(other).join("victim.txt");

        for (action, name) in [
            (NodeAction::Rename, Some("moved.txt")),
            (NodeAction::Delete, None),
            (NodeAction::SetRoot, None),
        ] {
            let followup = h
                .session
                .handle_ui(UiMessage::NodeAction {
                    action,
                    path: escaping.clone(),
                    name: name.map(str::to_owned),
                })
                .await
                .expect("handled");
            assert_eq!(followup, Followup::None);
            assert!(matches!(
                next_out(&mut h.out).await,
                Outbound::Host(HostCommand::ShowError { .. })
            ));
        }

        let sneaky = h.root.join("src/../src/./main.rs");
        h.session
            .handle_ui(UiMessage::NodeAction {
                action: NodeAction::Delete,
                path: sneaky,
                name: None,
            })
            .await
            .expect("handled");
        assert!(matches!(
            next_out(&mut h.out).await,
            Outbound::Host(HostCommand::ShowError { .. })
        ));

        assert!(victim.is_file());
        assert!(!outside_root.join("moved.txt").exists());
        assert!(h.root.join("src/main.rs").is_file());
        assert!(!h.session.is_custom_root());
    }

    #[tokio::test]
    async fn test_open_file_goes_to_host() {
        let mut h = harness();
        let path = h.root.join("src/main.rs");
        h.session
            .handle_ui(UiMessage::OpenFile { path: path.clone() })
            .await
            .expect("open");
        assert_eq!(
            next_out(&mut h.out).await,
            Outbound::Host(HostCommand::OpenFile { path })
        );
    }

    #[tokio::test]
    async fn test_reveal_respects_root_and_auto_focus() {
        let mut h = harness();
        let inside = h.root.join("src/lib.rs");
        h.session
            .handle_ui(UiMessage::Reveal {
                path: inside.clone(),
            })
            .await
            .expect("reveal");
        assert_eq!(
            next_out(&mut h.out).await,
            Outbound::Sink(SinkMessage::FocusNode {
                id: NodeId::from(inside.as_path())
            })
        );

        h.session
            .handle_ui(UiMessage::Reveal {
                path: "/elsewhere/a.rs".into(),
            })
            .await
            .expect("reveal");
        assert!(h.out.try_recv().is_err());

        let mut config = test_config();
        config.general.auto_focus = false;
        h.session
            .handle_ui(UiMessage::Configure {
                config: Box::new(config),
            })
            .await
            .expect("configure");
        h.session
            .handle_ui(UiMessage::Reveal { path: inside })
            .await
            .expect("reveal");
        assert!(h.out.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_configure_rescans_with_new_ignores() {
        let mut h = harness();
        let mut config = test_config();
        config.general.ignore_patterns = vec!["*.md".to_owned(), "node_modules".to_owned()];
        assert_eq!(
            h.session
                .handle_ui(UiMessage::Configure {
                    config: Box::new(config),
                })
                .await
                .expect("configure"),
            Followup::Reconfigured
        );

        let data = scan_and_apply(&mut h).await;
        assert!(!data.contains(h.root.join("README.md").as_str()));
        assert!(data.contains(h.root.join("src/main.rs").as_str()));
    }

    #[tokio::test]
    async fn test_invalid_configure_is_reported() {
        let mut h = harness();
        let mut config = test_config();
        config.scan.max_concurrent_ops = 0;
        assert_eq!(
            h.session
                .handle_ui(UiMessage::Configure {
                    config: Box::new(config),
                })
                .await
                .expect("handled"),
            Followup::None
        );
        assert!(matches!(
            next_out(&mut h.out).await,
            Outbound::Host(HostCommand::ShowError { .. })
        ));
        assert_eq!(h.session.config().scan.max_concurrent_ops, 50);
    }

    #[tokio::test]
    async fn test_additions_outside_displayed_tree_are_dropped() {
        let mut h = harness();
        let delta = GraphDelta::Added(vec![
            NodeAddition {
                node: node(&h.root.join("node_modules/pkg/new.js")),
                parent_id: NodeId::from(h.root.join("node_modules/pkg").as_path()),
            },
            NodeAddition {
                node: node(Utf8Path::new("/elsewhere/a.rs")),
                parent_id: NodeId::new("/elsewhere"),
            },
            NodeAddition {
                node: node(&h.root.join("src/ok.rs")),
                parent_id: NodeId::from(h.root.join("src").as_path()),
            },
        ]);
        h.session.apply_delta(delta).await.expect("apply");

        match next_out(&mut h.out).await {
            Outbound::Sink(SinkMessage::AddNode { node, .. }) => {
                assert_eq!(node.path, h.root.join("src/ok.rs"));
            }
            other => panic!("expected addNode, got {other:?}"),
        }
        assert!(h.out.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_status_single_then_batch_then_nothing() {
        let mut h = harness();
        let readme = h.root.join("README.md");
        let main = h.root.join("src/main.rs");

        h.source.set(&[(&readme, GitStatus::Modified)]);
        h.session.sync_status(false).await.expect("sync");
        assert_eq!(
            next_out(&mut h.out).await,
            Outbound::Sink(SinkMessage::UpdateNodeStatus {
                id: NodeId::from(readme.as_path()),
                git_status: Some(GitStatus::Modified),
            })
        );

        h.source
            .set(&[(&readme, GitStatus::Staged), (&main, GitStatus::Untracked)]);
        h.session.sync_status(false).await.expect("sync");
        match next_out(&mut h.out).await {
            Outbound::Sink(SinkMessage::UpdateNodeStatusBatch { changes }) => {
                assert_eq!(changes.len(), 2);
            }
            other => panic!("expected batch, got {other:?}"),
        }

        h.session.sync_status(false).await.expect("sync");
        assert!(h.out.try_recv().is_err());

        h.source.set(&[(&readme, GitStatus::Staged)]);
        h.session.sync_status(false).await.expect("sync");
        assert_eq!(
            next_out(&mut h.out).await,
            Outbound::Sink(SinkMessage::UpdateNodeStatus {
                id: NodeId::from(main.as_path()),
                git_status: None,
            })
        );
    }

    #[tokio::test]
    async fn test_status_outside_custom_root_is_filtered() {
        let mut h = harness();
        h.session
            .handle_ui(UiMessage::NodeAction {
                action: NodeAction::SetRoot,
                path: h.root.join("src"),
                name: None,
            })
            .await
            .expect("set root");

        let readme = h.root.join("README.md");
        h.source.set(&[(&readme, GitStatus::Modified)]);
        h.session.sync_status(true).await.expect("sync");
        assert!(h.out.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_scan_is_followed_by_forced_status() {
        let mut h = harness();
        let readme = h.root.join("README.md");
        h.source.set(&[(&readme, GitStatus::Modified)]);
        h.session.sync_status(false).await.expect("sync");
        let _ = next_out(&mut h.out).await;

        let _ = scan_and_apply(&mut h).await;
        assert_eq!(
            next_out(&mut h.out).await,
            Outbound::Sink(SinkMessage::UpdateNodeStatus {
                id: NodeId::from(readme.as_path()),
                git_status: Some(GitStatus::Modified),
            })
        );
    }

    #[tokio::test]
    async fn test_dirty_flag() {
        let mut h = harness();
        assert!(!h.session.is_status_dirty());
        h.session.mark_status_dirty();
        assert!(h.session.is_status_dirty());
        h.session.refresh_status_if_dirty().await.expect("refresh");
        assert!(!h.session.is_status_dirty());
    }

    #[tokio::test]
    async fn test_closed_sink_is_fatal() {
        let mut h = harness();
        h.out.close();
        let err = h
            .session
            .handle_ui(UiMessage::OpenFile {
                path: h.root.join("README.md"),
            })
            .await
            .expect_err("closed");
        assert!(err.is_fatal());
    }

    #[test]
    fn test_is_displayable() {
        let config = WorkspaceConfig::default();
        let root = Utf8Path::new("/w");
        assert!(is_displayable(root, Utf8Path::new("/w/src/a.rs"), &config));
        assert!(!is_displayable(root, Utf8Path::new("/w"), &config));
        assert!(!is_displayable(root, Utf8Path::new("/x/a.rs"), &config));
        assert!(!is_displayable(
            root,
            Utf8Path::new("/w/node_modules/a/b.js"),
            &config
        ));
    }
}
