//! Debounced, chunked application of structural changes.
//!
//! # State machine
//!
//! ```text
//!            queue()                 debounce fires
//!   Idle ─────────────► Buffering ─────────────────► Draining ──┐
//!    ▲                     │  queue() restarts timer   │  │      │ chunk done,
//!    │   debounce fires,   │                           │  │      │ queue non-empty:
//!    └──── queue empty ────┘                           │  └──────┘ sleep, next chunk
//!    ▲                                                 │
//!    └────────── chunk done, queue empty ──────────────┤
//!    ▲                                                 │
//!    └──── watchdog: no heartbeat for stall_threshold ─┘  (abort drain, restart if queue non-empty)
//! ```
//!
//! Only one drain runs at a time. Each drain carries a generation number, and
//! a drain whose number is no longer current exits without touching state.
//! That is what makes the watchdog's forced reset safe against a drain that
//! was merely slow rather than hung.
//!
//! # Queue rules
//!
//! - An event for a path that already has the opposite event queued removes
//!   that event and is itself dropped. Net effect: nothing.
//! - A duplicate of an already queued event is dropped.
//!
//! # Chunk processing
//!
//! Deletes are sent as one [`GraphDelta::Removed`] without touching the
//! filesystem. Creates are resolved through the [`NodeResolver`] with bounded
//! concurrency, tagged with the [`StatusLookup`]'s answer, and sent as one
//! [`GraphDelta::Added`]. A resolver that returns `None` or panics only loses
//! its own path.

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use camino::Utf8PathBuf;
use futures_util::{FutureExt, StreamExt, stream};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use st_core::{NodeId, NodeResolver, ProcessorConfig, StatusLookup};

use crate::error::WatchError;
use crate::events::{ChangeKind, FileEvent, GraphDelta, NodeAddition};

/// Capacity of the delta channel.
const DELTA_CHANNEL_CAPACITY: usize = 64;

/// Where the processor is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessorState {
    /// Nothing queued, nothing running.
    #[default]
    Idle,
    /// Events queued, waiting for the debounce window to close.
    Buffering,
    /// A drain is processing chunks.
    Draining,
}

/// Counters exposed for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessorStats {
    /// Current state.
    pub state: ProcessorState,
    /// Events waiting in the queue.
    pub pending: usize,
    /// Drains started.
    pub drain_cycles: u64,
    /// Chunks completed.
    pub chunks: u64,
    /// Events dropped by the cancellation rule (both halves counted).
    pub cancelled: u64,
    /// Forced resets performed by the watchdog.
    pub watchdog_recoveries: u64,
}

struct Inner {
    queue: VecDeque<FileEvent>,
    state: ProcessorState,
    debounce: Option<JoinHandle<()>>,
    drain: Option<JoinHandle<()>>,
    drain_id: u64,
    heartbeat: Instant,
    closed: bool,
    stats: ProcessorStats,
}

struct Shared {
    inner: Mutex<Inner>,
    config: ProcessorConfig,
    resolver: Arc<dyn NodeResolver>,
    status: Arc<dyn StatusLookup>,
    tx: mpsc::Sender<GraphDelta>,
    runtime: Handle,
}

/// Turns a stream of create/delete events into ordered graph deltas.
///
/// # Examples
///
/// ```ignore
/// use std::sync::Arc;
/// use st_core::{NoStatus, ProcessorConfig};
/// use st_scanner::{NodeFactory, SharedConfig};
/// use st_watcher::{ChangeKind, ChangeProcessor};
///
/// # async fn example() -> Result<(), st_watcher::WatchError> {
/// let resolver = Arc::new(NodeFactory::new(SharedConfig::default()));
/// let (processor, mut deltas) =
///     ChangeProcessor::new(ProcessorConfig::default(), resolver, Arc::new(NoStatus))?;
///
/// processor.queue(ChangeKind::Create, "/w/b.ts");
/// while let Some(delta) = deltas.recv().await {
///     println!("{delta:?}");
/// }
/// # Ok(())
/// # }
/// ```
pub struct ChangeProcessor {
    shared: Arc<Shared>,
    watchdog: CancellationToken,
}

impl std::fmt::Debug for ChangeProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeProcessor")
            .field("config", &self.shared.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl ChangeProcessor {
    /// Creates a processor and starts its watchdog.
    ///
    /// Returns the processor and the receiving end of its delta channel.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::NoRuntime`] outside a tokio runtime.
    pub fn new(
        config: ProcessorConfig,
        resolver: Arc<dyn NodeResolver>,
        status: Arc<dyn StatusLookup>,
    ) -> Result<(Self, mpsc::Receiver<GraphDelta>), WatchError> {
        let runtime = Handle::try_current()?;
        let (tx, rx) = mpsc::channel(DELTA_CHANNEL_CAPACITY);

        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                state: ProcessorState::Idle,
                debounce: None,
                drain: None,
                drain_id: 0,
                heartbeat: Instant::now(),
                closed: false,
                stats: ProcessorStats::default(),
            }),
            config,
            resolver,
            status,
            tx,
            runtime,
        });

        let watchdog = CancellationToken::new();
        shared.runtime.spawn(run_watchdog(
            Arc::downgrade(&shared),
            config,
            watchdog.clone(),
        ));

        Ok((Self { shared, watchdog }, rx))
    }

    /// Queues a change and restarts the debounce timer.
    ///
    /// Never blocks and never fails. Ignored after [`shutdown`](Self::shutdown).
    pub fn queue(&self, kind: ChangeKind, path: impl Into<Utf8PathBuf>) {
        self.queue_event(FileEvent::new(kind, path));
    }

    /// Queues a change and restarts the debounce timer.
    pub fn queue_event(&self, event: FileEvent) {
        let mut inner = self.shared.inner.lock();
        if inner.closed {
            return;
        }

        let opposite = inner.queue.iter().position(|queued| queued.cancels(&event));
        if let Some(pos) = opposite {
            inner.queue.remove(pos);
            inner.stats.cancelled += 2;
            trace!(kind = %event.kind, path = %event.path, "Cancelled queued opposite event");
        } else if inner.queue.contains(&event) {
            trace!(kind = %event.kind, path = %event.path, "Duplicate event");
        } else {
            trace!(kind = %event.kind, path = %event.path, "Queued event");
            inner.queue.push_back(event);
        }

        if inner.state == ProcessorState::Idle {
            inner.state = ProcessorState::Buffering;
        }
        self.shared.restart_debounce(&mut inner);
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ProcessorState {
        self.shared.inner.lock().state
    }

    /// Snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> ProcessorStats {
        let inner = self.shared.inner.lock();
        ProcessorStats {
            state: inner.state,
            pending: inner.queue.len(),
            ..inner.stats
        }
    }

    /// Stops timers, the running drain and the watchdog. Queued events are
    /// discarded.
    pub fn shutdown(&self) {
        self.watchdog.cancel();
        let mut inner = self.shared.inner.lock();
        if inner.closed {
            return;
        }
        inner.closed = true;
        if let Some(handle) = inner.debounce.take() {
            handle.abort();
        }
        if let Some(handle) = inner.drain.take() {
            handle.abort();
        }
        inner.drain_id += 1;
        inner.queue.clear();
        inner.state = ProcessorState::Idle;
        debug!("Change processor stopped");
    }
}

impl Drop for ChangeProcessor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Shared {
    fn restart_debounce(self: &Arc<Self>, inner: &mut Inner) {
        if let Some(handle) = inner.debounce.take() {
            handle.abort();
        }
        let shared = Arc::clone(self);
        let delay = self.config.debounce();
        inner.debounce = Some(self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            shared.on_debounce();
        }));
    }

    fn on_debounce(self: &Arc<Self>) {
        let mut inner = self.inner.lock();
        inner.debounce = None;
        if inner.closed {
            return;
        }
        let state = inner.state;
        match state {
            // The running drain re-checks the queue when its chunk completes.
            ProcessorState::Draining => {}
            _ if inner.queue.is_empty() => inner.state = ProcessorState::Idle,
            _ => self.start_drain(&mut inner),
        }
    }

    fn start_drain(self: &Arc<Self>, inner: &mut Inner) {
        inner.state = ProcessorState::Draining;
        inner.drain_id += 1;
        inner.heartbeat = Instant::now();
        inner.stats.drain_cycles += 1;
        let drain_id = inner.drain_id;
        debug!(drain_id, pending = inner.queue.len(), "Drain started");
        inner.drain = Some(self.runtime.spawn(Arc::clone(self).drain(drain_id)));
    }

    /// Records progress for the watchdog. Returns `false` if this drain has
    /// been superseded.
    fn heartbeat(&self, drain_id: u64) -> bool {
        let mut inner = self.inner.lock();
        if inner.drain_id != drain_id {
            return false;
        }
        inner.heartbeat = Instant::now();
        true
    }

    async fn drain(self: Arc<Self>, drain_id: u64) {
        loop {
            let chunk: Vec<FileEvent> = {
                let mut inner = self.inner.lock();
                if inner.drain_id != drain_id {
                    return;
                }
                inner.heartbeat = Instant::now();
                let take = self.config.chunk_size.max(1).min(inner.queue.len());
                inner.queue.drain(..take).collect()
            };

            if !chunk.is_empty() {
                self.process_chunk(drain_id, chunk).await;
            }

            {
                let mut inner = self.inner.lock();
                if inner.drain_id != drain_id {
                    return;
                }
                inner.heartbeat = Instant::now();
                inner.stats.chunks += 1;
                if inner.queue.is_empty() {
                    inner.state = ProcessorState::Idle;
                    inner.drain = None;
                    debug!(drain_id, "Drain finished");
                    return;
                }
            }

            tokio::time::sleep(self.config.redrain_delay()).await;
        }
    }

    async fn process_chunk(&self, drain_id: u64, chunk: Vec<FileEvent>) {
        let (deletes, creates): (Vec<_>, Vec<_>) = chunk
            .into_iter()
            .partition(|event| event.kind == ChangeKind::Delete);

        if !deletes.is_empty() {
            let ids = deletes
                .into_iter()
                .map(|event| NodeId::from(event.path))
                .collect::<Vec<_>>();
            trace!(count = ids.len(), "Sending removals");
            self.send(GraphDelta::Removed(ids)).await;
        }

        if creates.is_empty() {
            return;
        }

        let resolved: Vec<Option<NodeAddition>> = stream::iter(creates)
            .map(|event| self.resolve(drain_id, event.path))
            .buffer_unordered(self.config.create_concurrency.max(1))
            .collect()
            .await;
        let added: Vec<NodeAddition> = resolved.into_iter().flatten().collect();

        if !added.is_empty() {
            trace!(count = added.len(), "Sending additions");
            self.send(GraphDelta::Added(added)).await;
        }
    }

    async fn resolve(&self, drain_id: u64, path: Utf8PathBuf) -> Option<NodeAddition> {
        let Some(parent_id) = path.parent().map(NodeId::from) else {
            debug!(path = %path, "Created path has no parent, skipping");
            return None;
        };

        let outcome = AssertUnwindSafe(self.resolver.resolve(&path, &parent_id))
            .catch_unwind()
            .await;
        self.heartbeat(drain_id);

        match outcome {
            Ok(Some(node)) => {
                let status = self.status.status_of(&path);
                Some(NodeAddition {
                    node: node.with_git_status(status),
                    parent_id,
                })
            }
            Ok(None) => {
                trace!(path = %path, "Created path did not resolve");
                None
            }
            Err(_) => {
                error!(path = %path, "Node resolution panicked, dropping path");
                None
            }
        }
    }

    async fn send(&self, delta: GraphDelta) {
        if self.tx.send(delta).await.is_err() {
            debug!("Delta receiver dropped");
        }
    }

    /// Forces a stalled drain back to Idle. Returns `true` if it did.
    fn recover_if_stalled(self: &Arc<Self>) -> bool {
        let mut inner = self.inner.lock();
        if inner.closed || inner.state != ProcessorState::Draining {
            return false;
        }
        let silent_for = inner.heartbeat.elapsed();
        if silent_for < self.config.stall_threshold() {
            return false;
        }

        warn!(
            drain_id = inner.drain_id,
            silent_ms = u64::try_from(silent_for.as_millis()).unwrap_or(u64::MAX),
            pending = inner.queue.len(),
            "Drain stalled, resetting processor"
        );
        if let Some(handle) = inner.drain.take() {
            handle.abort();
        }
        inner.drain_id += 1;
        inner.stats.watchdog_recoveries += 1;
        inner.state = ProcessorState::Idle;

        if !inner.queue.is_empty() {
            self.start_drain(&mut inner);
        }
        true
    }
}

async fn run_watchdog(
    shared: std::sync::Weak<Shared>,
    config: ProcessorConfig,
    token: CancellationToken,
) {
    let period = config.watchdog_interval();
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = token.cancelled() => break,
            _ = ticker.tick() => {
                let Some(shared) = shared.upgrade() else { break };
                if shared.recover_if_stalled() {
                    info!("Watchdog recovered change processor");
                }
            }
        }
    }
    trace!("Watchdog stopped");
}
