//! The session event loop.

use std::future::pending;

use st_core::UiMessage;
use st_watcher::{FileWatcher, GraphDelta, WatchEvent};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::SessionError;
use crate::session::{Followup, ScanOutcome, Session};

/// Drives `session` until the inbound stream ends or `shutdown` fires.
///
/// Multiplexes UI messages, watcher events, processor deltas, finished
/// scans and the status refresh tick. Scans run as background tasks so the
/// loop keeps serving while they are in flight; a scan overtaken by a newer
/// one is discarded when it finishes.
///
/// # Errors
///
/// Returns the first fatal [`SessionError`], typically
/// [`SessionError::ChannelClosed`] when the sink goes away.
pub async fn run_session(
    mut session: Session,
    mut deltas: mpsc::Receiver<GraphDelta>,
    mut inbound: mpsc::Receiver<UiMessage>,
    shutdown: CancellationToken,
) -> Result<(), SessionError> {
    let mut watcher = session.start_watcher();
    let mut scans: JoinSet<ScanOutcome> = JoinSet::new();
    let mut status_tick = interval(session.config().watch.status_refresh());
    status_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let result = loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                info!("Shutdown requested");
                break Ok(());
            }

            msg = inbound.recv() => {
                let Some(msg) = msg else {
                    debug!("Inbound stream ended");
                    break Ok(());
                };
                match session.handle_ui(msg).await {
                    Ok(Followup::None) => {}
                    Ok(Followup::Rescan) => {
                        scans.spawn(session.begin_scan());
                    }
                    Ok(Followup::Reconfigured) => {
                        stop_watcher(watcher.take()).await;
                        watcher = session.start_watcher();
                        status_tick = interval(session.config().watch.status_refresh());
                        status_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
                        scans.spawn(session.begin_scan());
                    }
                    Err(err) => break Err(err),
                }
            }

            Some(delta) = deltas.recv() => {
                if let Err(err) = session.apply_delta(delta).await {
                    break Err(err);
                }
            }

            event = next_watch_event(&mut watcher) => match event {
                Some(event) => route_watch_event(&mut session, event),
                None => {
                    warn!("File watcher stopped, live updates disabled");
                    stop_watcher(watcher.take()).await;
                }
            },

            Some(joined) = scans.join_next(), if !scans.is_empty() => match joined {
                Ok(outcome) => {
                    if let Err(err) = session.apply_scan(outcome).await {
                        break Err(err);
                    }
                }
                Err(err) => error!(error = %err, "Scan task failed"),
            },

            _ = status_tick.tick() => {
                if let Err(err) = session.refresh_status_if_dirty().await {
                    break Err(err);
                }
            }
        }
    };

    scans.abort_all();
    session.shutdown();
    stop_watcher(watcher).await;
    result
}

/// Structural events go to the change processor; everything else only
/// makes the status stale.
fn route_watch_event(session: &mut Session, event: WatchEvent) {
    match event {
        WatchEvent::File(event) => session.queue_change(event),
        WatchEvent::Content(_) | WatchEvent::Repository => session.mark_status_dirty(),
    }
}

async fn next_watch_event(watcher: &mut Option<FileWatcher>) -> Option<WatchEvent> {
    match watcher {
        Some(watcher) => watcher.recv().await,
        None => pending().await,
    }
}

async fn stop_watcher(watcher: Option<FileWatcher>) {
    if let Some(watcher) = watcher {
        if let Err(err) = watcher.shutdown().await {
            warn!(error = %err, "File watcher did not stop cleanly");
        }
    }
}
