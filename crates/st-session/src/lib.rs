//! Session layer for synaptree: one workspace served to one graph sink.
//!
//! # Overview
//!
//! - [`Session`]: owns the roots, the config cell, scan generations, the
//!   change processor and the status synchronizer, and turns everything
//!   into one ordered stream of [`Outbound`] messages
//! - [`run_session`]: the event loop multiplexing UI messages, watcher
//!   events, processor deltas, finished scans and status refreshes
//! - [`ops`]: validated structural edits (create, rename, trash)
//! - [`protocol`]: the outbound union and its line-delimited JSON framing
//!
//! # Example
//!
//! ```no_run
//! use camino::Utf8Path;
//! use st_core::{Config, UiMessage};
//! use st_session::{Session, run_session};
//! use tokio::sync::mpsc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), st_session::SessionError> {
//! let (out_tx, mut out_rx) = mpsc::channel(256);
//! let (session, deltas) = Session::new(Utf8Path::new("."), Config::default(), out_tx)?;
//!
//! let (in_tx, in_rx) = mpsc::channel(16);
//! let running = tokio::spawn(run_session(session, deltas, in_rx, CancellationToken::new()));
//!
//! in_tx.send(UiMessage::Ready).await.ok();
//! while let Some(msg) = out_rx.recv().await {
//!     println!("{}", st_session::encode_line(&msg).unwrap_or_default());
//! }
//! # drop(running);
//! # Ok(())
//! # }
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

mod error;
pub mod ops;
pub mod protocol;
mod runner;
mod session;

pub use error::{OpError, SessionError};
pub use ops::validate_filename;
pub use protocol::{HostCommand, Outbound, decode_line, encode_line};
pub use runner::run_session;
pub use session::{Followup, ScanOutcome, Session};
