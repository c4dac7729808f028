//! Live updates for synaptree: filesystem watching, change processing and
//! version-control status.
//!
//! # Overview
//!
//! - [`FileWatcher`]: `notify` on a blocking thread, translated into
//!   create/delete [`WatchEvent`]s and streamed over a channel
//! - [`ChangeProcessor`]: debounces, cancels and chunks those events into
//!   ordered [`GraphDelta`]s
//! - [`StatusSynchronizer`]: diffs [`StatusSource`] snapshots into
//!   [`StatusDelta`]s, and answers status lookups for new nodes
//!
//! # Architecture
//!
//! ```text
//!   FileWatcher ──WatchEvent──► session ──queue()──► ChangeProcessor ──GraphDelta──► sink
//!                                  │                      │
//!                                  │                      ├─ NodeResolver (node factory)
//!                                  │                      └─ StatusLookup ◄─┐
//!                                  └──sync()──► StatusSynchronizer ─────────┘──StatusDelta──► sink
//! ```
//!
//! # Crate Dependencies
//!
//! ```text
//! st-cli ──► st-session ──► st-scanner ──► st-core
//!                      └──► st-watcher ──► st-core
//! ```
//!
//! The processor only sees the [`NodeResolver`](st_core::NodeResolver) and
//! [`StatusLookup`](st_core::StatusLookup) traits, so this crate does not
//! depend on the scanner.

#![deny(clippy::all)]
#![warn(missing_docs)]

mod error;
mod events;
mod filter;
mod processor;
mod status;
mod watcher;

pub use error::WatchError;
pub use events::{ChangeKind, FileEvent, GraphDelta, NodeAddition, WatchEvent, WatchEvents};
pub use filter::{AcceptAllFilter, CompositeFilter, FileFilter, IgnoreFilter};
pub use processor::{ChangeProcessor, ProcessorState, ProcessorStats};
pub use status::{
    GitStatusSource, StatusDelta, StatusMap, StatusSource, StatusSynchronizer, diff_status,
};
pub use watcher::FileWatcher;
