//! Workspace scanner and node factory for synaptree.
//!
//! This crate turns a directory tree into a [`GraphData`](st_core::GraphData)
//! snapshot, and turns single created paths into [`GraphNode`](st_core::GraphNode)s
//! for the change processor.
//!
//! # Overview
//!
//! - [`Scanner`]: concurrent depth-first traversal producing a full graph
//! - [`ConcurrencyGate`]: fair bound on in-flight `stat`/`readdir` calls
//! - [`NodeFactory`]: [`NodeResolver`](st_core::NodeResolver) backed by a
//!   live [`SharedConfig`]
//! - [`ScanGenerations`]: lets a caller discard results of superseded scans
//! - [`ScanStats`]: atomic counters for one traversal
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use camino::Utf8Path;
//! use st_core::{ScanConfig, WorkspaceConfig};
//! use st_scanner::{ScanGenerations, Scanner};
//!
//! # async fn example() {
//! let generations = ScanGenerations::new();
//! let scanner = Scanner::new(Arc::new(WorkspaceConfig::default()), &ScanConfig::default());
//!
//! let ticket = generations.begin();
//! let report = scanner.scan_with_report(Utf8Path::new("./")).await;
//! if generations.is_current(ticket) {
//!     println!("{} nodes, {} skipped", report.data.len(), report.errors.len());
//! }
//! # }
//! ```
//!
//! # Failure model
//!
//! Scans never fail. Unreadable entries are logged at `warn`, counted, and
//! left out of the graph together with their subtree.

#![deny(clippy::all)]
#![warn(missing_docs)]

mod error;
mod factory;
mod gate;
mod generation;
mod scanner;
mod stats;

pub use error::ScanError;
pub use factory::{NodeFactory, SharedConfig, build_node, make_node};
pub use gate::ConcurrencyGate;
pub use generation::{ScanGenerations, ScanTicket};
pub use scanner::{ScanReport, Scanner};
pub use stats::{ScanStats, StatsSnapshot};
