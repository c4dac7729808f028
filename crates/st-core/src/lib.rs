//! Core types, configuration, and wire messages for synaptree.
//!
//! This crate provides the foundational types used across the workspace:
//!
//! - Graph domain types ([`GraphNode`], [`GraphLink`], [`GraphData`])
//! - The configuration document ([`Config`]) and its immutable snapshot
//!   ([`WorkspaceConfig`]) consumed by scanning and node creation
//! - The ignore-pattern matcher ([`IgnoreMatcher`])
//! - The closed message unions exchanged with the rendering surface
//!   ([`SinkMessage`], [`UiMessage`])
//! - Collaborator traits ([`NodeResolver`], [`StatusLookup`])
//! - Type aliases for `FxHashMap`/`FxHashSet` (faster than std)
//!
//! # Crate Dependencies
//!
//! ```text
//! st-cli ──► st-session ──► st-scanner ──► st-core
//!                       └─► st-watcher ──►
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod hash;
pub mod ignore;
pub mod traits;
pub mod types;

pub use config::{
    ColorConfig, Config, ExtensionColor, ExtensionColors, GeneralConfig, ProcessorConfig,
    ScanConfig, WatchConfig, WorkspaceConfig, normalize_extension,
};
pub use error::ConfigError;
pub use hash::{
    FxBuildHasher, FxHashMap, FxHashSet, fx_hash_map, fx_hash_map_with_capacity, fx_hash_set,
    fx_hash_set_with_capacity,
};
pub use ignore::IgnoreMatcher;
pub use traits::{NoStatus, NodeResolver, StatusLookup};
pub use types::{
    GitStatus, GraphData, GraphInvariantError, GraphLink, GraphNode, NodeAction, NodeId,
    NodeType, SinkMessage, StatusChanges, UiMessage,
};
