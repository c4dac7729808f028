//! Error types for the session crate.

use camino::{Utf8Path, Utf8PathBuf};
use st_core::{ConfigError, NodeAction};
use st_watcher::WatchError;
use thiserror::Error;

/// Errors from a structural edit requested by the UI.
///
/// These are reported back to the host as `showError` commands and are
/// never retried.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum OpError {
    /// A user-supplied entry name was rejected.
    #[error("invalid name '{name}': {reason}")]
    InvalidName {
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// A create or rename action arrived without a name.
    #[error("{0:?} requires a name")]
    MissingName(NodeAction),

    /// The target of a create or rename already exists.
    #[error("already exists: {0}")]
    AlreadyExists(Utf8PathBuf),

    /// The path named by the request does not exist.
    #[error("not found: {0}")]
    NotFound(Utf8PathBuf),

    /// A directory was required.
    #[error("not a directory: {0}")]
    NotADirectory(Utf8PathBuf),

    /// The path is outside the workspace, or is the workspace root where
    /// that is not allowed.
    #[error("outside the workspace: {0}")]
    OutsideWorkspace(Utf8PathBuf),

    /// Filesystem error on a specific path.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// The path being operated on.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Moving an entry to the trash failed.
    #[error("failed to move {path} to the trash: {source}")]
    Trash {
        /// The entry being deleted.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        source: trash::Error,
    },

    /// The blocking task running the operation panicked.
    #[error("operation task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl OpError {
    /// Maps an I/O error, turning `NotFound` into [`OpError::NotFound`] and
    /// `AlreadyExists` into [`OpError::AlreadyExists`].
    pub fn from_io(path: impl AsRef<Utf8Path>, source: std::io::Error) -> Self {
        let path = path.as_ref().to_path_buf();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path),
            std::io::ErrorKind::AlreadyExists => Self::AlreadyExists(path),
            _ => Self::Io { path, source },
        }
    }

    /// Creates an invalid name error.
    pub fn invalid_name(name: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidName {
            name: name.into(),
            reason,
        }
    }

    /// Returns `true` if the request was rejected before touching the
    /// filesystem.
    pub fn is_rejected(&self) -> bool {
        matches!(
            self,
            Self::InvalidName { .. } | Self::MissingName(_) | Self::OutsideWorkspace(_)
        )
    }

    /// The path associated with this error, if any.
    pub fn path(&self) -> Option<&Utf8Path> {
        match self {
            Self::AlreadyExists(path)
            | Self::NotFound(path)
            | Self::NotADirectory(path)
            | Self::OutsideWorkspace(path)
            | Self::Io { path, .. }
            | Self::Trash { path, .. } => Some(path),
            Self::InvalidName { .. } | Self::MissingName(_) | Self::Task(_) => None,
        }
    }
}

/// Errors raised while serving a session.
///
/// Failures of individual UI requests never end the session. Only
/// [`SessionError::ChannelClosed`] is fatal.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    /// A structural edit failed.
    #[error(transparent)]
    Op(#[from] OpError),

    /// A configuration document was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Watcher, processor or status error.
    #[error(transparent)]
    Watch(#[from] WatchError),

    /// The workspace root could not be resolved.
    #[error("invalid workspace root {path}: {source}")]
    Root {
        /// The root as given.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The outbound channel to the sink was closed.
    #[error("outbound channel closed")]
    ChannelClosed,
}

impl SessionError {
    /// Returns `true` if the session can continue after this error.
    pub fn is_recoverable(&self) -> bool {
        !self.is_fatal()
    }

    /// Returns `true` if the session must stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ChannelClosed | Self::Root { .. })
    }

    /// The path associated with this error, if any.
    pub fn path(&self) -> Option<&Utf8Path> {
        match self {
            Self::Op(err) => err.path(),
            Self::Root { path, .. } => Some(path),
            _ => None,
        }
    }
}
