//! Error types for the st-watcher crate.

use camino::Utf8PathBuf;

/// Errors that can occur while watching, processing changes or reading
/// version-control status.
///
/// # Error Recovery Strategy
///
/// - **Notify errors** ([`WatchError::Notify`]): fatal for the watcher, the
///   session keeps running without live updates
/// - **Path not found** ([`WatchError::PathNotFound`]): fatal, the path must exist
/// - **Channel closed** ([`WatchError::ChannelClosed`]): fatal, the consumer is gone
/// - **Non-UTF-8 path** ([`WatchError::NonUtf8Path`]): recoverable, the event is skipped
/// - **Git errors** ([`WatchError::Git`]): recoverable, the previous status
///   snapshot stays in effect until the next sync
/// - **No runtime** ([`WatchError::NoRuntime`]): fatal, construct inside a tokio runtime
/// - **I/O and task errors**: fatal
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// Failed to initialize or operate the notify watcher.
    #[error("notify watcher error: {0}")]
    Notify(#[from] notify::Error),

    /// The specified path does not exist.
    #[error("path does not exist: {0}")]
    PathNotFound(Utf8PathBuf),

    /// The event channel was closed unexpectedly.
    #[error("event channel closed unexpectedly")]
    ChannelClosed,

    /// A path is not valid UTF-8.
    #[error("path is not valid UTF-8: {}", _0.display())]
    NonUtf8Path(std::path::PathBuf),

    /// Reading repository status failed.
    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    /// A component that spawns timers was created outside a tokio runtime.
    #[error("no tokio runtime available: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),

    /// A blocking task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl WatchError {
    /// Creates a new [`WatchError::PathNotFound`] error.
    #[inline]
    pub fn path_not_found(path: impl Into<Utf8PathBuf>) -> Self {
        Self::PathNotFound(path.into())
    }

    /// Creates a new [`WatchError::NonUtf8Path`] error.
    #[inline]
    pub fn non_utf8_path(path: impl Into<std::path::PathBuf>) -> Self {
        Self::NonUtf8Path(path.into())
    }

    /// Returns `true` if this error is recoverable (watching can continue).
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::NonUtf8Path(_) | Self::Git(_))
    }

    /// Returns `true` if this error is fatal.
    #[inline]
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !self.is_recoverable()
    }

    /// Returns the file path associated with this error, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Utf8PathBuf> {
        match self {
            Self::PathNotFound(path) => Some(path),
            Self::Notify(_)
            | Self::ChannelClosed
            | Self::NonUtf8Path(_)
            | Self::Git(_)
            | Self::NoRuntime(_)
            | Self::Task(_)
            | Self::Io(_) => None,
        }
    }
}
