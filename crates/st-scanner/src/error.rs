//! Error types for the st-scanner crate.
//!
//! Scanning itself never fails: every [`ScanError`] is logged where it
//! happens, the affected entry or subtree is left out, and the error is
//! collected into the [`ScanReport`](crate::ScanReport) for callers that want
//! to inspect it.

use camino::Utf8PathBuf;

/// Errors that can occur while scanning.
///
/// # Error Recovery Strategy
///
/// - **Metadata / listing errors**: the entry (or its subtree) is omitted,
///   siblings and ancestors are unaffected
/// - **Non-UTF-8 names**: the entry is omitted
/// - **Gate closed**: the scan was torn down, nothing further is admitted
///
/// # Examples
///
/// ```
/// use st_scanner::ScanError;
///
/// let err = ScanError::metadata(
///     "/w/gone.ts",
///     std::io::Error::new(std::io::ErrorKind::NotFound, "vanished"),
/// );
/// assert!(err.is_recoverable());
/// assert_eq!(err.path().map(|p| p.as_str()), Some("/w/gone.ts"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// An entry could not be stat'd (deleted mid-scan, permission denied).
    #[error("failed to stat {path}: {source}")]
    Metadata {
        /// The entry.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A directory could not be listed.
    #[error("failed to list directory {path}: {source}")]
    ReadDir {
        /// The directory.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A directory entry's name is not valid UTF-8.
    #[error("path is not valid UTF-8: {}", _0.display())]
    NonUtf8Path(std::path::PathBuf),

    /// The concurrency gate was closed while an operation waited for a slot.
    #[error("concurrency gate closed")]
    GateClosed,
}

impl ScanError {
    /// Creates a new [`ScanError::Metadata`] error.
    #[inline]
    pub fn metadata(path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        Self::Metadata {
            path: path.into(),
            source,
        }
    }

    /// Creates a new [`ScanError::ReadDir`] error.
    #[inline]
    pub fn read_dir(path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        Self::ReadDir {
            path: path.into(),
            source,
        }
    }

    /// Returns `true` if scanning can continue past this error.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::GateClosed)
    }

    /// Returns `true` if nothing further can be scanned.
    #[inline]
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !self.is_recoverable()
    }

    /// Returns the path associated with this error, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Utf8PathBuf> {
        match self {
            Self::Metadata { path, .. } | Self::ReadDir { path, .. } => Some(path),
            Self::NonUtf8Path(_) | Self::GateClosed => None,
        }
    }
}
