//! Scan statistics with atomic counters.
//!
//! Counters use [`Relaxed`](std::sync::atomic::Ordering::Relaxed) ordering.
//! They are informational and are only read after the traversal has joined.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Atomic counters for one scan.
///
/// # Examples
///
/// ```
/// use st_scanner::ScanStats;
///
/// let stats = ScanStats::new();
/// stats.increment_directories();
/// stats.increment_files();
/// stats.increment_files();
///
/// let snap = stats.snapshot();
/// assert_eq!(snap.nodes(), 3);
/// ```
#[derive(Debug, Default)]
pub struct ScanStats {
    directories: AtomicU64,
    files: AtomicU64,
    ignored: AtomicU64,
    errors: AtomicU64,
}

impl ScanStats {
    /// Creates a new [`ScanStats`] with all counters at zero.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts a directory node (the root included).
    #[inline]
    pub fn increment_directories(&self) {
        self.directories.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a file node.
    #[inline]
    pub fn increment_files(&self) {
        self.files.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts an entry dropped by an ignore pattern.
    #[inline]
    pub fn increment_ignored(&self) {
        self.ignored.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts an entry or subtree dropped because of an error.
    #[inline]
    pub fn increment_errors(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time copy of all counters.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            directories: self.directories.load(Ordering::Relaxed),
            files: self.files.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of [`ScanStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Directory nodes, the root included.
    pub directories: u64,
    /// File nodes.
    pub files: u64,
    /// Entries dropped by ignore patterns.
    pub ignored: u64,
    /// Entries or subtrees dropped because of errors.
    pub errors: u64,
}

impl StatsSnapshot {
    /// Total nodes produced.
    #[inline]
    #[must_use]
    pub const fn nodes(&self) -> u64 {
        self.directories + self.files
    }
}
