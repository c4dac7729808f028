//! Filtering of watch events before they leave the watcher thread.
//!
//! # Examples
//!
//! ```
//! use camino::Utf8Path;
//! use st_core::IgnoreMatcher;
//! use st_watcher::{FileFilter, IgnoreFilter};
//!
//! let matcher = IgnoreMatcher::new(["node_modules", "*.log"]).unwrap();
//! let filter = IgnoreFilter::new("/w", matcher);
//!
//! assert!(filter.should_process(Utf8Path::new("/w/src/app.ts")));
//! assert!(!filter.should_process(Utf8Path::new("/w/node_modules/pkg/index.js")));
//! assert!(!filter.should_process(Utf8Path::new("/w/logs/out.LOG")));
//! ```

use camino::{Utf8Path, Utf8PathBuf};
use st_core::IgnoreMatcher;

/// A predicate over changed paths.
///
/// Called on the blocking watcher thread for every structural event, so
/// implementations must be cheap and thread-safe.
pub trait FileFilter: Send + Sync + 'static {
    /// Returns `true` if an event for `path` should be forwarded.
    fn should_process(&self, path: &Utf8Path) -> bool;
}

/// A filter that accepts everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAllFilter;

impl FileFilter for AcceptAllFilter {
    #[inline]
    fn should_process(&self, _path: &Utf8Path) -> bool {
        true
    }
}

/// Drops paths that sit at or beneath an ignored entry.
///
/// Only components below `root` are checked, so a workspace that itself lives
/// inside a directory named like an ignore pattern still works.
#[derive(Debug, Clone)]
pub struct IgnoreFilter {
    root: Utf8PathBuf,
    matcher: IgnoreMatcher,
}

impl IgnoreFilter {
    /// Creates a filter for the workspace at `root`.
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>, matcher: IgnoreMatcher) -> Self {
        Self {
            root: root.into(),
            matcher,
        }
    }

    /// The workspace root.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }
}

impl FileFilter for IgnoreFilter {
    fn should_process(&self, path: &Utf8Path) -> bool {
        let Ok(relative) = path.strip_prefix(&self.root) else {
            return true;
        };
        !relative
            .components()
            .any(|component| self.matcher.is_ignored(component.as_str()))
    }
}

/// All of its filters must accept. An empty composite accepts everything.
#[derive(Default)]
pub struct CompositeFilter {
    filters: Vec<Box<dyn FileFilter>>,
}

impl CompositeFilter {
    /// Creates an empty composite.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a filter.
    #[must_use]
    pub fn and<F: FileFilter>(mut self, filter: F) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    /// Number of filters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Returns `true` if no filter was added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl std::fmt::Debug for CompositeFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeFilter")
            .field("filters", &self.filters.len())
            .finish()
    }
}

impl FileFilter for CompositeFilter {
    fn should_process(&self, path: &Utf8Path) -> bool {
        self.filters.iter().all(|f| f.should_process(path))
    }
}

impl<F: FileFilter + ?Sized> FileFilter for Box<F> {
    fn should_process(&self, path: &Utf8Path) -> bool {
        (**self).should_process(path)
    }
}

impl<F: FileFilter + ?Sized> FileFilter for std::sync::Arc<F> {
    fn should_process(&self, path: &Utf8Path) -> bool {
        (**self).should_process(path)
    }
}
