//! Scan generations.
//!
//! Scans cannot be cancelled once started, so a scan of an old root may
//! finish after a scan of the new one. Each scan request takes a
//! [`ScanTicket`]; when the result arrives, it is applied only if its ticket
//! is still the newest one issued.

use std::sync::atomic::{AtomicU64, Ordering};

/// Token identifying one scan request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScanTicket(u64);

impl ScanTicket {
    /// The raw generation number.
    #[inline]
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

/// Monotonic source of [`ScanTicket`]s.
///
/// # Examples
///
/// ```
/// use st_scanner::ScanGenerations;
///
/// let generations = ScanGenerations::new();
/// let old = generations.begin();
/// let new = generations.begin();
/// assert!(!generations.is_current(old));
/// assert!(generations.is_current(new));
/// ```
#[derive(Debug, Default)]
pub struct ScanGenerations {
    current: AtomicU64,
}

impl ScanGenerations {
    /// Creates a counter with no tickets issued.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a new ticket, superseding every earlier one.
    pub fn begin(&self) -> ScanTicket {
        ScanTicket(self.current.fetch_add(1, Ordering::AcqRel) + 1)
    }

    /// Supersedes every issued ticket without starting a new scan.
    pub fn invalidate(&self) {
        self.current.fetch_add(1, Ordering::AcqRel);
    }

    /// Returns `true` if `ticket` is the newest ticket issued.
    #[must_use]
    pub fn is_current(&self, ticket: ScanTicket) -> bool {
        self.current.load(Ordering::Acquire) == ticket.0
    }
}
