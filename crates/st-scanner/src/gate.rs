//! Admission control for filesystem operations.
//!
//! The gate bounds how many `stat`/`readdir` calls are in flight at once. It
//! wraps individual syscalls, never the recursive fan-out: a directory that is
//! waiting on its children holds no slot, so parents can never starve the
//! children they are waiting for.
//!
//! ```text
//!   visit(/w) ──stat──► [gate] ──► release
//!        │    ──readdir─► [gate] ──► release
//!        ├── visit(/w/a) ──stat──► [gate] ...
//!        └── visit(/w/b) ──stat──► [gate] ...
//! ```
//!
//! Waiters are admitted in FIFO order, one-for-one as slots free up, which is
//! what [`tokio::sync::Semaphore`] guarantees.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Semaphore;

use crate::error::ScanError;

#[derive(Debug)]
struct GateInner {
    semaphore: Semaphore,
    budget: usize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

/// A shared, fair bound on concurrent filesystem operations.
///
/// Clones share the same budget, so one gate can be handed to every scan in
/// a session.
///
/// # Examples
///
/// ```
/// use st_scanner::ConcurrencyGate;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let gate = ConcurrencyGate::new(4);
/// let len = gate.run(async { "abc".len() }).await.unwrap();
/// assert_eq!(len, 3);
/// assert_eq!(gate.in_flight(), 0);
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    inner: Arc<GateInner>,
}

/// Tracks one admitted operation and releases the counter on drop.
struct Slot<'a>(&'a GateInner);

impl<'a> Slot<'a> {
    fn enter(inner: &'a GateInner) -> Self {
        let now = inner.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        inner.peak.fetch_max(now, Ordering::AcqRel);
        Self(inner)
    }
}

impl Drop for Slot<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

impl ConcurrencyGate {
    /// Creates a gate admitting at most `budget` operations at once.
    ///
    /// A budget of zero is treated as one.
    #[must_use]
    pub fn new(budget: usize) -> Self {
        let budget = budget.clamp(1, Semaphore::MAX_PERMITS);
        Self {
            inner: Arc::new(GateInner {
                semaphore: Semaphore::new(budget),
                budget,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }),
        }
    }

    /// Runs `op` once a slot is free, holding the slot until it completes.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::GateClosed`] if the gate was closed while waiting.
    pub async fn run<F, T>(&self, op: F) -> Result<T, ScanError>
    where
        F: Future<Output = T>,
    {
        let _permit = self
            .inner
            .semaphore
            .acquire()
            .await
            .map_err(|_| ScanError::GateClosed)?;
        let _slot = Slot::enter(&self.inner);
        Ok(op.await)
    }

    /// Stops admitting operations. Waiters fail with [`ScanError::GateClosed`].
    pub fn close(&self) {
        self.inner.semaphore.close();
    }

    /// The configured budget.
    #[inline]
    #[must_use]
    pub fn budget(&self) -> usize {
        self.inner.budget
    }

    /// Operations currently admitted.
    #[inline]
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    /// Highest number of operations ever admitted at once.
    #[inline]
    #[must_use]
    pub fn peak_in_flight(&self) -> usize {
        self.inner.peak.load(Ordering::Acquire)
    }
}

impl Default for ConcurrencyGate {
    fn default() -> Self {
        Self::new(st_core::ScanConfig::default().max_concurrent_ops)
    }
}
