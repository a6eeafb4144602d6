//! Run control shared between the batch and whoever may stop it.
//!
//! [`RunControl`] is wrapped in [`Arc`](std::sync::Arc) and shared between
//! the thread running the batch and the signal handler. The stop flag is
//! an atomic so the scheduler can poll it before every month without
//! taking a lock.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Cooperative cancellation and progress counters for one batch.
#[derive(Debug)]
pub struct RunControl {
    /// Whether a stop has been requested.
    stop_requested: AtomicBool,

    /// Months completed across all cohorts.
    months_completed: AtomicU64,
}

impl RunControl {
    /// A control with no stop requested.
    pub const fn new() -> Self {
        Self {
            stop_requested: AtomicBool::new(false),
            months_completed: AtomicU64::new(0),
        }
    }

    /// Request a stop at the next month boundary.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
    }

    /// Check whether a stop has been requested.
    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Count one completed month.
    pub fn record_month(&self) {
        self.months_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Months completed so far.
    pub fn months_completed(&self) -> u64 {
        self.months_completed.load(Ordering::Relaxed)
    }
}

impl Default for RunControl {
    fn default() -> Self {
        Self::new()
    }
}
