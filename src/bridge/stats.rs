//! Counters for inbound calls.

use crate::bridge::correlator::Outcome;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Shared by every worker of one registration.
#[derive(Debug, Default)]
pub struct BridgeStats {
    dispatched: AtomicUsize,
    resolved: AtomicUsize,
    rejected: AtomicUsize,
    failed: AtomicUsize,
}

/// Point-in-time view of [`BridgeStats`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Calls dispatched whose outcome has not been observed yet
    pub in_flight: usize,
    pub total_dispatched: usize,
    pub total_resolved: usize,
    pub total_rejected: usize,
    /// Waits that ended without a completion (timeout, abandoned handle, shutdown)
    pub total_failed: usize,
}

impl StatsSnapshot {
    pub fn total_finished(&self) -> usize {
        self.total_resolved + self.total_rejected + self.total_failed
    }
}

impl BridgeStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_dispatch(&self) {
        self.dispatched.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_outcome(&self, outcome: &Outcome) {
        if outcome.is_rejection {
            self.rejected.fetch_add(1, Ordering::SeqCst);
        } else {
            self.resolved.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub(crate) fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let total_dispatched = self.dispatched.load(Ordering::SeqCst);
        let total_resolved = self.resolved.load(Ordering::SeqCst);
        let total_rejected = self.rejected.load(Ordering::SeqCst);
        let total_failed = self.failed.load(Ordering::SeqCst);
        let finished = total_resolved + total_rejected + total_failed;
        StatsSnapshot {
            in_flight: total_dispatched.saturating_sub(finished),
            total_dispatched,
            total_resolved,
            total_rejected,
            total_failed,
        }
    }
}
