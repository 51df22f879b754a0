//! Step counters for a boot run
//!
//! Counters are updated with relaxed atomics; a snapshot is a consistent view
//! only once the coordinator has settled.

use serde::Serialize;

use crate::core::errors::Result;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct StepCounters {
    registered: AtomicU64,
    dispatched: AtomicU64,
    skipped: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

impl StepCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_registered(&self) {
        self.registered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatched(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, pending: usize) -> BootStats {
        BootStats {
            registered: self.registered.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            pending,
        }
    }
}

/// Point-in-time view of a coordinator's step counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BootStats {
    /// Steps handed to `register`
    pub registered: u64,
    /// Steps accepted for dispatch
    pub dispatched: u64,
    /// Steps refused because a failure was already captured
    pub skipped: u64,
    /// Steps that finished successfully
    pub completed: u64,
    /// Steps that finished with an error, including discarded later errors
    pub failed: u64,
    /// Callback and future steps still outstanding
    pub pending: usize,
}

impl BootStats {
    /// Steps that have reported in, successfully or not
    pub fn finished(&self) -> u64 {
        self.completed + self.failed
    }

    /// Pretty-printed JSON, for status endpoints and boot reports
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot() {
        let counters = StepCounters::new();
        counters.record_registered();
        counters.record_registered();
        counters.record_dispatched();
        counters.record_failed();
        counters.record_skipped();

        let stats = counters.snapshot(0);
        assert_eq!(stats.registered, 2);
        assert_eq!(stats.dispatched, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.finished(), 1);
    }

    #[test]
    fn test_serializes_to_json() {
        let counters = StepCounters::new();
        counters.record_completed();
        let json = serde_json::to_value(counters.snapshot(3)).unwrap();
        assert_eq!(json["completed"], 1);
        assert_eq!(json["pending"], 3);
    }

    #[test]
    fn test_to_json_report() {
        let counters = StepCounters::new();
        counters.record_registered();
        counters.record_dispatched();
        counters.record_failed();

        let report = counters.snapshot(0).to_json().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&report).unwrap();
        assert_eq!(parsed["registered"], 1);
        assert_eq!(parsed["failed"], 1);
        assert_eq!(parsed["pending"], 0);
        assert!(report.contains('\n'));
    }
}
