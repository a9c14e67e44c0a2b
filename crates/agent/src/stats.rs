//! Dispatcher counters.
//!
//! The dispatcher task is the only writer; readers take a consistent-enough
//! snapshot through atomics without talking to the task.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Read-only monitoring view.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatcherStats {
    pub queue_length: usize,
    pub in_flight_count: usize,
    pub total_requests: u64,
    pub success_count: u64,
    pub failure_count: u64,
    /// Successes over finished queries, `1.0` before anything finished.
    pub success_rate: f64,
    pub active_conversations: usize,
}

#[derive(Debug, Default)]
pub struct StatsRecorder {
    total: AtomicU64,
    success: AtomicU64,
    failure: AtomicU64,
    queue_length: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl StatsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_enqueued(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_success(&self) {
        self.success.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.failure.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn set_gauges(&self, queue_length: usize, in_flight: usize) {
        self.queue_length.store(queue_length, Ordering::Relaxed);
        self.in_flight.store(in_flight, Ordering::Relaxed);
        self.peak_in_flight.fetch_max(in_flight, Ordering::Relaxed);
    }

    /// Highest in-flight count observed since start.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self, active_conversations: usize) -> DispatcherStats {
        let success_count = self.success.load(Ordering::Relaxed);
        let failure_count = self.failure.load(Ordering::Relaxed);
        let finished = success_count + failure_count;
        let success_rate = if finished == 0 {
            1.0
        } else {
            success_count as f64 / finished as f64
        };

        DispatcherStats {
            queue_length: self.queue_length.load(Ordering::Relaxed),
            in_flight_count: self.in_flight.load(Ordering::Relaxed),
            total_requests: self.total.load(Ordering::Relaxed),
            success_count,
            failure_count,
            success_rate,
            active_conversations,
        }
    }
}
