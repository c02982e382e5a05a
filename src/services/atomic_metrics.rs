use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters kept by the payment monitor.
#[derive(Default)]
pub struct AtomicMetrics {
    attempts_logged: AtomicU64,
    delivery_failures: AtomicU64,
    suspicious_reported: AtomicU64,
    fallback_writes: AtomicU64,
    fallback_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub attempts_logged: u64,
    pub delivery_failures: u64,
    pub suspicious_reported: u64,
    pub fallback_writes: u64,
    pub fallback_failures: u64,
}

impl AtomicMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_logged(&self) {
        self.attempts_logged.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_delivery_failures(&self) {
        self.delivery_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_suspicious(&self) {
        self.suspicious_reported.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_fallback_writes(&self) {
        self.fallback_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_fallback_failures(&self) {
        self.fallback_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            attempts_logged: self.attempts_logged.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
            suspicious_reported: self.suspicious_reported.load(Ordering::Relaxed),
            fallback_writes: self.fallback_writes.load(Ordering::Relaxed),
            fallback_failures: self.fallback_failures.load(Ordering::Relaxed),
        }
    }
}
