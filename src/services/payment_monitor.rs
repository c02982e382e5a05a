use chrono::Duration;
use dashmap::DashMap;
use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::app::config::RiskRules;
use crate::models::payment::{PaymentAttempt, SuspiciousActivityReport, SuspiciousPattern};
use crate::services::atomic_metrics::{AtomicMetrics, MetricsSnapshot};
use crate::services::clock::Clock;
use crate::services::fallback_store::{FallbackStore, FAILED_PAYMENT_LOGS, SUSPICIOUS_PAYMENT_ACTIVITY};
use crate::services::risk_evaluator::{self, FailureWindow};
use crate::services::telemetry_client::TelemetrySink;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlushSummary {
    pub delivered: usize,
    pub requeued: usize,
    pub dropped: usize,
}

/// Classifies payment attempts against a short per-user failure history and
/// ships them to the telemetry endpoints.
///
/// Nothing here ever fails toward the caller: undeliverable records go to the
/// fallback store, and a failing fallback store is only logged.
pub struct PaymentMonitor {
    sink: Arc<dyn TelemetrySink>,
    fallback: Arc<dyn FallbackStore>,
    clock: Arc<dyn Clock>,
    rules: RiskRules,
    windows: DashMap<String, FailureWindow>,
    metrics: AtomicMetrics,
}

impl PaymentMonitor {
    pub fn new(
        sink: Arc<dyn TelemetrySink>,
        fallback: Arc<dyn FallbackStore>,
        clock: Arc<dyn Clock>,
        rules: RiskRules,
    ) -> Self {
        Self {
            sink,
            fallback,
            clock,
            rules,
            windows: DashMap::new(),
            metrics: AtomicMetrics::new(),
        }
    }

    /// Logs the attempt, updates the user's failure window and reports any
    /// suspicious pattern. Returns the findings for this attempt.
    pub async fn log_payment_attempt(&self, attempt: &PaymentAttempt) -> Vec<SuspiciousPattern> {
        self.metrics.increment_logged();

        if let Err(e) = self.sink.log_attempt(attempt).await {
            warn!("Payment log delivery failed for {}: {}", attempt.id, e);
            self.metrics.increment_delivery_failures();
            self.store_fallback(FAILED_PAYMENT_LOGS, attempt).await;
        }

        if attempt.is_failure() {
            let now = self.clock.now();
            let emptied = {
                let mut window = self.windows.entry(attempt.user_id.clone()).or_default();
                window.record(attempt.timestamp);
                window.prune(now, self.failure_span());
                window.is_empty()
            };
            // An attempt older than the window leaves nothing behind
            if emptied {
                self.windows.remove_if(&attempt.user_id, |_, window| window.is_empty());
            }
        }

        let findings = self.evaluate(attempt);
        if findings.is_empty() {
            return findings;
        }

        let report = SuspiciousActivityReport {
            attempt: attempt.clone(),
            patterns: findings.clone(),
            timestamp: self.clock.now(),
        };
        warn!(
            "Suspicious payment activity for user {}: {:?}",
            attempt.user_id,
            findings.iter().map(|f| f.pattern_type).collect::<Vec<_>>()
        );
        self.metrics.increment_suspicious();

        if let Err(e) = self.sink.report_suspicious(&report).await {
            warn!("Suspicious activity report failed for {}: {}", attempt.id, e);
            self.metrics.increment_delivery_failures();
            self.store_fallback(SUSPICIOUS_PAYMENT_ACTIVITY, &report).await;
        }

        findings
    }

    /// Heuristic findings for `attempt` against the current window, without
    /// recording anything.
    pub fn evaluate(&self, attempt: &PaymentAttempt) -> Vec<SuspiciousPattern> {
        let now = self.clock.now();
        let window = self.windows.get(&attempt.user_id);
        risk_evaluator::evaluate(&self.rules, attempt, window.as_deref(), now)
    }

    /// Failed attempts currently held for `user_id`.
    pub fn failure_count(&self, user_id: &str) -> usize {
        self.windows
            .get(user_id)
            .map_or(0, |window| window.count_within(self.clock.now(), self.failure_span()))
    }

    /// Prunes every window and forgets users with no failure left in it.
    /// Returns how many users were forgotten.
    pub fn prune_windows(&self) -> usize {
        let now = self.clock.now();
        let span = self.failure_span();
        let before = self.windows.len();
        self.windows.retain(|_, window| {
            window.prune(now, span);
            !window.is_empty()
        });
        let forgotten = before.saturating_sub(self.windows.len());
        if forgotten > 0 {
            debug!("Forgot failure history of {} users", forgotten);
        }
        forgotten
    }

    /// Users with a failure window currently held.
    pub fn tracked_users(&self) -> usize {
        self.windows.len()
    }

    fn failure_span(&self) -> Duration {
        Duration::minutes(self.rules.failure_window_minutes)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Re-sends everything queued in the fallback store. Only delivered and
    /// unreadable entries are removed; the rest stay queued, so an interrupted
    /// flush loses nothing.
    pub async fn flush_fallback(&self) -> FlushSummary {
        let mut summary = FlushSummary::default();

        self.flush_queue::<PaymentAttempt, _, _>(FAILED_PAYMENT_LOGS, &mut summary, |attempt| async move {
            self.sink.log_attempt(&attempt).await
        })
        .await;

        self.flush_queue::<SuspiciousActivityReport, _, _>(SUSPICIOUS_PAYMENT_ACTIVITY, &mut summary, |report| async move {
            self.sink.report_suspicious(&report).await
        })
        .await;

        if summary != FlushSummary::default() {
            info!(
                "Fallback flush: {} delivered, {} requeued, {} dropped",
                summary.delivered, summary.requeued, summary.dropped
            );
        }
        summary
    }

    async fn flush_queue<T, F, Fut>(&self, key: &str, summary: &mut FlushSummary, send: F)
    where
        T: DeserializeOwned,
        F: Fn(T) -> Fut,
        Fut: std::future::Future<Output = Result<(), crate::error::TransportError>>,
    {
        let queued = match self.fallback.load(key).await {
            Ok(queued) => queued,
            Err(e) => {
                error!("Cannot read fallback queue {}: {}", key, e);
                return;
            }
        };
        if queued.is_empty() {
            return;
        }
        debug!("Flushing {} entries from {}", queued.len(), key);

        let mut finished = Vec::with_capacity(queued.len());
        let mut pending = Vec::with_capacity(queued.len());
        for value in queued {
            match serde_json::from_value::<T>(value.clone()) {
                Ok(record) => pending.push((value, send(record))),
                Err(e) => {
                    warn!("Dropping unreadable entry from {}: {}", key, e);
                    summary.dropped += 1;
                    finished.push(value);
                }
            }
        }

        let (values, sends): (Vec<Value>, Vec<Fut>) = pending.into_iter().unzip();
        let results = join_all(sends).await;

        for (value, result) in values.into_iter().zip(results) {
            match result {
                Ok(()) => {
                    summary.delivered += 1;
                    finished.push(value);
                }
                Err(_) => summary.requeued += 1,
            }
        }

        if finished.is_empty() {
            return;
        }
        // A failed removal means redelivery on the next flush, not loss
        if let Err(e) = self.fallback.remove(key, &finished).await {
            error!("Cannot remove flushed entries from {}: {}", key, e);
            self.metrics.increment_fallback_failures();
        }
    }

    async fn store_fallback<T: Serialize>(&self, key: &str, record: &T) {
        let value = match serde_json::to_value(record) {
            Ok(value) => value,
            Err(e) => {
                error!("Cannot serialize fallback entry for {}: {}", key, e);
                self.metrics.increment_fallback_failures();
                return;
            }
        };

        match self.fallback.append(key, value).await {
            Ok(()) => {
                self.metrics.increment_fallback_writes();
                debug!("Stored entry in fallback queue {}", key);
            }
            Err(e) => {
                error!("Fallback store write failed for {}, entry dropped: {}", key, e);
                self.metrics.increment_fallback_failures();
            }
        }
    }
}
