use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

use crate::app::config::RiskRules;
use crate::models::payment::{PatternType, PaymentAttempt, Severity, SuspiciousPattern};
use crate::utils::money::format_amount;

/// Timestamps of a user's recent failed attempts, oldest first.
#[derive(Debug, Default, Clone)]
pub struct FailureWindow {
    timestamps: VecDeque<DateTime<Utc>>,
}

impl FailureWindow {
    pub fn record(&mut self, at: DateTime<Utc>) {
        match self.timestamps.back() {
            Some(last) if *last > at => {
                let position = self.timestamps.partition_point(|ts| *ts <= at);
                self.timestamps.insert(position, at);
            }
            _ => self.timestamps.push_back(at),
        }
    }

    /// Drops every entry with `now - ts >= span`.
    pub fn prune(&mut self, now: DateTime<Utc>, span: Duration) {
        while let Some(oldest) = self.timestamps.front() {
            if now - *oldest >= span {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Entries with `now - ts < span`.
    pub fn count_within(&self, now: DateTime<Utc>, span: Duration) -> usize {
        let cutoff = now - span;
        let stale = self.timestamps.partition_point(|ts| *ts <= cutoff);
        self.timestamps.len() - stale
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

/// Runs every heuristic, in order, without short-circuiting.
pub fn evaluate(
    rules: &RiskRules,
    attempt: &PaymentAttempt,
    window: Option<&FailureWindow>,
    now: DateTime<Utc>,
) -> Vec<SuspiciousPattern> {
    let mut findings = Vec::new();
    let failure_span = Duration::minutes(rules.failure_window_minutes);
    let frequency_span = Duration::seconds(rules.frequency_window_secs);

    let recent_failures = window.map_or(0, |w| w.count_within(now, failure_span));
    if recent_failures >= rules.failure_threshold {
        findings.push(SuspiciousPattern {
            pattern_type: PatternType::MultipleFailures,
            severity: Severity::High,
            details: format!(
                "{} failed attempts in the last {} minutes",
                recent_failures, rules.failure_window_minutes
            ),
        });
    }

    if attempt.amount > rules.amount_threshold {
        findings.push(SuspiciousPattern {
            pattern_type: PatternType::AmountThreshold,
            severity: Severity::Medium,
            details: format!(
                "Amount {} exceeds threshold of {}",
                format_amount(attempt.amount, &attempt.currency),
                format_amount(rules.amount_threshold, &attempt.currency)
            ),
        });
    }

    let burst = window.map_or(0, |w| w.count_within(now, frequency_span));
    if burst > rules.frequency_threshold {
        findings.push(SuspiciousPattern {
            pattern_type: PatternType::Frequency,
            severity: Severity::High,
            details: format!(
                "{} failed attempts in the last {} seconds",
                burst, rules.frequency_window_secs
            ),
        });
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::payment::PaymentStatus;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn attempt(amount: f64) -> PaymentAttempt {
        PaymentAttempt::new("u1", amount, "USD", PaymentStatus::Failure, "127.0.0.1", "web").at(now())
    }

    fn window_with(offsets_secs: &[i64]) -> FailureWindow {
        let mut window = FailureWindow::default();
        for offset in offsets_secs {
            window.record(now() - Duration::seconds(*offset));
        }
        window
    }

    fn types(findings: &[SuspiciousPattern]) -> Vec<PatternType> {
        findings.iter().map(|f| f.pattern_type).collect()
    }

    #[test]
    fn test_out_of_order_records_stay_sorted() {
        let mut window = FailureWindow::default();
        window.record(now());
        window.record(now() - Duration::minutes(20));
        window.record(now() - Duration::minutes(1));

        window.prune(now(), Duration::minutes(15));
        assert_eq!(window.len(), 2);
    }

    #[test]
    fn test_prune_boundary_is_inclusive() {
        let mut window = window_with(&[15 * 60, 15 * 60 - 1]);
        window.prune(now(), Duration::minutes(15));
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn test_three_failures_fire() {
        let rules = RiskRules::default();
        let findings = evaluate(&rules, &attempt(10.0), Some(&window_with(&[0, 60, 120])), now());

        assert_eq!(types(&findings), vec![PatternType::MultipleFailures]);
        assert_eq!(findings[0].severity, Severity::High);
        assert_eq!(findings[0].details, "3 failed attempts in the last 15 minutes");
    }

    #[test]
    fn test_two_failures_do_not_fire() {
        let rules = RiskRules::default();
        assert!(evaluate(&rules, &attempt(10.0), Some(&window_with(&[0, 60])), now()).is_empty());
        assert!(evaluate(&rules, &attempt(10.0), None, now()).is_empty());
    }

    #[test]
    fn test_frequency_needs_more_than_five_in_a_minute() {
        let rules = RiskRules::default();

        let five = window_with(&[0, 5, 10, 15, 20]);
        assert!(!types(&evaluate(&rules, &attempt(1.0), Some(&five), now()))
            .contains(&PatternType::Frequency));

        let six = window_with(&[0, 5, 10, 15, 20, 59]);
        let findings = evaluate(&rules, &attempt(1.0), Some(&six), now());
        assert_eq!(
            types(&findings),
            vec![PatternType::MultipleFailures, PatternType::Frequency]
        );
        assert_eq!(findings[1].details, "6 failed attempts in the last 60 seconds");

        // Old failures count toward the 15 minute rule only
        let spread = window_with(&[0, 5, 10, 15, 20, 60]);
        assert_eq!(
            types(&evaluate(&rules, &attempt(1.0), Some(&spread), now())),
            vec![PatternType::MultipleFailures]
        );
    }

    #[test]
    fn test_all_rules_fire_together() {
        let rules = RiskRules::default();
        let window = window_with(&[0, 1, 2, 3, 4, 5]);
        let findings = evaluate(&rules, &attempt(5000.0), Some(&window), now());

        assert_eq!(
            types(&findings),
            vec![
                PatternType::MultipleFailures,
                PatternType::AmountThreshold,
                PatternType::Frequency
            ]
        );
        assert_eq!(findings[1].severity, Severity::Medium);
        assert_eq!(findings[1].details, "Amount 5000.00 USD exceeds threshold of 1000.00 USD");
    }

    #[test]
    fn test_amount_boundary() {
        let rules = RiskRules::default();
        assert!(evaluate(&rules, &attempt(1000.0), None, now()).is_empty());
        assert_eq!(
            types(&evaluate(&rules, &attempt(1000.01), None, now())),
            vec![PatternType::AmountThreshold]
        );
    }

    proptest! {
        #[test]
        fn amount_rule_matches_strict_comparison(amount in 0.0f64..5000.0) {
            let rules = RiskRules::default();
            let findings = evaluate(&rules, &attempt(amount), None, now());
            prop_assert_eq!(!findings.is_empty(), amount > 1000.0);
        }

        #[test]
        fn window_count_never_exceeds_records(offsets in proptest::collection::vec(0i64..3600, 0..40)) {
            let mut window = window_with(&offsets);
            let before = window.count_within(now(), Duration::minutes(15));
            window.prune(now(), Duration::minutes(15));
            prop_assert_eq!(window.len(), before);
            prop_assert_eq!(before, offsets.iter().filter(|o| **o < 15 * 60).count());
        }
    }
}
