use chrono::Duration as ChronoDuration;
use std::sync::Arc;
use storefront_admin_core::app::config::{Config, RiskRules};
use storefront_admin_core::error::SessionError;
use storefront_admin_core::models::payment::{PaymentAttempt, PaymentStatus, SuspiciousActivityReport};
use storefront_admin_core::models::session::SessionState;
use storefront_admin_core::services::fallback_store::{FAILED_PAYMENT_LOGS, SUSPICIOUS_PAYMENT_ACTIVITY};
use storefront_admin_core::services::{
    FallbackStore, FileFallbackStore, GraphqlAuthTransport, HttpTelemetrySink, PaymentMonitor,
    SessionManager, SystemClock,
};
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

// Nothing listens on the discard port
fn offline_config(dir: &TempDir) -> Config {
    Config {
        graphql_url: "http://127.0.0.1:9/graphql".to_string(),
        payment_log_url: "http://127.0.0.1:9/log".to_string(),
        suspicious_activity_url: "http://127.0.0.1:9/suspicious".to_string(),
        fallback_dir: dir.path().to_path_buf(),
        http_timeout_ms: 500,
        ..Config::default()
    }
}

#[tokio::test]
async fn unreachable_sinks_queue_everything_on_disk() {
    let dir = TempDir::new().unwrap();
    let config = offline_config(&dir);
    let store = Arc::new(FileFallbackStore::new(&config.fallback_dir, config.fallback_max_entries));
    let monitor = PaymentMonitor::new(
        Arc::new(assert_ok!(HttpTelemetrySink::new(&config))),
        store.clone(),
        Arc::new(SystemClock),
        RiskRules::default(),
    );

    let attempt = PaymentAttempt::new("u-77", 1200.0, "EUR", PaymentStatus::Failure, "198.51.100.4", "Firefox/Linux")
        .with_error("do_not_honor", "Do not honor");
    let findings = monitor.log_payment_attempt(&attempt).await;
    assert_eq!(findings.len(), 1);

    let logs = assert_ok!(store.load(FAILED_PAYMENT_LOGS).await);
    let restored: PaymentAttempt = serde_json::from_value(logs[0].clone()).unwrap();
    assert_eq!(restored, attempt);

    let reports = assert_ok!(store.load(SUSPICIOUS_PAYMENT_ACTIVITY).await);
    let report: SuspiciousActivityReport = serde_json::from_value(reports[0].clone()).unwrap();
    assert_eq!(report.attempt, attempt);

    let summary = monitor.flush_fallback().await;
    assert_eq!(summary.requeued, 2);
    assert_eq!(assert_ok!(store.load(FAILED_PAYMENT_LOGS).await).len(), 1);
}

#[tokio::test]
async fn unreachable_auth_backend_is_a_transport_error() {
    let dir = TempDir::new().unwrap();
    let config = offline_config(&dir);
    let session = SessionManager::new(
        Arc::new(assert_ok!(GraphqlAuthTransport::new(&config))),
        Arc::new(SystemClock),
        ChronoDuration::seconds(config.refresh_lead_secs),
    );

    let result = session.login("admin@example.com", "secret").await;
    assert!(matches!(result, Err(SessionError::Transport(_))));
    assert_err!(session.refresh_token().await);
    assert_eq!(session.state(), SessionState::Anonymous);
    assert!(!session.is_authenticated());
}
