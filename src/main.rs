use anyhow::Context;
use chrono::Duration as ChronoDuration;
use std::sync::Arc;
use storefront_admin_core::app::config::Config;
use storefront_admin_core::models::session::SessionEvent;
use storefront_admin_core::services::{
    FileFallbackStore, GraphqlAuthTransport, HttpTelemetrySink, PaymentMonitor, SessionManager,
    SystemClock,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::load().context("invalid configuration")?;
    info!("Starting admin core against {}", config.graphql_url);

    let clock = Arc::new(SystemClock);

    let session = SessionManager::new(
        Arc::new(GraphqlAuthTransport::new(&config)?),
        clock.clone(),
        ChronoDuration::seconds(config.refresh_lead_secs),
    );

    let monitor = Arc::new(PaymentMonitor::new(
        Arc::new(HttpTelemetrySink::new(&config)?),
        Arc::new(FileFallbackStore::new(&config.fallback_dir, config.fallback_max_entries)),
        clock,
        config.rules.clone(),
    ));

    if let Ok(token) = std::env::var("ADMIN_TOKEN") {
        match session.restore(&token) {
            Ok(claims) => info!("Restored session for {}", claims.email),
            Err(e) => warn!("Ignoring ADMIN_TOKEN: {}", e),
        }
    }

    // Session events task
    tokio::spawn({
        let mut events = session.subscribe();
        async move {
            while let Ok(event) = events.recv().await {
                match event {
                    SessionEvent::Expired { reason } => {
                        warn!("Session expired ({}), login required", reason)
                    }
                    SessionEvent::LoggedOut => info!("Session logged out"),
                    SessionEvent::Refreshed => info!("Session refreshed"),
                }
            }
        }
    });

    // Fallback flush and window sweep task
    tokio::spawn({
        let monitor = monitor.clone();
        let interval = std::time::Duration::from_secs(config.fallback_flush_interval_secs.max(1));
        async move {
            loop {
                tokio::time::sleep(interval).await;
                let summary = monitor.flush_fallback().await;
                if summary.requeued > 0 {
                    warn!("{} telemetry entries still undelivered", summary.requeued);
                }
                monitor.prune_windows();
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutting down, metrics: {:?}", monitor.metrics());
    if session.token().is_some() {
        session.logout().await;
    }

    Ok(())
}
