use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use crate::app::config::Config;
use crate::error::TransportError;
use crate::models::payment::{PaymentAttempt, SuspiciousActivityReport};

/// Remote endpoints receiving payment telemetry.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn log_attempt(&self, attempt: &PaymentAttempt) -> Result<(), TransportError>;
    async fn report_suspicious(&self, report: &SuspiciousActivityReport) -> Result<(), TransportError>;
}

pub struct HttpTelemetrySink {
    client: Client,
    log_url: String,
    suspicious_url: String,
}

impl HttpTelemetrySink {
    pub fn new(config: &Config) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.http_timeout_ms))
            .build()?;

        Ok(Self {
            client,
            log_url: config.payment_log_url.clone(),
            suspicious_url: config.suspicious_activity_url.clone(),
        })
    }

    async fn post<T: Serialize + Sync>(&self, url: &str, body: &T) -> Result<(), TransportError> {
        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            debug!("{} answered {}", url, response.status());
            Err(TransportError::Status(response.status().as_u16()))
        }
    }
}

#[async_trait]
impl TelemetrySink for HttpTelemetrySink {
    async fn log_attempt(&self, attempt: &PaymentAttempt) -> Result<(), TransportError> {
        self.post(&self.log_url, attempt).await
    }

    async fn report_suspicious(&self, report: &SuspiciousActivityReport) -> Result<(), TransportError> {
        self.post(&self.suspicious_url, report).await
    }
}
