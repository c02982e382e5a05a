use crate::error::ConfigError;
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use url::Url;

/// Heuristic thresholds used by the payment monitor.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RiskRules {
    pub failure_window_minutes: i64,
    pub failure_threshold: usize,
    pub amount_threshold: f64,
    pub frequency_window_secs: i64,
    pub frequency_threshold: usize,
}

impl Default for RiskRules {
    fn default() -> Self {
        Self {
            failure_window_minutes: 15,
            failure_threshold: 3,
            amount_threshold: 1000.0,
            frequency_window_secs: 60,
            frequency_threshold: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub graphql_url: String,
    pub payment_log_url: String,
    pub suspicious_activity_url: String,
    pub fallback_dir: PathBuf,
    pub fallback_max_entries: usize,
    pub fallback_flush_interval_secs: u64,
    pub http_timeout_ms: u64,
    pub refresh_lead_secs: i64,
    pub rules: RiskRules,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            graphql_url: "http://localhost:8080/graphql".to_string(),
            payment_log_url: "http://localhost:8080/api/payments/log".to_string(),
            suspicious_activity_url: "http://localhost:8080/api/payments/suspicious".to_string(),
            fallback_dir: PathBuf::from(".fallback"),
            fallback_max_entries: 500,
            fallback_flush_interval_secs: 60,
            http_timeout_ms: 5000,
            refresh_lead_secs: 60,
            rules: RiskRules::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            graphql_url: env::var("ADMIN_GRAPHQL_URL")
                .unwrap_or(defaults.graphql_url),
            payment_log_url: env::var("PAYMENT_LOG_URL")
                .unwrap_or(defaults.payment_log_url),
            suspicious_activity_url: env::var("SUSPICIOUS_ACTIVITY_URL")
                .unwrap_or(defaults.suspicious_activity_url),
            fallback_dir: env::var("FALLBACK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.fallback_dir),
            fallback_max_entries: env::var("FALLBACK_MAX_ENTRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.fallback_max_entries),
            fallback_flush_interval_secs: env::var("FALLBACK_FLUSH_INTERVAL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.fallback_flush_interval_secs),
            http_timeout_ms: env::var("HTTP_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.http_timeout_ms),
            refresh_lead_secs: env::var("REFRESH_LEAD_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.refresh_lead_secs),
            rules: defaults.rules,
        }
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Reads the file named by `ADMIN_CORE_CONFIG` when set, the environment otherwise.
    pub fn load() -> Result<Self, ConfigError> {
        let config = match env::var("ADMIN_CORE_CONFIG") {
            Ok(path) => Self::from_toml_str(&std::fs::read_to_string(path)?)?,
            Err(_) => Self::from_env(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_url("graphql_url", &self.graphql_url)?;
        check_url("payment_log_url", &self.payment_log_url)?;
        check_url("suspicious_activity_url", &self.suspicious_activity_url)?;
        Ok(())
    }
}

fn check_url(field: &'static str, value: &str) -> Result<(), ConfigError> {
    match Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(()),
        _ => Err(ConfigError::InvalidUrl {
            field,
            value: value.to_string(),
        }),
    }
}
