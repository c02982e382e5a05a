use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Success,
    Failure,
    Suspicious,
}

/// A single payment attempt. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentAttempt {
    pub id: String,
    pub user_id: String,
    pub amount: f64,
    pub currency: String,
    pub timestamp: DateTime<Utc>,
    pub status: PaymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub ip_address: String,
    pub device: String,
}

impl PaymentAttempt {
    pub fn new(
        user_id: impl Into<String>,
        amount: f64,
        currency: impl Into<String>,
        status: PaymentStatus,
        ip_address: impl Into<String>,
        device: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            amount,
            currency: currency.into(),
            timestamp: Utc::now(),
            status,
            error_code: None,
            error_message: None,
            ip_address: ip_address.into(),
            device: device.into(),
        }
    }

    pub fn with_error(mut self, code: impl Into<String>, message: impl Into<String>) -> Self {
        self.error_code = Some(code.into());
        self.error_message = Some(message.into());
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn is_failure(&self) -> bool {
        self.status == PaymentStatus::Failure
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    MultipleFailures,
    AmountThreshold,
    Frequency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuspiciousPattern {
    #[serde(rename = "type")]
    pub pattern_type: PatternType,
    pub severity: Severity,
    pub details: String,
}

// Payload para o endpoint de atividade suspeita
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuspiciousActivityReport {
    pub attempt: PaymentAttempt,
    pub patterns: Vec<SuspiciousPattern>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names() {
        let attempt = PaymentAttempt::new("u1", 12.5, "EUR", PaymentStatus::Failure, "10.0.0.1", "ios")
            .with_error("card_declined", "Card declined");
        let json = serde_json::to_value(&attempt).unwrap();

        assert_eq!(json["userId"], "u1");
        assert_eq!(json["status"], "failure");
        assert_eq!(json["errorCode"], "card_declined");
        assert_eq!(json["ipAddress"], "10.0.0.1");

        let pattern = SuspiciousPattern {
            pattern_type: PatternType::MultipleFailures,
            severity: Severity::High,
            details: String::new(),
        };
        let json = serde_json::to_value(&pattern).unwrap();
        assert_eq!(json["type"], "multiple_failures");
        assert_eq!(json["severity"], "high");
    }

    #[test]
    fn test_error_fields_are_optional_on_the_wire() {
        let raw = r#"{
            "id": "a1", "userId": "u1", "amount": 5.0, "currency": "USD",
            "timestamp": "2024-03-01T10:00:00Z", "status": "success",
            "ipAddress": "127.0.0.1", "device": "web"
        }"#;
        let attempt: PaymentAttempt = serde_json::from_str(raw).unwrap();
        assert_eq!(attempt.status, PaymentStatus::Success);
        assert!(attempt.error_code.is_none());
        assert!(!attempt.is_failure());
    }
}
