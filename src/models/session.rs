use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Decoded payload of an admin bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    #[serde(default)]
    pub permissions: Vec<String>,
    /// Expiry (seconds since epoch)
    pub exp: i64,
}

impl Claims {
    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// A token whose expiry is at or before `now` is never valid.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.exp.saturating_mul(1000) <= now.timestamp_millis()
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminUser {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl From<&Claims> for AdminUser {
    fn from(claims: &Claims) -> Self {
        Self {
            id: claims.sub.clone(),
            email: claims.email.clone(),
            permissions: claims.permissions.clone(),
        }
    }
}

/// Response of the remote `adminLogin` mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: Option<AdminUser>,
    #[serde(rename = "requires2FA", default)]
    pub requires_2fa: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

/// What `SessionManager::login` hands back to the caller.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub token: String,
    pub user: Option<AdminUser>,
    pub requires_2fa: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Anonymous,
    Authenticated,
    Refreshing,
}

/// Notifications for the hosting application (e.g. redirect to the login view on `Expired`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Refreshed,
    Expired { reason: String },
    LoggedOut,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(exp: i64) -> Claims {
        Claims {
            sub: "42".to_string(),
            email: "admin@example.com".to_string(),
            permissions: vec!["orders.read".to_string()],
            exp,
        }
    }

    #[test]
    fn test_expiry_is_inclusive() {
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        assert!(claims(1_700_000_000).is_expired_at(now));
        assert!(claims(1_699_999_999).is_expired_at(now));
        assert!(!claims(1_700_000_001).is_expired_at(now));
    }

    #[test]
    fn test_missing_permissions_default_to_empty() {
        let parsed: Claims =
            serde_json::from_str(r#"{"sub":"1","email":"a@b.c","exp":10}"#).unwrap();
        assert!(parsed.permissions.is_empty());
        assert!(!parsed.has_permission("orders.read"));
        assert!(claims(10).has_permission("orders.read"));
    }
}
