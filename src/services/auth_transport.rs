use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use crate::app::config::Config;
use crate::error::{SessionError, TransportError};
use crate::models::session::{LoginResponse, TokenResponse};

/// Remote side of the admin session: whatever issues and revokes tokens.
#[async_trait]
pub trait AuthTransport: Send + Sync {
    async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, SessionError>;
    async fn logout(&self, token: &str) -> Result<(), SessionError>;
    async fn refresh_admin_token(&self, token: &str) -> Result<TokenResponse, SessionError>;
    async fn verify_two_factor(&self, pending_token: &str, code: &str) -> Result<TokenResponse, SessionError>;
    async fn verify_backup_code(&self, pending_token: &str, code: &str) -> Result<TokenResponse, SessionError>;
    async fn reset_admin_password(&self, email: &str) -> Result<(), SessionError>;
}

const LOGIN_MUTATION: &str = "mutation AdminLogin($email: String!, $password: String!) { \
    adminLogin(email: $email, password: $password) { token requires2FA user { id email permissions } } }";
const LOGOUT_MUTATION: &str = "mutation AdminLogout { adminLogout }";
const REFRESH_MUTATION: &str = "mutation RefreshAdminToken { refreshAdminToken { token } }";
const VERIFY_2FA_MUTATION: &str = "mutation Verify2FA($code: String!) { verify2FA(code: $code) { token } }";
const VERIFY_BACKUP_CODE_MUTATION: &str =
    "mutation VerifyBackupCode($code: String!) { verifyBackupCode(code: $code) { token } }";
const RESET_PASSWORD_MUTATION: &str =
    "mutation ResetAdminPassword($email: String!) { resetAdminPassword(email: $email) }";

#[derive(Debug, Deserialize)]
struct GraphqlEnvelope {
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
}

/// Failures reported by the resolver rather than the network.
enum GraphqlFailure {
    Rejected(String),
    Transport(TransportError),
}

impl From<TransportError> for GraphqlFailure {
    fn from(e: TransportError) -> Self {
        GraphqlFailure::Transport(e)
    }
}

pub struct GraphqlAuthTransport {
    client: Client,
    endpoint: String,
}

impl GraphqlAuthTransport {
    pub fn new(config: &Config) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.http_timeout_ms))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.graphql_url.clone(),
        })
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: Value,
        bearer: Option<&str>,
        field: &str,
    ) -> Result<T, GraphqlFailure> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "query": query, "variables": variables }));
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(TransportError::from)?;
        if !response.status().is_success() {
            return Err(TransportError::Status(response.status().as_u16()).into());
        }

        let envelope: GraphqlEnvelope = response.json().await.map_err(TransportError::from)?;
        if let Some(first) = envelope.errors.into_iter().next() {
            debug!("GraphQL {} rejected: {}", field, first.message);
            return Err(GraphqlFailure::Rejected(first.message));
        }

        let value = envelope
            .data
            .and_then(|mut data| data.get_mut(field).map(Value::take))
            .ok_or_else(|| TransportError::InvalidResponse(format!("missing field {field}")))?;

        serde_json::from_value(value)
            .map_err(|e| TransportError::InvalidResponse(e.to_string()).into())
    }
}

// Credential calls map resolver errors to authentication failures
fn credential_error(failure: GraphqlFailure) -> SessionError {
    match failure {
        GraphqlFailure::Rejected(message) => SessionError::Authentication(message),
        GraphqlFailure::Transport(e) => SessionError::Transport(e),
    }
}

fn transport_error(failure: GraphqlFailure) -> SessionError {
    match failure {
        GraphqlFailure::Rejected(message) => SessionError::Transport(TransportError::GraphQl(message)),
        GraphqlFailure::Transport(e) => SessionError::Transport(e),
    }
}

#[async_trait]
impl AuthTransport for GraphqlAuthTransport {
    async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, SessionError> {
        self.execute(
            LOGIN_MUTATION,
            json!({ "email": email, "password": password }),
            None,
            "adminLogin",
        )
        .await
        .map_err(credential_error)
    }

    async fn logout(&self, token: &str) -> Result<(), SessionError> {
        let _: Value = self
            .execute(LOGOUT_MUTATION, json!({}), Some(token), "adminLogout")
            .await
            .map_err(transport_error)?;
        Ok(())
    }

    async fn refresh_admin_token(&self, token: &str) -> Result<TokenResponse, SessionError> {
        self.execute(REFRESH_MUTATION, json!({}), Some(token), "refreshAdminToken")
            .await
            .map_err(credential_error)
    }

    async fn verify_two_factor(&self, pending_token: &str, code: &str) -> Result<TokenResponse, SessionError> {
        self.execute(
            VERIFY_2FA_MUTATION,
            json!({ "code": code }),
            Some(pending_token),
            "verify2FA",
        )
        .await
        .map_err(credential_error)
    }

    async fn verify_backup_code(&self, pending_token: &str, code: &str) -> Result<TokenResponse, SessionError> {
        self.execute(
            VERIFY_BACKUP_CODE_MUTATION,
            json!({ "code": code }),
            Some(pending_token),
            "verifyBackupCode",
        )
        .await
        .map_err(credential_error)
    }

    async fn reset_admin_password(&self, email: &str) -> Result<(), SessionError> {
        let accepted: Value = self
            .execute(
                RESET_PASSWORD_MUTATION,
                json!({ "email": email }),
                None,
                "resetAdminPassword",
            )
            .await
            .map_err(transport_error)?;
        if accepted == Value::Bool(false) {
            warn!("Password reset was not accepted for {}", email);
        }
        Ok(())
    }
}
