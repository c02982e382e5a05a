use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP {0}")]
    Status(u16),
    #[error("GraphQL error: {0}")]
    GraphQl(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("auth transport failed: {0}")]
    Transport(#[from] TransportError),
    #[error("malformed token: {0}")]
    MalformedToken(String),
    #[error("second factor required")]
    SecondFactorRequired,
    #[error("no active session")]
    NoSession,
    #[error("session changed while the request was in flight")]
    Superseded,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("fallback store I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("fallback store serialization: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("fallback store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid URL for {field}: {value}")]
    InvalidUrl { field: &'static str, value: String },
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),
}
