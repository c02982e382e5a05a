use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use crate::error::SessionError;
use crate::models::session::Claims;

/// Decodes the claims of a JWT-shaped bearer token.
///
/// The signature is not verified: the backend is the authority, this is only
/// read to learn the expiry and the user behind the session.
///
/// # Errors
///
/// Returns `SessionError::MalformedToken` if the token does not have three
/// segments, the payload is not base64url, or the JSON lacks a required claim.
pub fn decode_claims(token: &str) -> Result<Claims, SessionError> {
    let mut segments = token.split('.');
    let payload = match (segments.next(), segments.next(), segments.next(), segments.next()) {
        (Some(_), Some(payload), Some(_), None) if !payload.is_empty() => payload,
        _ => return Err(SessionError::MalformedToken("expected three segments".into())),
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| SessionError::MalformedToken(format!("invalid base64: {e}")))?;

    serde_json::from_slice(&bytes)
        .map_err(|e| SessionError::MalformedToken(format!("invalid claims: {e}")))
}

/// Builds an unsigned token carrying `claims`. Only meant for fakes and tests.
pub fn encode_unsigned(claims: &Claims) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).unwrap_or_default());
    format!("{header}.{payload}.sig")
}
