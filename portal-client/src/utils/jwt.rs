use base64::{
    Engine as _, alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

/// Allowed clock drift between this client and the token issuer.
pub const CLOCK_SKEW_SECS: i64 = 5;

/// Standard alphabet, padded input, lenient about non-zero trailing bits.
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_allow_trailing_bits(true)
        .with_decode_padding_mode(DecodePaddingMode::RequireCanonical),
);

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Invalid JWT format: expected 3 segments, found {0}")]
    Malformed(usize),

    #[error("Failed to decode JWT payload: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("Failed to parse JWT claims: {0}")]
    Claims(#[from] serde_json::Error),

    #[error("JWT payload has no numeric exp claim")]
    MissingExpiry,
}

/// Claims of a session token, decoded without signature validation.
///
/// The backend validates signatures; the client only needs `exp` to avoid
/// sending requests with a credential it already knows is dead.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenClaims {
    /// Expiry in seconds since the epoch.
    pub exp: f64,
    pub payload: Value,
}

impl TokenClaims {
    pub fn subject(&self) -> Option<&str> {
        self.payload.get("sub").and_then(Value::as_str)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp.floor() as i64, 0)
    }
}

/// Reverse the URL-safe substitutions and restore `=` padding.
fn to_standard_base64(segment: &str) -> String {
    let mut s: String = segment
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();

    let pad = s.len() % 4;
    if pad != 0 {
        s.push_str(&"=".repeat(4 - pad));
    }
    s
}

/// Decode the payload segment of a compact JWT into JSON.
pub fn decode_payload(token: &str) -> Result<Value, TokenError> {
    let parts: Vec<&str> = token.split('.').collect();

    if parts.len() != 3 {
        return Err(TokenError::Malformed(parts.len()));
    }

    let payload = PAYLOAD_ENGINE.decode(to_standard_base64(parts[1]))?;

    Ok(serde_json::from_slice(&payload)?)
}

/// Decode JWT claims, requiring a numeric `exp`.
pub fn decode_claims(token: &str) -> Result<TokenClaims, TokenError> {
    let payload = decode_payload(token)?;

    let exp = payload
        .get("exp")
        .and_then(Value::as_f64)
        .ok_or(TokenError::MissingExpiry)?;

    Ok(TokenClaims { exp, payload })
}

/// True when `token` is absent, unreadable, or expired at `now` (seconds).
pub fn is_token_expired_at(token: Option<&str>, now: i64) -> bool {
    let Some(token) = token else {
        return true;
    };

    match decode_claims(token) {
        Ok(claims) => claims.exp <= (now - CLOCK_SKEW_SECS) as f64,
        Err(e) => {
            tracing::debug!(error = %e, "Rejecting unusable session token");
            true
        }
    }
}

/// True when `token` cannot be used for an authenticated call right now.
pub fn is_token_expired(token: Option<&str>) -> bool {
    is_token_expired_at(token, Utc::now().timestamp())
}
