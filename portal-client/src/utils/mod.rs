pub mod jwt;

pub use jwt::{CLOCK_SKEW_SECS, TokenClaims, TokenError, decode_claims, is_token_expired};
