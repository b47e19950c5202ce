//! Shared helpers for the portal client integration tests.

#![allow(dead_code)]

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use portal_client::config::ApiSettings;
use portal_client::models::Role;
use portal_client::services::{ApiGateway, PortalApi};
use portal_client::session::{Session, SessionManager};
use serde_json::json;
use std::sync::Arc;
use wiremock::MockServer;

/// Unsigned JWT whose payload carries the given `exp`.
pub fn token_with_exp(exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(json!({ "sub": "u1", "exp": exp }).to_string());
    format!("{}.{}.signature", header, payload)
}

pub fn valid_token() -> String {
    token_with_exp(chrono::Utc::now().timestamp() + 3600)
}

pub fn expired_token() -> String {
    token_with_exp(chrono::Utc::now().timestamp() - 60)
}

pub fn gateway(server: &MockServer) -> ApiGateway {
    let settings = ApiSettings {
        base_url: server.uri(),
        timeout_secs: 5,
    };
    ApiGateway::new(&settings, Arc::new(SessionManager::in_memory()))
        .expect("Failed to build gateway")
}

pub fn api(server: &MockServer) -> PortalApi {
    PortalApi::new(gateway(server))
}

pub async fn sign_in(session: &SessionManager, token: String, role: Role, user_id: &str) {
    session
        .set(Session {
            token,
            role,
            user_id: user_id.to_string(),
        })
        .await
        .expect("Failed to store session");
}

pub async fn request_count(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .map(|requests| requests.len())
        .unwrap_or_default()
}
