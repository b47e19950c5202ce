use crate::session::StoreError;
use reqwest::StatusCode;
use thiserror::Error;

/// Message carried by the session-expired sentinel.
pub const SESSION_EXPIRED: &str = "TOKEN_EXPIRED";

#[derive(Debug, Error)]
pub enum ApiError {
    /// The stored credential is missing or expired. Local session state has
    /// already been purged and no request was sent.
    #[error("{}", SESSION_EXPIRED)]
    SessionExpired,

    /// Non-success HTTP status. `message` is the body's `message` field when
    /// present, otherwise `HTTP <status>`.
    #[error("{message}")]
    Http { status: StatusCode, message: String },

    /// The server answered with something other than the JSON the caller needs.
    #[error("Unexpected server response")]
    UnexpectedResponse,

    /// A 2xx response whose body reports failure (`success: false`).
    #[error("{0}")]
    Rejected(String),

    #[error("Unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Storage(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    pub(crate) fn http(status: StatusCode, message: Option<&str>) -> Self {
        let message = match message {
            Some(message) if !message.is_empty() => message.to_string(),
            _ => format!("HTTP {}", status.as_u16()),
        };
        ApiError::Http { status, message }
    }

    /// True for the local sentinel and for a server-side 401 complaining
    /// about an expired JWT; callers handle both by sending the user to login.
    pub fn is_session_expired(&self) -> bool {
        match self {
            ApiError::SessionExpired => true,
            ApiError::Http { status, message } => {
                *status == StatusCode::UNAUTHORIZED
                    && message.to_ascii_lowercase().contains("jwt expired")
            }
            _ => false,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            ApiError::Transport(err) => err.status(),
            _ => None,
        }
    }
}
