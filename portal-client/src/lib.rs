pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod session;
pub mod utils;

use config::Settings;
use error::ApiError;
use services::{ApiGateway, PortalApi};
use session::{FileStore, SessionManager};
use std::sync::Arc;

/// Shared client state: the session manager and the API built on top of it.
#[derive(Debug, Clone)]
pub struct Portal {
    pub session: Arc<SessionManager>,
    pub api: PortalApi,
}

impl Portal {
    pub fn new(session: Arc<SessionManager>, api: PortalApi) -> Self {
        Self { session, api }
    }

    /// Build a portal whose session persists in the configured file.
    pub fn from_settings(settings: &Settings) -> Result<Self, ApiError> {
        let store = FileStore::open(&settings.session.path)?;
        let session = Arc::new(SessionManager::new(store));
        let gateway = ApiGateway::new(&settings.api, session.clone())?;

        Ok(Self::new(session, PortalApi::new(gateway)))
    }
}
