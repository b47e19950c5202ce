//! Session identity (token, role, user id) and its change notifications.
//!
//! Every view that cares about login state subscribes to [`SessionManager`]
//! instead of poking storage keys directly, so expiry and logout are handled
//! in one place.

pub mod store;

use crate::models::Role;
use std::fmt;
use tokio::sync::{Mutex, broadcast};

pub use store::{FileStore, MemoryStore, SessionStore, StoreError};

pub const TOKEN_KEY: &str = "token";
pub const ROLE_KEY: &str = "role";
pub const ID_KEY: &str = "id";
pub const PATIENT_ID_KEY: &str = "patientId";

const SESSION_KEYS: [&str; 4] = [TOKEN_KEY, ROLE_KEY, ID_KEY, PATIENT_ID_KEY];

const EVENT_CAPACITY: usize = 16;

/// A complete session identity triple.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub role: Role,
    pub user_id: String,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &"[REDACTED]")
            .field("role", &self.role)
            .field("user_id", &self.user_id)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Established { role: Role, user_id: String },
    Expired,
    LoggedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearReason {
    Expired,
    LoggedOut,
}

/// Owns the session store. Writes and clears of the triple are serialized
/// behind one lock and applied as a single store mutation.
#[derive(Debug)]
pub struct SessionManager {
    store: Mutex<Box<dyn SessionStore>>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionManager {
    pub fn new(store: impl SessionStore + 'static) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store: Mutex::new(Box::new(store)),
            events,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryStore::new())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// The current session, or `None` unless token, role and id are all set.
    pub async fn get(&self) -> Result<Option<Session>, StoreError> {
        let store = self.store.lock().await;

        let token = store.get(TOKEN_KEY)?;
        let role = store.get(ROLE_KEY)?;
        let user_id = store.get(ID_KEY)?;

        match (token, role, user_id) {
            (Some(token), Some(role), Some(user_id)) => match role.parse::<Role>() {
                Ok(role) => Ok(Some(Session {
                    token,
                    role,
                    user_id,
                })),
                Err(e) => {
                    tracing::warn!(error = %e, "Ignoring session with unknown role");
                    Ok(None)
                }
            },
            (None, None, None) => Ok(None),
            (token, role, user_id) => {
                tracing::warn!(
                    has_token = token.is_some(),
                    has_role = role.is_some(),
                    has_id = user_id.is_some(),
                    "Partial session state in store"
                );
                Ok(None)
            }
        }
    }

    /// The stored bearer token, whether or not the rest of the triple exists.
    pub async fn token(&self) -> Result<Option<String>, StoreError> {
        self.entry(TOKEN_KEY).await
    }

    /// Read a raw storage entry.
    pub async fn entry(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.store.lock().await.get(key)
    }

    pub async fn set(&self, session: Session) -> Result<(), StoreError> {
        {
            let mut store = self.store.lock().await;

            let mut entries = vec![
                (TOKEN_KEY, session.token.as_str()),
                (ROLE_KEY, session.role.as_str()),
                (ID_KEY, session.user_id.as_str()),
            ];
            // A doctor signing in over a patient session must not inherit patientId.
            let mut stale: &[&str] = &[PATIENT_ID_KEY];
            if session.role == Role::Patient {
                entries.push((PATIENT_ID_KEY, session.user_id.as_str()));
                stale = &[];
            }

            store.apply(&entries, stale).await?;
        }

        tracing::info!(role = %session.role, user_id = %session.user_id, "Session established");
        self.notify(SessionEvent::Established {
            role: session.role,
            user_id: session.user_id,
        });

        Ok(())
    }

    pub async fn clear(&self, reason: ClearReason) -> Result<(), StoreError> {
        self.store.lock().await.remove_many(&SESSION_KEYS).await?;
        self.cleared(reason);
        Ok(())
    }

    /// Clear the session only while the stored token is still `expected`.
    ///
    /// Compare and removal happen under one lock, so a session written by a
    /// concurrent login is never wiped by a stale expiry check. Returns
    /// whether the session was cleared.
    pub async fn clear_if_token(
        &self,
        expected: Option<&str>,
        reason: ClearReason,
    ) -> Result<bool, StoreError> {
        {
            let mut store = self.store.lock().await;
            if store.get(TOKEN_KEY)?.as_deref() != expected {
                tracing::debug!("Session replaced concurrently, not clearing");
                return Ok(false);
            }
            store.remove_many(&SESSION_KEYS).await?;
        }

        self.cleared(reason);
        Ok(true)
    }

    fn cleared(&self, reason: ClearReason) {
        let event = match reason {
            ClearReason::Expired => SessionEvent::Expired,
            ClearReason::LoggedOut => SessionEvent::LoggedOut,
        };
        tracing::info!(?reason, "Session cleared");
        self.notify(event);
    }

    fn notify(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
