//! portal-core: Shared infrastructure for care portal clients.
pub mod config;
pub mod error;
pub mod observability;

pub use error::CoreError;
pub use tracing;
