use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Failed to resolve configuration directory: {0}")]
    ConfigDirectory(#[from] std::io::Error),

    #[error("Telemetry error: {0}")]
    Telemetry(String),
}

impl From<tracing_subscriber::util::TryInitError> for CoreError {
    fn from(err: tracing_subscriber::util::TryInitError) -> Self {
        CoreError::Telemetry(err.to_string())
    }
}
