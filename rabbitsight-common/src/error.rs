use thiserror::Error;

/// Common error type for RabbitSight components.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias using RabbitSight's Error.
pub type Result<T> = std::result::Result<T, Error>;
