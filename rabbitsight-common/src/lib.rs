//! RabbitSight Common Library
//!
//! This crate provides shared types and utilities for the RabbitSight exporter:
//!
//! - [`metric`] - Mapping tables, descriptors, samples and live gauges
//! - [`document`] - Flattened status documents
//! - [`config`] - Logging configuration
//! - [`error`] - Error types

pub mod config;
pub mod document;
pub mod error;
pub mod metric;

// Re-export commonly used types at the crate root
pub use config::{LogFormat, LoggingConfig};
pub use document::{FieldValue, FlattenedDocument};
pub use error::{Error, Result};
pub use metric::{LiveGauge, MetricDescriptor, MetricKind, MetricSample, MetricSpec};

/// Initialize tracing with the given configuration.
///
/// Supports two output formats:
/// - `LogFormat::Text` (default): Human-readable text format
/// - `LogFormat::Json`: Structured JSON format for log aggregation systems
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
    }

    Ok(())
}
