//! Prometheus exporter for the RabbitMQ management API.
//!
//! Every request to the metrics endpoint runs one scrape: each registered
//! collector fetches its status document from the management API, updates
//! its gauges and reports the samples, which are rendered in the Prometheus
//! text format.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │ Management API  │────>│   Collectors    │────>│   HTTP Server   │
//! │ (/api/overview) │     │ (via Scraper)   │     │   (/metrics)    │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```bash
//! rabbitsight-exporter --config config.json5
//! ```
//!
//! # Configuration
//!
//! See [`config::ExporterConfig`] for configuration options.

pub mod collector;
pub mod config;
pub mod exposition;
pub mod http;
pub mod overview;
pub mod registry;
pub mod scrape;
pub mod source;

pub use collector::{Collector, CollectorError, TableCollector};
pub use config::ExporterConfig;
pub use http::HttpServer;
pub use registry::{CollectorRegistry, RegistryError};
pub use scrape::{ScrapeError, ScrapeReport, ScrapeStats, Scraper, SharedScraper};
pub use source::{DataSource, FetchError, ManagementApiSource};
