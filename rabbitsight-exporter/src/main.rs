//! Prometheus exporter for the RabbitMQ management API.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};

use rabbitsight_exporter::{
    CollectorRegistry, ExporterConfig, HttpServer, ManagementApiSource, Scraper,
};

/// Prometheus exporter for RabbitMQ.
#[derive(Parser, Debug)]
#[command(name = "rabbitsight-exporter")]
#[command(about = "Export RabbitMQ management API statistics as Prometheus metrics")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long)]
    config: Option<String>,

    /// HTTP listen address (overrides config).
    #[arg(long)]
    listen: Option<String>,

    /// Management API base URL (overrides config).
    #[arg(long)]
    url: Option<String>,

    /// Log level (trace, debug, info, warn, error). Overrides config.
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        ExporterConfig::load_from_file(config_path)?
    } else {
        ExporterConfig::default()
    };

    if let Some(listen) = args.listen {
        config.prometheus.listen = listen;
    }
    if let Some(url) = args.url {
        config.rabbitmq.url = url;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    config.validate()?;

    rabbitsight_common::init_tracing(&config.logging)?;

    info!(url = %config.rabbitmq.url, "Starting RabbitSight exporter");

    let registry = CollectorRegistry::from_config(&config)?;
    info!(
        collectors = ?registry.names().collect::<Vec<_>>(),
        "Collectors registered"
    );

    let source = Arc::new(ManagementApiSource::new(&config.rabbitmq)?);
    let scraper = Arc::new(Scraper::new(
        registry,
        source,
        Duration::from_secs(config.collectors.scrape_timeout_secs),
    ));

    let listen_addr = config
        .prometheus
        .listen
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid listen address: {}", e))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let http_server = HttpServer::new(scraper.clone(), listen_addr, config.prometheus.clone());
    let mut http_task = tokio::spawn(async move { http_server.run(shutdown_rx).await });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        result = terminate() => {
            result?;
            info!("Received SIGTERM, shutting down...");
        }
        joined = &mut http_task => {
            // The server only returns early when it failed to start.
            match joined {
                Ok(Err(e)) => error!("HTTP server error: {}", e),
                Err(e) => error!("HTTP server task failed: {}", e),
                Ok(Ok(())) => {}
            }
            return Err(anyhow::anyhow!("HTTP server exited unexpectedly"));
        }
    }

    shutdown_tx.send(true)?;

    match tokio::time::timeout(Duration::from_secs(5), http_task).await {
        Ok(Ok(Err(e))) => error!("HTTP server error: {}", e),
        Err(_) => error!("HTTP server did not stop in time"),
        _ => {}
    }

    let stats = scraper.stats();
    info!(
        scrapes_total = stats.scrapes_total,
        scrapes_failed = stats.scrapes_failed,
        collector_failures = stats.collector_failures_total,
        "Final statistics"
    );

    info!("Exporter stopped");
    Ok(())
}

#[cfg(unix)]
async fn terminate() -> std::io::Result<()> {
    let mut sigterm =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    sigterm.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn terminate() -> std::io::Result<()> {
    std::future::pending::<()>().await;
    Ok(())
}
