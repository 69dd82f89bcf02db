//! Packet Sentry
//!
//! This is the main entry point for the packet sentry service.
//! It loads configuration, wires the capture pipeline and starts the
//! HTTP control surface.

use std::net::SocketAddr;
use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use anyhow::Context;
use dotenv::dotenv;
use log::{error, info};
use metrics_exporter_prometheus::PrometheusBuilder;
use packet_sentry::api::{self, spawn_alert_collector, AlertLog, ApiState};
use packet_sentry::config;
use packet_sentry::core::{LiveCaptureSource, Pipeline};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    env_logger::init();

    info!("Starting Packet Sentry...");

    // Load configuration
    let config = config::load_config().context("Failed to load configuration")?;
    let config = Arc::new(config);

    if config.metrics.enabled {
        let listen: SocketAddr = config
            .metrics
            .listen
            .parse()
            .with_context(|| format!("Invalid metrics listen address {}", config.metrics.listen))?;
        PrometheusBuilder::new()
            .with_http_listener(listen)
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!("Prometheus exporter listening on {}", listen);
    }

    // Initialize capture pipeline
    let source = Arc::new(LiveCaptureSource::new(&config.capture));
    let mut pipeline = Pipeline::new(source, config.capture.clone(), config.detection.clone());

    let alerts = Arc::new(AlertLog::new(config.alerts.history));
    spawn_alert_collector(Arc::clone(&alerts), pipeline.subscribe());

    if config.capture.autostart {
        match config.capture.interface.as_deref() {
            Some(interface) => pipeline
                .start(interface)
                .await
                .with_context(|| format!("Failed to start capture on {}", interface))?,
            None => error!("capture.autostart is set but no capture.interface is configured"),
        }
    }

    let pipeline = Arc::new(tokio::sync::Mutex::new(pipeline));

    // Create API state
    let state = web::Data::new(ApiState {
        pipeline: Arc::clone(&pipeline),
        alerts,
        config: config.clone(),
    });

    // Start HTTP server
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(api::config)
    })
    .bind((config.server.host.as_str(), config.server.port))?
    .run()
    .await?;

    // Make sure the producer thread is gone before exiting
    let mut pipeline = pipeline.lock().await;
    if pipeline.is_running() {
        pipeline.stop().await?;
    }

    Ok(())
}
