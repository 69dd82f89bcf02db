//! API endpoints for the packet sentry.
//!
//! This module provides the HTTP control surface: starting and stopping
//! capture, setting the packet filter, and reading statistics and alerts.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, ResponseError};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use crate::core::{list_interfaces, CaptureError, Pipeline, PipelineEvent};
use crate::models::{AlertEvent, Config, FilterSpec};

/// Errors returned by the control surface
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error("No interface given and none configured")]
    MissingInterface,
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Capture(CaptureError::AlreadyRunning | CaptureError::NotRunning) => StatusCode::CONFLICT,
            ApiError::Capture(CaptureError::InterfaceNotFound(_) | CaptureError::UnsupportedChannel(_)) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::MissingInterface => StatusCode::BAD_REQUEST,
            ApiError::Capture(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.to_string(),
        })
    }
}

/// Bounded log of recent alerts, newest last
#[derive(Debug)]
pub struct AlertLog {
    alerts: Mutex<VecDeque<AlertEvent>>,
    capacity: usize,
}

impl AlertLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            alerts: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&self, alert: AlertEvent) {
        let mut alerts = self.alerts.lock().unwrap_or_else(PoisonError::into_inner);
        if alerts.len() >= self.capacity {
            alerts.pop_front();
        }
        alerts.push_back(alert);
    }

    pub fn recent(&self) -> Vec<AlertEvent> {
        let alerts = self.alerts.lock().unwrap_or_else(PoisonError::into_inner);
        alerts.iter().cloned().collect()
    }
}

/// Feed alerts from the pipeline into `log` until the event channel closes
pub fn spawn_alert_collector(
    log: Arc<AlertLog>,
    mut events: broadcast::Receiver<PipelineEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(PipelineEvent::Alert(alert)) => log.push(alert),
                Ok(PipelineEvent::SessionEnded(end)) => info!("Capture session ended: {:?}", end),
                Ok(PipelineEvent::PacketsReceived(_)) => {}
                Err(RecvError::Lagged(skipped)) => warn!("Alert collector lagged, {} events skipped", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    })
}

pub struct ApiState {
    pub pipeline: Arc<tokio::sync::Mutex<Pipeline>>,
    pub alerts: Arc<AlertLog>,
    pub config: Arc<Config>,
}

/// API configuration function for Actix-web
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(web::resource("/health").route(web::get().to(health_check)))
            .service(web::resource("/session").route(web::get().to(session_state)))
            .service(web::resource("/capture/start").route(web::post().to(start_capture)))
            .service(web::resource("/capture/stop").route(web::post().to(stop_capture)))
            .service(
                web::resource("/filter")
                    .route(web::get().to(get_filter))
                    .route(web::put().to(set_filter)),
            )
            .service(web::resource("/filter/options").route(web::get().to(filter_options)))
            .service(web::resource("/stats").route(web::get().to(stats)))
            .service(web::resource("/alerts").route(web::get().to(alerts)))
            .service(web::resource("/interfaces").route(web::get().to(interfaces))),
    );
}

/// Health check endpoint response
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Capture start request
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StartCaptureRequest {
    /// Interface to capture on; the configured one when absent
    pub interface: Option<String>,
}

/// Health check endpoint
async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn session_state(state: web::Data<ApiState>) -> HttpResponse {
    let pipeline = state.pipeline.lock().await;
    HttpResponse::Ok().json(pipeline.state().await)
}

async fn start_capture(
    state: web::Data<ApiState>,
    req: Option<web::Json<StartCaptureRequest>>,
) -> Result<HttpResponse, ApiError> {
    let interface = req
        .and_then(|req| req.into_inner().interface)
        .or_else(|| state.config.capture.interface.clone())
        .ok_or(ApiError::MissingInterface)?;

    let mut pipeline = state.pipeline.lock().await;
    pipeline.start(&interface).await?;
    Ok(HttpResponse::Ok().json(pipeline.state().await))
}

async fn stop_capture(state: web::Data<ApiState>) -> Result<HttpResponse, ApiError> {
    let mut pipeline = state.pipeline.lock().await;
    pipeline.stop().await?;
    Ok(HttpResponse::Ok().json(pipeline.state().await))
}

async fn get_filter(state: web::Data<ApiState>) -> HttpResponse {
    let pipeline = state.pipeline.lock().await;
    HttpResponse::Ok().json(pipeline.filter().await)
}

async fn set_filter(state: web::Data<ApiState>, spec: web::Json<FilterSpec>) -> HttpResponse {
    let spec = spec.into_inner();
    let pipeline = state.pipeline.lock().await;
    pipeline.set_filter(spec.clone()).await;
    HttpResponse::Ok().json(spec)
}

async fn filter_options(state: web::Data<ApiState>) -> HttpResponse {
    let pipeline = state.pipeline.lock().await;
    HttpResponse::Ok().json(pipeline.observed_values().await)
}

async fn stats(state: web::Data<ApiState>) -> HttpResponse {
    let pipeline = state.pipeline.lock().await;
    HttpResponse::Ok().json(pipeline.stats().await)
}

async fn alerts(state: web::Data<ApiState>) -> HttpResponse {
    HttpResponse::Ok().json(state.alerts.recent())
}

async fn interfaces() -> HttpResponse {
    let names = web::block(list_interfaces).await.unwrap_or_default();
    HttpResponse::Ok().json(names)
}
