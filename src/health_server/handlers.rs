//! HTTP request handlers for the health server.
//!
//! - `GET /` service index
//! - `GET /health` combined report
//! - `GET /health/{name}` one component
//! - `GET /events` SSE stream of health transitions

use crate::error::{Error, Result};
use crate::health_server::events;
use crate::health_server::types::{ComponentHealth, HealthReport, ServiceIndex};
use crate::server::{HealthAggregator, SystemStatus};

use actix_web::{
    HttpResponse,
    web::{self, Data},
};
use std::collections::BTreeMap;
use tokio::sync::broadcast::error::RecvError;

/// Register all health routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index))
        .route("/health", web::get().to(health))
        .route("/health/{name}", web::get().to(component_health))
        .route("/events", web::get().to(health_events));
}

/// Service index listing the available endpoints
pub async fn index() -> HttpResponse {
    let endpoints = BTreeMap::from([
        ("health".to_string(), "/health".to_string()),
        ("component".to_string(), "/health/{name}".to_string()),
        ("events".to_string(), "/events".to_string()),
    ]);

    HttpResponse::Ok().json(ServiceIndex {
        service: env!("CARGO_PKG_NAME").to_string(),
        status: "running".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        endpoints,
    })
}

/// Combined health report.
///
/// Answers 503 when the system is unhealthy so that load balancers and
/// container runtimes can act on the status code alone.
pub async fn health(aggregator: Data<HealthAggregator>) -> HttpResponse {
    let report = HealthReport::from_records(&aggregator.records());
    tracing::debug!(status = %report.status, "Serving health report");

    match report.status {
        SystemStatus::Unhealthy => HttpResponse::ServiceUnavailable().json(report),
        SystemStatus::Healthy | SystemStatus::Degraded => HttpResponse::Ok().json(report),
    }
}

/// Health of a single server
pub async fn component_health(
    aggregator: Data<HealthAggregator>,
    name: web::Path<String>,
) -> Result<HttpResponse> {
    let name = name.into_inner();
    let record = aggregator
        .record(&name)
        .ok_or_else(|| Error::ServerNotFound(name))?;

    Ok(HttpResponse::Ok().json(ComponentHealth::from(&record)))
}

/// SSE stream: one snapshot on connect, then every transition
pub async fn health_events(aggregator: Data<HealthAggregator>) -> HttpResponse {
    let mut receiver = aggregator.subscribe();
    let snapshot = events::format_snapshot(&HealthReport::from_records(&aggregator.records()));
    tracing::debug!("Client subscribed to health events");

    let stream = async_stream::stream! {
        if let Some(bytes) = snapshot {
            yield Ok::<_, actix_web::Error>(bytes);
        }

        loop {
            match receiver.recv().await {
                Ok(transition) => {
                    if let Some(bytes) = events::format_transition(&transition) {
                        yield Ok::<_, actix_web::Error>(bytes);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Health event subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    HttpResponse::Ok()
        .append_header(("Content-Type", "text/event-stream"))
        .append_header(("Cache-Control", "no-cache"))
        .append_header(("Connection", "keep-alive"))
        .streaming(stream)
}
