//! HTTP health surface built on Actix Web.
//!
//! Exposes the aggregator's records to operators and to the external
//! orchestrator:
//! - `GET /health` returns `{"status": "healthy"|"degraded"|"unhealthy", "components": {...}}`
//! - `GET /health/{name}` returns one component
//! - `GET /events` streams status transitions as Server-Sent Events
//! - `GET /` lists the endpoints

pub use self::server::{HealthServer, HealthServerHandle};
pub use self::types::{ComponentHealth, HealthReport, ServiceIndex};

pub mod actix_error;
pub mod events;
pub mod handlers;
pub mod server;
pub mod types;
