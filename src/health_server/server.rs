//! Actix Web server hosting the health routes.

use crate::config::{DEFAULT_WORKERS, HealthServerConfig};
use crate::error::{Error, Result};
use crate::health_server::handlers;
use crate::server::HealthAggregator;

use actix_cors::Cors;
use actix_web::dev::ServerHandle;
use actix_web::{App, HttpServer, middleware, web::Data};
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Handle for controlling a running health server
#[derive(Clone)]
pub struct HealthServerHandle {
    /// Actix server handle
    server: ServerHandle,
    /// Server task
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
    /// Addresses actually bound
    addrs: Vec<SocketAddr>,
    /// Configuration the server was started with
    config: HealthServerConfig,
}

impl HealthServerHandle {
    /// Address the server listens on. With port `0` this is the port the OS picked.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.addrs.first().copied()
    }

    /// Get the server configuration
    pub fn config(&self) -> &HealthServerConfig {
        &self.config
    }

    /// Stop accepting connections and wait for the server task
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Stopping health server");
        self.server.stop(true).await;

        let mut task = self.task.lock().await;
        if let Some(handle) = task.take() {
            match tokio::time::timeout(Duration::from_secs(5), handle).await {
                Ok(Err(e)) => tracing::warn!("Error while joining health server task: {}", e),
                Ok(Ok(())) => {}
                Err(_) => tracing::warn!("Timeout waiting for health server task to finish"),
            }
        }

        Ok(())
    }
}

/// HTTP surface over a [`HealthAggregator`]
pub struct HealthServer;

impl HealthServer {
    /// Bind and start serving in a background task
    #[tracing::instrument(skip(aggregator, config), fields(address = %config.address, port = config.port))]
    pub async fn start(
        aggregator: Arc<HealthAggregator>,
        config: HealthServerConfig,
    ) -> Result<HealthServerHandle> {
        let addr_str = format!("{}:{}", config.address, config.port);
        let addr = addr_str
            .to_socket_addrs()
            .map_err(|e| Error::HealthServer(format!("Failed to parse socket address: {}", e)))?
            .next()
            .ok_or_else(|| {
                Error::HealthServer(format!("Could not parse socket address: {}", addr_str))
            })?;

        let aggregator = Data::from(aggregator);

        let workers = config.workers.unwrap_or(DEFAULT_WORKERS);
        tracing::info!(workers = workers, "Setting number of Actix Web workers");

        let server = HttpServer::new(move || {
            let cors = Cors::default()
                .allow_any_origin()
                .allowed_methods(vec!["GET"])
                .allow_any_header()
                .max_age(3600);

            App::new()
                .wrap(middleware::Logger::default())
                .wrap(cors)
                .app_data(aggregator.clone())
                .configure(handlers::configure)
        })
        .workers(workers)
        .bind(addr)
        .map_err(|e| Error::HealthServer(format!("Failed to bind {}: {}", addr, e)))?;

        let addrs = server.addrs();
        let server = server.run();
        let server_handle = server.handle();

        let task = tokio::spawn(async move {
            if let Err(e) = server.await {
                tracing::error!(error = %e, "Health server error");
            }
            tracing::info!("Health server shut down");
        });

        tracing::info!(addrs = ?addrs, "Health server started");

        Ok(HealthServerHandle {
            server: server_handle,
            task: Arc::new(Mutex::new(Some(task))),
            addrs,
            config,
        })
    }
}
