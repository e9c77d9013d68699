/*!
 # MCP Supervisor

 Launch a registry of MCP servers and integration backends as child
 processes and aggregate their health into one report.

 ## Overview

 MCP Supervisor provides functionality to:
 - Load a declarative server registry (JSON or YAML) with `${VAR}` environment references
 - Launch every backend as an independent child process with its own log file
 - Probe backends concurrently, by process liveness or HTTP health endpoint
 - Summarize health as `healthy`, `degraded` or `unhealthy`
 - Serve the report over HTTP and stream transitions as Server-Sent Events
 - Post failures and recoveries to a chat webhook

 ## Basic Usage

 ```no_run
 use mcp_supervisor::{Supervisor, Result};

 #[tokio::main]
 async fn main() -> Result<()> {
     let mut supervisor = Supervisor::from_config_file("mcp_servers.json")?;

     // Fire-and-forget launch; failures are reported per server
     let report = supervisor.launch_all().await;
     for (spec, error) in report.failures() {
         eprintln!("{} failed to launch: {}", spec.name, error);
     }

     // One health cycle
     supervisor.check_all().await;
     let summary = supervisor.summary();
     println!("{} of {} servers healthy", summary.healthy_count, summary.total);

     supervisor.shutdown().await
 }
 ```

 ## Features

 - **Partial-failure tolerance**: one backend failing to launch or probe never affects the others
 - **Bounded probes**: every probe has its own timeout, so a hung backend cannot stall the report
 - **Ordered registry**: servers keep their declaration order in reports
 - **Observability**: all public operations are instrumented with `tracing`
*/

pub mod config;
pub mod error;
pub mod health_server;
pub mod notify;
pub mod server;

pub use config::{Config, ServerSpec};
pub use error::{Error, LaunchError, ProbeError, Result};
pub use health_server::{HealthReport, HealthServer, HealthServerHandle};
pub use server::{
    HealthAggregator, HealthRecord, HealthStatus, OverallStatus, ProcessHandle, ProcessLauncher,
    SystemStatus,
};

use notify::{Notifier, WebhookNotifier};
use server::{LaunchReport, LiveHandles, Monitor};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Launch and supervise the servers of a registry
///
/// This struct is the main entry point. It owns the registry, the live
/// process handles and the health aggregator.
/// All public methods are instrumented with `tracing` spans.
pub struct Supervisor {
    /// Configuration
    config: Config,
    /// Registry entries shared with process handles
    specs: Vec<Arc<ServerSpec>>,
    /// Process launcher
    launcher: ProcessLauncher,
    /// Health records
    aggregator: Arc<HealthAggregator>,
    /// Processes believed to be running
    handles: LiveHandles,
    /// Result of the last `launch_all`
    launch_report: Option<LaunchReport>,
    /// Periodic health polling (if started)
    monitor: Option<Monitor>,
    /// HTTP health surface (if running)
    health_server: Option<HealthServerHandle>,
}

impl Supervisor {
    /// Create a supervisor from a registry file path
    #[tracing::instrument(skip(path), fields(config_path = ?path.as_ref()))]
    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self> {
        tracing::info!("Loading configuration from file");
        let config = Config::from_file(path)?;
        Ok(Self::new(config))
    }

    /// Create a supervisor from a JSON registry string
    #[tracing::instrument(skip(config))]
    pub fn from_config_str(config: &str) -> Result<Self> {
        tracing::info!("Loading configuration from string");
        let config = Config::parse_from_str(config)?;
        Ok(Self::new(config))
    }

    /// Create a supervisor from a configuration.
    ///
    /// A webhook notifier is installed when `notifications` is configured.
    #[tracing::instrument(skip(config), fields(num_servers = config.servers.len()))]
    pub fn new(config: Config) -> Self {
        let notifier = config
            .notifications
            .as_ref()
            .map(|n| Arc::new(WebhookNotifier::from_config(n)) as Arc<dyn Notifier>);
        Self::with_parts(config, ProcessLauncher::new(), notifier)
    }

    /// Create a supervisor with an explicit launcher and notifier
    pub fn with_parts(
        config: Config,
        launcher: ProcessLauncher,
        notifier: Option<Arc<dyn Notifier>>,
    ) -> Self {
        tracing::info!("Creating new Supervisor");
        let specs: Vec<Arc<ServerSpec>> = config.servers.iter().cloned().map(Arc::new).collect();

        let mut aggregator = HealthAggregator::new(
            specs.iter().map(|spec| spec.name.clone()),
            config.monitor.probe_timeout(),
        );
        if let Some(notifier) = notifier {
            aggregator = aggregator.with_notifier(notifier);
        }

        Self {
            config,
            specs,
            launcher,
            aggregator: Arc::new(aggregator),
            handles: Arc::new(Mutex::new(Vec::new())),
            launch_report: None,
            monitor: None,
            health_server: None,
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the health aggregator
    pub fn aggregator(&self) -> &Arc<HealthAggregator> {
        &self.aggregator
    }

    /// Launch every server of the registry.
    ///
    /// Launches are independent: servers that fail are recorded as unhealthy
    /// with a `launch failed` detail and the rest keep running. Calling this
    /// again returns the first report without relaunching anything.
    #[tracing::instrument(skip(self))]
    pub async fn launch_all(&mut self) -> &LaunchReport {
        if self.launch_report.is_some() {
            tracing::warn!("Servers already launched, returning previous report");
        } else {
            let report = self.launcher.launch_all(&self.specs);

            for (spec, error) in report.failures() {
                self.aggregator.record_launch_failure(&spec.name, error).await;
            }
            self.handles.lock().await.extend(report.handles());

            self.launch_report = Some(report);
        }

        self.launch_report.get_or_insert_with(LaunchReport::default)
    }

    /// Launch a single server by name.
    ///
    /// Fails with [`Error::AlreadyRunning`] while a live process exists for
    /// the server; handles of processes that already exited are replaced.
    #[tracing::instrument(skip(self), fields(server_name = %name))]
    pub async fn launch_server(&mut self, name: &str) -> Result<ProcessHandle> {
        let spec = self
            .specs
            .iter()
            .find(|spec| spec.name == name)
            .cloned()
            .ok_or_else(|| {
                tracing::error!("Configuration not found for server");
                Error::ServerNotFound(name.to_string())
            })?;

        let mut handles = self.handles.lock().await;
        let mut exited = Vec::new();
        for handle in handles.iter().filter(|h| h.name() == name) {
            match handle.try_exit_status().await {
                Ok(Some(_)) => exited.push(handle.id()),
                // Unknown status counts as running: relaunching would truncate its log.
                Ok(None) | Err(_) => {
                    tracing::warn!(pid = handle.pid(), "Server already running");
                    return Err(Error::AlreadyRunning(name.to_string()));
                }
            }
        }
        handles.retain(|h| !exited.contains(&h.id()));

        match self.launcher.launch(spec) {
            Ok(handle) => {
                handles.push(handle.clone());
                Ok(handle)
            }
            Err(source) => {
                drop(handles);
                self.aggregator.record_launch_failure(name, &source).await;
                Err(Error::Launch {
                    server: name.to_string(),
                    source,
                })
            }
        }
    }

    /// Report of the last `launch_all`, if any
    pub fn launch_report(&self) -> Option<&LaunchReport> {
        self.launch_report.as_ref()
    }

    /// Handles of processes believed to be running
    pub async fn live_handles(&self) -> Vec<ProcessHandle> {
        self.handles.lock().await.clone()
    }

    /// Run one health cycle over the live processes.
    ///
    /// Returns the records of the processes probed in this cycle.
    #[tracing::instrument(skip(self))]
    pub async fn check_all(&self) -> Vec<HealthRecord> {
        server::poll_cycle(&self.aggregator, &self.handles).await
    }

    /// All health records in registry order
    pub fn health_records(&self) -> Vec<HealthRecord> {
        self.aggregator.records()
    }

    /// Counts over all health records
    pub fn summary(&self) -> OverallStatus {
        self.aggregator.summary()
    }

    /// Combined report as served on `GET /health`
    pub fn health_report(&self) -> HealthReport {
        HealthReport::from_records(&self.aggregator.records())
    }

    /// Start periodic health polling at `monitor.intervalSecs`
    #[tracing::instrument(skip(self))]
    pub fn start_monitor(&mut self) {
        let monitor = self.monitor.get_or_insert_with(|| {
            Monitor::new(
                Arc::clone(&self.aggregator),
                Arc::clone(&self.handles),
                self.config.monitor.check_interval(),
            )
        });
        monitor.start();
    }

    /// Start the HTTP health surface.
    ///
    /// Uses `healthServer` from the configuration, or defaults when absent.
    #[tracing::instrument(skip(self))]
    pub async fn start_health_server(&mut self) -> Result<&HealthServerHandle> {
        if self.health_server.is_none() {
            let config = self.config.health_server.clone().unwrap_or_default();
            let handle = HealthServer::start(Arc::clone(&self.aggregator), config).await?;
            self.health_server = Some(handle);
        }

        self.health_server
            .as_ref()
            .ok_or_else(|| Error::HealthServer("health server not running".to_string()))
    }

    /// Get the running health server handle, if any
    pub fn health_server_handle(&self) -> Option<&HealthServerHandle> {
        self.health_server.as_ref()
    }

    /// Stop monitoring, the health server, and every live process.
    ///
    /// All processes are stopped even if some fail; the errors are combined.
    #[tracing::instrument(skip(self))]
    pub async fn shutdown(&mut self) -> Result<()> {
        tracing::info!("Shutting down supervisor");

        if let Some(mut monitor) = self.monitor.take() {
            monitor.stop();
        }

        if let Some(health_server) = self.health_server.take() {
            if let Err(e) = health_server.shutdown().await {
                tracing::warn!(error = %e, "Error shutting down health server");
            }
        }

        let handles: Vec<ProcessHandle> = self.handles.lock().await.drain(..).collect();
        let mut errors = Vec::new();

        for handle in handles {
            if let Err(e) = handle.stop().await {
                tracing::error!(server_name = %handle.name(), error = %e, "Failed to stop server");
                errors.push(format!("{}: {}", handle.name(), e));
            }
        }

        if errors.is_empty() {
            tracing::info!("All servers stopped");
            Ok(())
        } else {
            tracing::warn!(error_count = errors.len(), "Some servers failed to stop");
            Err(Error::Other(format!(
                "Failed to stop servers: {}",
                errors.join("; ")
            )))
        }
    }
}
