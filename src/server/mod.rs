/// Server management module for MCP Supervisor.
///
/// This module launches backend processes and tracks their health.
/// All public operations are instrumented with `tracing` spans.
///
/// # Components
///
/// * `launcher` - Non-blocking spawn of one process per server spec
/// * `process` - Handle to a launched process
/// * `probe` - Process-alive and HTTP endpoint liveness probes
/// * `health` - Health aggregation over all launched processes
/// * `monitor` - Periodic polling in long-running mode
///
/// # Examples
///
/// Launching and checking a set of servers:
///
/// ```no_run
/// use mcp_supervisor::config::ServerSpec;
/// use mcp_supervisor::server::{HealthAggregator, ProcessLauncher, summarize};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # async fn run() {
/// let specs = vec![
///     Arc::new(ServerSpec::new("github", "npx").with_args(["-y", "@modelcontextprotocol/server-github"])),
///     Arc::new(ServerSpec::new("slack", "npx").with_args(["-y", "@modelcontextprotocol/server-slack"])),
/// ];
///
/// let report = ProcessLauncher::new().launch_all(&specs);
/// let aggregator = HealthAggregator::new(specs.iter().map(|s| s.name.clone()), Duration::from_secs(5));
///
/// let records = aggregator.check_all(&report.handles()).await;
/// println!("{:?}", summarize(&records));
/// # }
/// ```
pub mod health;
pub mod launcher;
pub mod monitor;
pub mod probe;
mod process;

pub use health::{
    HealthAggregator, HealthRecord, HealthStatus, HealthTransition, OverallStatus, SystemStatus,
    summarize,
};
pub use launcher::{LaunchEntry, LaunchOutcome, LaunchReport, ProcessLauncher};
pub use monitor::{LiveHandles, Monitor, poll_cycle};
pub use process::{LaunchId, ProcessHandle};
