//! MCP Supervisor CLI
//!
//! Launches the backends of a server registry and reports their health.
//!
//! Usage:
//!   mcp-supervisor --config mcp_servers.json validate
//!   mcp-supervisor --config mcp_servers.json launch
//!   mcp-supervisor --config mcp_servers.json run --port 8000

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mcp_supervisor::config::Config;
use mcp_supervisor::{HealthReport, Supervisor, SystemStatus};

#[derive(Parser)]
#[command(name = "mcp-supervisor")]
#[command(about = "Launch MCP servers and integration backends and aggregate their health")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Server registry (JSON or YAML)
    #[arg(short, long, env = "MCP_SUPERVISOR_CONFIG", default_value = "mcp_servers.json", global = true)]
    config: PathBuf,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    /// Increase verbosity (-v info, -vv debug, -vvv trace). Default is warn.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and validate the registry without launching anything
    Validate,
    /// Launch every server, run one health check and print the report
    Launch,
    /// Launch every server, then monitor and serve health until interrupted
    Run {
        /// Override the health server bind address
        #[arg(long)]
        address: Option<String>,

        /// Override the health server port
        #[arg(long)]
        port: Option<u16>,

        /// Do not start the HTTP health server
        #[arg(long)]
        no_server: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Initialize tracing with the given verbosity level
///
/// - 0: warn (default)
/// - 1: info (-v)
/// - 2: debug (-vv)
/// - 3+: trace (-vvv)
fn init_tracing(verbosity: u8, format: LogFormat) {
    let level = match verbosity {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    // RUST_LOG overrides the verbosity flag
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string()));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);

    let config = Config::from_file(&cli.config)
        .with_context(|| format!("failed to load registry {}", cli.config.display()))?;

    match cli.command {
        Commands::Validate => validate(&config),
        Commands::Launch => launch(config).await,
        Commands::Run {
            address,
            port,
            no_server,
        } => run(config, address, port, no_server).await,
    }
}

fn validate(config: &Config) -> Result<ExitCode> {
    for spec in &config.servers {
        println!(
            "{}\t{} {}\t{}",
            spec.name,
            spec.command,
            spec.args.join(" "),
            spec.log_path.display()
        );
    }
    println!("{} servers OK", config.servers.len());
    Ok(ExitCode::SUCCESS)
}

async fn launch(config: Config) -> Result<ExitCode> {
    let grace = config.monitor.startup_grace();
    let mut supervisor = Supervisor::new(config);

    let report = supervisor.launch_all().await;
    let entries = report.entries();
    let failed = report.failed_count();

    tokio::time::sleep(grace).await;
    supervisor.check_all().await;
    let health: HealthReport = supervisor.health_report();

    let output = json!({ "launch": entries, "health": health });
    println!("{}", serde_json::to_string_pretty(&output)?);

    // Launched processes keep running; this command only starts them.
    Ok(if failed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

async fn run(
    mut config: Config,
    address: Option<String>,
    port: Option<u16>,
    no_server: bool,
) -> Result<ExitCode> {
    if address.is_some() || port.is_some() {
        let server = config.health_server.get_or_insert_with(Default::default);
        if let Some(address) = address {
            server.address = address;
        }
        if let Some(port) = port {
            server.port = port;
        }
    }

    let grace = config.monitor.startup_grace();
    let mut supervisor = Supervisor::new(config);

    let report = supervisor.launch_all().await;
    tracing::info!(
        started = report.started_count(),
        failed = report.failed_count(),
        "Launch finished"
    );

    if !no_server {
        let handle = supervisor.start_health_server().await?;
        if let Some(addr) = handle.local_addr() {
            eprintln!("Health server listening on http://{}/health", addr);
        }
    }

    tokio::time::sleep(grace).await;
    supervisor.start_monitor();

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("Shutdown signal received");

    let status = supervisor.summary().status();
    supervisor.shutdown().await?;

    Ok(match status {
        SystemStatus::Unhealthy => ExitCode::FAILURE,
        SystemStatus::Healthy | SystemStatus::Degraded => ExitCode::SUCCESS,
    })
}
