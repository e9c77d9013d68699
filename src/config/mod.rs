//! Configuration module for MCP Supervisor.
//!
//! This module is the server registry: it parses, validates and resolves
//! the declarative list of backends to launch. Registries are JSON or YAML
//! documents with an ordered `mcpServers` map.
//!
//! # Examples
//!
//! Loading a registry from a file:
//!
//! ```no_run
//! use mcp_supervisor::config::Config;
//!
//! let config = Config::from_file("mcp_servers.json").unwrap();
//! println!("Loaded registry with {} servers", config.servers.len());
//! ```
//!
//! Creating a registry programmatically:
//!
//! ```
//! use mcp_supervisor::{Supervisor, config::{Config, ServerSpec}};
//!
//! let config = Config::new(vec![
//!     ServerSpec::new("github", "npx").with_args(["-y", "@modelcontextprotocol/server-github"]),
//!     ServerSpec::new("slack", "npx").with_args(["-y", "@modelcontextprotocol/server-slack"]),
//! ]);
//! let supervisor = Supervisor::new(config);
//! ```
pub mod env;
mod parser;
pub mod validator;

pub use parser::{
    Config, DEFAULT_CHECK_INTERVAL_SECS, DEFAULT_LOG_DIR, DEFAULT_PROBE_TIMEOUT_SECS,
    DEFAULT_STARTUP_GRACE_SECS, DEFAULT_WORKERS, HealthServerConfig, MonitorConfig,
    NotificationConfig, ProbeStrategy, ResolveMode, ServerSpec, SourceFormat,
};
pub use validator::validate_config;
