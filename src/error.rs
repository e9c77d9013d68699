/// Error handling module for MCP Supervisor.
///
/// This module defines the error types used throughout the library.
/// Configuration problems abort loading, launch failures are reported per
/// backend, and probe failures never escape the health aggregator: they are
/// folded into an unhealthy record instead.
///
/// # Example
///
/// ```
/// use mcp_supervisor::error::{Error, Result};
///
/// fn handle_error(result: Result<()>) {
///     match result {
///         Ok(_) => println!("Operation succeeded"),
///         Err(Error::DuplicateServer(name)) => println!("'{}' is declared twice", name),
///         Err(e) if e.is_configuration_error() => println!("Bad registry: {}", e),
///         Err(e) => println!("Other error: {}", e),
///     }
/// }
/// ```
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur in the mcp-supervisor library.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to read or parse the registry source.
    ///
    /// This error occurs when:
    /// - The file cannot be read
    /// - The JSON or YAML is malformed
    /// - A required field such as `command` is missing
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// The registry parsed but contains invalid values.
    ///
    /// This error occurs when:
    /// - A command is empty
    /// - No servers are declared
    /// - Two servers share a log path
    /// - A health probe URL is malformed
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    /// Two registry entries use the same server name.
    #[error("Invalid configuration: duplicate server name '{0}'")]
    DuplicateServer(String),

    /// An eagerly resolved server references an environment variable
    /// that is not set and has no default.
    #[error("Invalid configuration: server '{server}' requires unset environment variable '{var}'")]
    UnresolvedEnv {
        /// Server whose environment references the variable
        server: String,
        /// Name of the missing variable
        var: String,
    },

    /// A backend failed to launch.
    #[error("Launch failed for '{server}': {source}")]
    Launch {
        /// Server that failed to launch
        server: String,
        /// Underlying launch failure
        #[source]
        source: LaunchError,
    },

    /// A live process already exists for this server.
    #[error("Server already running: {0}")]
    AlreadyRunning(String),

    /// Requested server is not part of the registry.
    #[error("Server not found: {0}")]
    ServerNotFound(String),

    /// The HTTP health surface failed to bind or run.
    #[error("Health server error: {0}")]
    HealthServer(String),

    /// A transition notification could not be delivered.
    #[error("Notification error: {0}")]
    Notification(String),

    /// Any other error not covered by the above categories.
    #[error("Other error: {0}")]
    Other(String),
}

impl Error {
    /// Whether this error originates from loading or validating the registry.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Error::ConfigParse(_)
                | Error::ConfigInvalid(_)
                | Error::DuplicateServer(_)
                | Error::UnresolvedEnv { .. }
        )
    }
}

/// Failure to start a single backend process.
///
/// Launch errors are collected per server in a
/// [`LaunchReport`](crate::server::LaunchReport); one failing backend never
/// prevents the others from being launched.
#[derive(Error, Debug)]
pub enum LaunchError {
    /// A lazily resolved environment reference could not be resolved at launch.
    #[error("environment variable '{0}' is not set")]
    UnresolvedEnv(String),

    /// The log file (or its directory) could not be created.
    #[error("cannot open log file {path}: {source}")]
    LogFile {
        /// Log path from the server spec
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The OS refused to spawn the command.
    #[error("cannot spawn '{command}': {source}")]
    Spawn {
        /// Command from the server spec
        command: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

/// Failure observed while probing a backend.
///
/// Probe errors are never returned to callers. The health aggregator turns
/// each one into an unhealthy [`HealthRecord`](crate::server::HealthRecord)
/// whose `detail` is this error's display text.
#[derive(Error, Debug)]
pub enum ProbeError {
    /// The process is no longer running.
    #[error("process exited ({0})")]
    Exited(String),

    /// The process status could not be queried.
    #[error("cannot query process status: {0}")]
    ProcessStatus(String),

    /// The health endpoint answered with a non-2xx status.
    #[error("health endpoint returned HTTP {0}")]
    Status(u16),

    /// The health endpoint could not be reached.
    #[error("health endpoint unreachable: {0}")]
    Request(String),

    /// No answer within the probe timeout.
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
}

/// Result type for mcp-supervisor operations.
pub type Result<T> = std::result::Result<T, Error>;
