use crate::config::env;
use crate::config::validator::validate_config;
use crate::error::{Error, Result};
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory for backend log files when neither `logDir` nor `logPath` is given.
pub const DEFAULT_LOG_DIR: &str = "logs";
/// Per-probe timeout used when neither the spec nor the monitor sets one.
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;
/// Interval between two monitor poll cycles.
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 30;
/// Delay between launching and the first health cycle in one-shot mode.
pub const DEFAULT_STARTUP_GRACE_SECS: u64 = 2;
/// Actix workers for the health server.
pub const DEFAULT_WORKERS: usize = 2;

/// When the `${VAR}` references of a server's environment are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolveMode {
    /// Resolved while loading the registry; a missing variable fails the load.
    #[default]
    Eager,
    /// Resolved when the server is launched; a missing variable fails that launch only.
    Lazy,
}

/// How the health aggregator decides whether a backend is alive.
///
/// ```json
/// { "type": "process" }
/// { "type": "http", "url": "http://127.0.0.1:8001/health", "timeoutSecs": 3 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProbeStrategy {
    /// The backend is healthy while its OS process is running.
    #[default]
    Process,
    /// The backend is healthy while `url` answers 2xx within the timeout.
    Http {
        /// Health endpoint to GET
        url: String,
        /// Overrides the monitor's probe timeout for this server
        #[serde(
            default,
            rename = "timeoutSecs",
            skip_serializing_if = "Option::is_none"
        )]
        timeout_secs: Option<u64>,
    },
}

/// Declarative description of how to launch one backend.
///
/// Specs are read from the `mcpServers` map of the registry; the map key
/// becomes [`ServerSpec::name`].
///
/// # Examples
///
/// ```
/// use mcp_supervisor::config::{ProbeStrategy, ServerSpec};
///
/// let spec = ServerSpec::new("snowflake", "python")
///     .with_args(["-m", "snowflake_mcp"])
///     .with_env("SNOWFLAKE_WAREHOUSE", "TABLEAU_CONNECT")
///     .with_health(ProbeStrategy::Http {
///         url: "http://127.0.0.1:8001/health".to_string(),
///         timeout_secs: None,
///     });
///
/// assert_eq!(spec.name, "snowflake");
/// assert_eq!(spec.log_path.to_str(), Some("logs/snowflake.log"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSpec {
    /// Unique server name, taken from the registry key.
    #[serde(skip)]
    pub name: String,

    /// Command to execute. Either an absolute path or a command on `PATH`.
    pub command: String,

    /// Command-line arguments, in order.
    #[serde(default)]
    pub args: Vec<String>,

    /// Environment overlaid on the supervisor's own environment.
    /// Values may reference variables as `${NAME}` or `${NAME:-default}`.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// File receiving the backend's stdout and stderr.
    #[serde(default, skip_serializing_if = "is_empty_path")]
    pub log_path: PathBuf,

    /// Working directory of the child; inherits the supervisor's when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,

    /// When environment references are resolved.
    #[serde(default)]
    pub resolve: ResolveMode,

    /// Liveness probe.
    #[serde(default)]
    pub health: ProbeStrategy,
}

fn is_empty_path(path: &Path) -> bool {
    path.as_os_str().is_empty()
}

impl ServerSpec {
    /// Create a spec with no arguments, no environment and a log file under
    /// [`DEFAULT_LOG_DIR`].
    ///
    /// ```
    /// use mcp_supervisor::config::{ProbeStrategy, ResolveMode, ServerSpec};
    /// use std::time::Duration;
    ///
    /// let spec = ServerSpec::new("foundry", "node")
    ///     .with_args(["dist/server.js", "--port", "8931"])
    ///     .with_env("FOUNDRY_TOKEN", "${FOUNDRY_TOKEN}")
    ///     .with_log_path("logs/foundry.log")
    ///     .with_cwd("servers/foundry")
    ///     .with_resolve(ResolveMode::Lazy)
    ///     .with_health(ProbeStrategy::Http {
    ///         url: "http://127.0.0.1:8931/health".to_string(),
    ///         timeout_secs: Some(2),
    ///     });
    ///
    /// assert_eq!(spec.args, ["dist/server.js", "--port", "8931"]);
    /// assert_eq!(spec.env["FOUNDRY_TOKEN"], "${FOUNDRY_TOKEN}");
    /// assert_eq!(spec.resolve, ResolveMode::Lazy);
    /// assert_eq!(spec.probe_timeout(Duration::from_secs(5)), Duration::from_secs(2));
    /// ```
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        let name = name.into();
        let log_path = default_log_path(Path::new(DEFAULT_LOG_DIR), &name);
        Self {
            name,
            command: command.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            log_path,
            cwd: None,
            resolve: ResolveMode::default(),
            health: ProbeStrategy::default(),
        }
    }

    /// Replace the argument list
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Add one environment variable; values may contain `${VAR}` references
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Write stdout and stderr to `path` instead of the default log file
    pub fn with_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = path.into();
        self
    }

    /// Run the process in `cwd`
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Choose when `${VAR}` references in `env` are expanded
    pub fn with_resolve(mut self, resolve: ResolveMode) -> Self {
        self.resolve = resolve;
        self
    }

    /// Choose how the backend is probed
    pub fn with_health(mut self, health: ProbeStrategy) -> Self {
        self.health = health;
        self
    }

    /// Timeout for this server's probe, falling back to `default`.
    pub fn probe_timeout(&self, default: Duration) -> Duration {
        match &self.health {
            ProbeStrategy::Http {
                timeout_secs: Some(secs),
                ..
            } => Duration::from_secs(*secs),
            _ => default,
        }
    }
}

fn default_log_path(log_dir: &Path, name: &str) -> PathBuf {
    log_dir.join(format!("{}.log", name))
}

/// Health polling settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorConfig {
    /// Seconds between two poll cycles.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Upper bound for any single probe.
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    /// Seconds to wait after launching before the first cycle of `launch`.
    #[serde(default = "default_startup_grace_secs")]
    pub startup_grace_secs: u64,
}

fn default_interval_secs() -> u64 {
    DEFAULT_CHECK_INTERVAL_SECS
}

fn default_probe_timeout_secs() -> u64 {
    DEFAULT_PROBE_TIMEOUT_SECS
}

fn default_startup_grace_secs() -> u64 {
    DEFAULT_STARTUP_GRACE_SECS
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_CHECK_INTERVAL_SECS,
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT_SECS,
            startup_grace_secs: DEFAULT_STARTUP_GRACE_SECS,
        }
    }
}

impl MonitorConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn startup_grace(&self) -> Duration {
        Duration::from_secs(self.startup_grace_secs)
    }
}

/// Configuration for the HTTP health surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthServerConfig {
    /// Address to bind to.
    #[serde(default = "default_address")]
    pub address: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Number of Actix workers; [`DEFAULT_WORKERS`] when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
}

fn default_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for HealthServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
            workers: None,
        }
    }
}

/// Webhook receiving health transitions (Slack incoming webhook, Zapier catch hook, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationConfig {
    /// URL the transition payload is POSTed to. May reference `${VAR}`.
    pub webhook_url: String,
    /// Request timeout in seconds.
    #[serde(default = "default_probe_timeout_secs")]
    pub timeout_secs: u64,
}

/// Format of a registry source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Json,
    Yaml,
}

impl SourceFormat {
    /// `.yaml` and `.yml` files are YAML, everything else JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => SourceFormat::Yaml,
            _ => SourceFormat::Json,
        }
    }
}

/// The server registry and supervisor settings.
///
/// # JSON Schema
///
/// ```json
/// {
///   "logDir": "logs",
///   "mcpServers": {
///     "snowflake": {
///       "command": "python",
///       "args": ["-m", "snowflake_mcp"],
///       "env": { "SNOWFLAKE_PASSWORD": "${SNOWFLAKE_PASSWORD}" },
///       "health": { "type": "http", "url": "http://127.0.0.1:8001/health" }
///     },
///     "slack": {
///       "command": "npx",
///       "args": ["-y", "@modelcontextprotocol/server-slack"],
///       "env": { "SLACK_BOT_TOKEN": "${SLACK_BOT_TOKEN}" },
///       "resolve": "lazy"
///     }
///   },
///   "monitor": { "intervalSecs": 30, "probeTimeoutSecs": 5 },
///   "healthServer": { "address": "0.0.0.0", "port": 8000 }
/// }
/// ```
///
/// Servers keep their declaration order.
///
/// # Examples
///
/// ```no_run
/// use mcp_supervisor::config::Config;
///
/// let config = Config::from_file("mcp_servers.json").unwrap();
/// for spec in &config.servers {
///     println!("{} -> {}", spec.name, spec.log_path.display());
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Directory for log files of servers without an explicit `logPath`.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Servers in declaration order.
    #[serde(
        rename = "mcpServers",
        deserialize_with = "deserialize_servers",
        serialize_with = "serialize_servers"
    )]
    pub servers: Vec<ServerSpec>,

    /// Health polling settings.
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// HTTP health surface; not started when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_server: Option<HealthServerConfig>,

    /// Transition webhook; disabled when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notifications: Option<NotificationConfig>,
}

fn default_log_dir() -> PathBuf {
    PathBuf::from(DEFAULT_LOG_DIR)
}

impl Config {
    /// Build a configuration from specs with default settings.
    pub fn new(servers: Vec<ServerSpec>) -> Self {
        Self {
            log_dir: default_log_dir(),
            servers,
            monitor: MonitorConfig::default(),
            health_server: None,
            notifications: None,
        }
    }

    /// Loads a registry from a file path.
    ///
    /// The format is picked from the extension (see [`SourceFormat::from_path`]).
    ///
    /// # Errors
    ///
    /// Returns a configuration error if:
    /// * The file cannot be read
    /// * The contents are not valid JSON/YAML or miss required fields
    /// * Validation fails (duplicate names, empty command, ...)
    /// * An eager server references an unset environment variable
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigParse(format!("Failed to read config file: {}", e)))?;

        Self::load_with_env(&content, SourceFormat::from_path(path), &env::process_env)
    }

    /// Parses a registry from a JSON string, resolving against the process environment.
    pub fn parse_from_str(content: &str) -> Result<Self> {
        Self::load_with_env(content, SourceFormat::Json, &env::process_env)
    }

    /// Parses a registry from a YAML string, resolving against the process environment.
    pub fn parse_yaml_str(content: &str) -> Result<Self> {
        Self::load_with_env(content, SourceFormat::Yaml, &env::process_env)
    }

    /// Parses, validates and eagerly resolves a registry using `lookup` for
    /// environment variables.
    pub fn load_with_env(
        content: &str,
        format: SourceFormat,
        lookup: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let mut config: Config = match format {
            SourceFormat::Json => serde_json::from_str(content)
                .map_err(|e| Error::ConfigParse(format!("Failed to parse JSON config: {}", e)))?,
            SourceFormat::Yaml => serde_yaml::from_str(content)
                .map_err(|e| Error::ConfigParse(format!("Failed to parse YAML config: {}", e)))?,
        };

        config.fill_default_log_paths();
        validate_config(&config)?;
        config.resolve_eager_env(lookup)?;

        tracing::debug!(num_servers = config.servers.len(), "Loaded server registry");
        Ok(config)
    }

    /// Look up a server by name.
    pub fn server(&self, name: &str) -> Option<&ServerSpec> {
        self.servers.iter().find(|spec| spec.name == name)
    }

    fn fill_default_log_paths(&mut self) {
        for spec in &mut self.servers {
            if is_empty_path(&spec.log_path) {
                spec.log_path = default_log_path(&self.log_dir, &spec.name);
            }
        }
    }

    fn resolve_eager_env(&mut self, lookup: &dyn Fn(&str) -> Option<String>) -> Result<()> {
        for spec in &mut self.servers {
            if spec.resolve != ResolveMode::Eager {
                continue;
            }
            spec.env = env::resolve_map(&spec.env, lookup).map_err(|var| Error::UnresolvedEnv {
                server: spec.name.clone(),
                var,
            })?;
        }

        if let Some(notifications) = &mut self.notifications {
            notifications.webhook_url = env::expand(&notifications.webhook_url, lookup)
                .map_err(|var| {
                    Error::ConfigInvalid(format!(
                        "notification webhook requires unset environment variable '{}'",
                        var
                    ))
                })?;
        }
        Ok(())
    }
}

struct ServerMapVisitor;

impl<'de> Visitor<'de> for ServerMapVisitor {
    type Value = Vec<ServerSpec>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a map of server names to server definitions")
    }

    fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        // Duplicate keys are kept so that validation can report them by name.
        let mut servers = Vec::with_capacity(map.size_hint().unwrap_or(0));
        while let Some((name, mut spec)) = map.next_entry::<String, ServerSpec>()? {
            spec.name = name;
            servers.push(spec);
        }
        Ok(servers)
    }
}

fn deserialize_servers<'de, D>(deserializer: D) -> std::result::Result<Vec<ServerSpec>, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_map(ServerMapVisitor)
}

fn serialize_servers<S>(servers: &[ServerSpec], serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut map = serializer.serialize_map(Some(servers.len()))?;
    for spec in servers {
        map.serialize_entry(&spec.name, spec)?;
    }
    map.end()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_parse_keeps_declaration_order() {
        let config_str = r#"{
            "mcpServers": {
                "zapier": { "command": "npx", "args": ["-y", "zapier-mcp"] },
                "snowflake": { "command": "python", "args": ["-m", "snowflake_mcp"] },
                "github": { "command": "npx", "args": ["-y", "@modelcontextprotocol/server-github"] }
            }
        }"#;

        let config = Config::load_with_env(config_str, SourceFormat::Json, &no_env).unwrap();

        let names: Vec<&str> = config.servers.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["zapier", "snowflake", "github"]);
        assert_eq!(config.servers[1].args, vec!["-m", "snowflake_mcp"]);
    }

    #[test]
    fn test_default_log_paths_use_log_dir() {
        let config_str = r#"{
            "logDir": "/var/log/raider",
            "mcpServers": {
                "foundry": { "command": "python", "args": [] },
                "slack": { "command": "npx", "logPath": "/tmp/slack.log" }
            }
        }"#;

        let config = Config::load_with_env(config_str, SourceFormat::Json, &no_env).unwrap();

        assert_eq!(
            config.servers[0].log_path,
            PathBuf::from("/var/log/raider/foundry.log")
        );
        assert_eq!(config.servers[1].log_path, PathBuf::from("/tmp/slack.log"));
    }

    #[test]
    fn test_probe_strategy_parsing() {
        let config_str = r#"{
            "mcpServers": {
                "snowflake": {
                    "command": "python",
                    "health": { "type": "http", "url": "http://127.0.0.1:8001/health", "timeoutSecs": 2 }
                },
                "github": { "command": "npx", "health": { "type": "process" } }
            }
        }"#;

        let config = Config::load_with_env(config_str, SourceFormat::Json, &no_env).unwrap();

        assert_eq!(
            config.servers[0].health,
            ProbeStrategy::Http {
                url: "http://127.0.0.1:8001/health".to_string(),
                timeout_secs: Some(2),
            }
        );
        assert_eq!(
            config.servers[0].probe_timeout(Duration::from_secs(5)),
            Duration::from_secs(2)
        );
        assert_eq!(config.servers[1].health, ProbeStrategy::Process);
        assert_eq!(
            config.servers[1].probe_timeout(Duration::from_secs(5)),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn test_missing_command_is_parse_error() {
        let config_str = r#"{ "mcpServers": { "broken": { "args": ["x"] } } }"#;

        let err = Config::load_with_env(config_str, SourceFormat::Json, &no_env).unwrap_err();

        assert!(matches!(err, Error::ConfigParse(_)));
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_serialize_round_trips_through_map() {
        let config = Config::new(vec![
            ServerSpec::new("b", "node"),
            ServerSpec::new("a", "python"),
        ]);

        let json = serde_json::to_value(&config).unwrap();

        assert_eq!(json["mcpServers"]["b"]["command"], "node");
        assert_eq!(json["mcpServers"]["a"]["command"], "python");
    }
}
