use crate::config::{ResolveMode, ServerSpec, env};
use crate::error::LaunchError;
use crate::server::ProcessHandle;
use async_process::{Command, Stdio};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Environment lookup used to resolve lazy references at launch time
type EnvLookup = dyn Fn(&str) -> Option<String> + Send + Sync;

/// Starts backend processes.
///
/// Every launch is a non-blocking spawn: the launcher returns as soon as the
/// OS accepted the process, without waiting for the backend to be ready.
pub struct ProcessLauncher {
    env_lookup: Arc<EnvLookup>,
}

impl Default for ProcessLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessLauncher {
    /// Create a launcher resolving lazy references from the process environment
    pub fn new() -> Self {
        Self {
            env_lookup: Arc::new(env::process_env),
        }
    }

    /// Create a launcher resolving lazy references through `lookup`
    pub fn with_env_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            env_lookup: Arc::new(lookup),
        }
    }

    /// Launch one backend.
    ///
    /// Creates or truncates `spec.log_path` (and its directory), then spawns
    /// `spec.command` with the supervisor's environment overlaid by
    /// `spec.env`. Both stdout and stderr go to the log file.
    #[tracing::instrument(skip(self, spec), fields(server_name = %spec.name))]
    pub fn launch(&self, spec: Arc<ServerSpec>) -> Result<ProcessHandle, LaunchError> {
        let env = self.launch_env(&spec)?;

        let stdout = open_log_file(&spec.log_path)?;
        let stderr = stdout.try_clone().map_err(|source| LaunchError::LogFile {
            path: spec.log_path.clone(),
            source,
        })?;

        let mut command = Command::new(&spec.command);
        command
            .args(&spec.args)
            .envs(&env)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr));

        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }

        let child = command.spawn().map_err(|source| {
            tracing::error!(command = %spec.command, error = %source, "Failed to spawn process");
            LaunchError::Spawn {
                command: spec.command.clone(),
                source,
            }
        })?;

        let handle = ProcessHandle::new(spec, child);
        tracing::info!(
            pid = handle.pid(),
            log_path = %handle.log_path().display(),
            "Server launched"
        );
        Ok(handle)
    }

    /// Launch every spec independently.
    ///
    /// Never fails as a whole: the report holds one outcome per spec, in
    /// input order.
    #[tracing::instrument(skip(self, specs), fields(num_servers = specs.len()))]
    pub fn launch_all(&self, specs: &[Arc<ServerSpec>]) -> LaunchReport {
        tracing::info!("Launching all configured servers");

        let outcomes: Vec<LaunchOutcome> = specs
            .iter()
            .map(|spec| LaunchOutcome {
                spec: Arc::clone(spec),
                result: self.launch(Arc::clone(spec)),
            })
            .collect();

        let report = LaunchReport { outcomes };
        if report.failed_count() > 0 {
            tracing::warn!(
                num_failed = report.failed_count(),
                "Some servers failed to launch: {:?}",
                report.failures().map(|(spec, _)| spec.name.as_str()).collect::<Vec<_>>()
            );
        }
        tracing::info!(
            num_started = report.started_count(),
            "Finished launching servers"
        );
        report
    }

    fn launch_env(&self, spec: &ServerSpec) -> Result<BTreeMap<String, String>, LaunchError> {
        match spec.resolve {
            ResolveMode::Eager => Ok(spec.env.clone()),
            ResolveMode::Lazy => {
                env::resolve_map(&spec.env, &*self.env_lookup).map_err(LaunchError::UnresolvedEnv)
            }
        }
    }
}

fn open_log_file(path: &Path) -> Result<File, LaunchError> {
    let log_error = |source| LaunchError::LogFile {
        path: path.to_path_buf(),
        source,
    };

    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(log_error)?;
    }
    File::create(path).map_err(log_error)
}

/// Result of launching one spec
#[derive(Debug)]
pub struct LaunchOutcome {
    /// Spec that was launched
    pub spec: Arc<ServerSpec>,
    /// The running process, or why it could not be started
    pub result: Result<ProcessHandle, LaunchError>,
}

/// Per-spec results of [`ProcessLauncher::launch_all`]
#[derive(Debug, Default)]
pub struct LaunchReport {
    outcomes: Vec<LaunchOutcome>,
}

impl LaunchReport {
    /// All outcomes in launch order
    pub fn outcomes(&self) -> &[LaunchOutcome] {
        &self.outcomes
    }

    /// Handles of the servers that started
    pub fn handles(&self) -> Vec<ProcessHandle> {
        self.outcomes
            .iter()
            .filter_map(|outcome| outcome.result.as_ref().ok().cloned())
            .collect()
    }

    /// Servers that failed to start, with the reason
    pub fn failures(&self) -> impl Iterator<Item = (&Arc<ServerSpec>, &LaunchError)> {
        self.outcomes
            .iter()
            .filter_map(|outcome| outcome.result.as_ref().err().map(|e| (&outcome.spec, e)))
    }

    pub fn started_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.len() - self.started_count()
    }

    /// Serializable view of the report for operators
    pub fn entries(&self) -> Vec<LaunchEntry> {
        self.outcomes
            .iter()
            .map(|outcome| match &outcome.result {
                Ok(handle) => LaunchEntry {
                    name: outcome.spec.name.clone(),
                    launched: true,
                    pid: Some(handle.pid()),
                    log_path: outcome.spec.log_path.clone(),
                    error: None,
                },
                Err(e) => LaunchEntry {
                    name: outcome.spec.name.clone(),
                    launched: false,
                    pid: None,
                    log_path: outcome.spec.log_path.clone(),
                    error: Some(e.to_string()),
                },
            })
            .collect()
    }
}

/// One line of the launch report
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchEntry {
    pub name: String,
    pub launched: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub log_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
