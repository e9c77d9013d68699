// src/server/process.rs
use crate::config::ServerSpec;
use async_process::{Child, ExitStatus};
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Unique identifier for one launch of a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LaunchId(Uuid);

impl LaunchId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for LaunchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A backend process believed to be running.
///
/// Cloning a handle shares the underlying child. The spec is shared with the
/// registry; dropping the handle does not kill the process.
#[derive(Clone)]
pub struct ProcessHandle {
    id: LaunchId,
    spec: Arc<ServerSpec>,
    pid: u32,
    started_at: DateTime<Utc>,
    child: Arc<Mutex<Child>>,
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("id", &self.id)
            .field("name", &self.spec.name)
            .field("pid", &self.pid)
            .field("started_at", &self.started_at)
            .field("log_path", &self.spec.log_path)
            .finish()
    }
}

impl ProcessHandle {
    pub(crate) fn new(spec: Arc<ServerSpec>, child: Child) -> Self {
        Self {
            id: LaunchId::new(),
            pid: child.id(),
            spec,
            started_at: Utc::now(),
            child: Arc::new(Mutex::new(child)),
        }
    }

    /// Get the launch ID
    pub fn id(&self) -> LaunchId {
        self.id
    }

    /// Get the server name
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Get the spec this process was launched from
    pub fn spec(&self) -> &Arc<ServerSpec> {
        &self.spec
    }

    /// Get the OS process ID
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Get the time the spawn was accepted
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Get the file receiving stdout and stderr
    pub fn log_path(&self) -> &Path {
        &self.spec.log_path
    }

    /// Poll the process without blocking.
    ///
    /// Returns `Ok(None)` while it runs. Once it has exited the status is
    /// returned and the process is reaped.
    pub async fn try_exit_status(&self) -> std::io::Result<Option<ExitStatus>> {
        self.child.lock().await.try_status()
    }

    /// Kill the process and wait for it to exit.
    ///
    /// A process that already exited is only reaped.
    #[tracing::instrument(skip(self), fields(server_name = %self.spec.name, pid = self.pid))]
    pub async fn stop(&self) -> std::io::Result<ExitStatus> {
        let mut child = self.child.lock().await;

        if let Some(status) = child.try_status()? {
            tracing::debug!(%status, "Process had already exited");
            return Ok(status);
        }

        child.kill()?;
        let status = child.status().await?;
        tracing::info!(%status, "Process stopped");
        Ok(status)
    }
}
