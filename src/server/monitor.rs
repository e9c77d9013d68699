use crate::server::{HealthAggregator, HealthRecord, HealthStatus, LaunchId, ProcessHandle};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

/// Handles of processes believed to be running, shared between the
/// supervisor and its monitor
pub type LiveHandles = Arc<Mutex<Vec<ProcessHandle>>>;

/// Run one health cycle over `handles`.
///
/// Probes every live handle, then discards the handles whose process has
/// exited and whose probe failed in this cycle. Their records stay in the
/// aggregator as unhealthy.
pub async fn poll_cycle(aggregator: &HealthAggregator, handles: &LiveHandles) -> Vec<HealthRecord> {
    let snapshot = handles.lock().await.clone();
    let records = aggregator.check_all(&snapshot).await;

    let mut exited: Vec<LaunchId> = Vec::new();
    for (handle, record) in snapshot.iter().zip(&records) {
        // An exit racing a successful probe is picked up next cycle.
        if record.status != HealthStatus::Unhealthy {
            continue;
        }
        if let Ok(Some(status)) = handle.try_exit_status().await {
            tracing::info!(
                server_name = %handle.name(),
                pid = handle.pid(),
                %status,
                "Discarding handle of exited process"
            );
            exited.push(handle.id());
        }
    }

    if !exited.is_empty() {
        handles.lock().await.retain(|h| !exited.contains(&h.id()));
    }

    records
}

/// Periodic health polling
pub struct Monitor {
    /// Aggregator receiving the probe results
    aggregator: Arc<HealthAggregator>,
    /// Processes to probe
    handles: LiveHandles,
    /// Time between cycles
    interval: Duration,
    /// Monitor task
    task: Option<JoinHandle<()>>,
    /// Running flag
    running: Arc<AtomicBool>,
}

impl Monitor {
    /// Create a new monitor
    pub fn new(aggregator: Arc<HealthAggregator>, handles: LiveHandles, interval: Duration) -> Self {
        Self {
            aggregator,
            handles,
            interval,
            task: None,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start polling. The first cycle runs immediately.
    pub fn start(&mut self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let aggregator = Arc::clone(&self.aggregator);
        let handles = Arc::clone(&self.handles);
        let running = Arc::clone(&self.running);
        let period = self.interval;

        let task = tokio::spawn(async move {
            let mut interval = time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            while running.load(Ordering::SeqCst) {
                interval.tick().await;
                let records = poll_cycle(&aggregator, &handles).await;
                tracing::trace!(num_records = records.len(), "Monitor cycle complete");
            }
        });

        tracing::info!(interval = ?self.interval, "Health monitor started");
        self.task = Some(task);
    }

    /// Stop polling
    pub fn stop(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        if let Some(task) = self.task.take() {
            task.abort();
        }
        tracing::info!("Health monitor stopped");
    }

    /// Whether the polling task is active
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run a single cycle outside the periodic schedule
    pub async fn poll_once(&self) -> Vec<HealthRecord> {
        poll_cycle(&self.aggregator, &self.handles).await
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
