use crate::error::LaunchError;
use crate::notify::Notifier;
use crate::server::{ProcessHandle, probe};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;

/// Health of one backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// The last probe succeeded
    Healthy,
    /// The last probe failed, or the backend never launched
    Unhealthy,
    /// Not probed yet
    Unknown,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Latest known health of one backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthRecord {
    /// Name of the server spec
    pub server_name: String,
    /// Result of the last probe
    pub status: HealthStatus,
    /// When the last probe finished; `None` before the first probe
    pub last_checked: Option<DateTime<Utc>>,
    /// Failure reason for unhealthy records
    pub detail: Option<String>,
}

impl HealthRecord {
    pub fn unknown(server_name: impl Into<String>) -> Self {
        Self {
            server_name: server_name.into(),
            status: HealthStatus::Unknown,
            last_checked: None,
            detail: None,
        }
    }

    pub fn healthy(server_name: impl Into<String>) -> Self {
        Self {
            server_name: server_name.into(),
            status: HealthStatus::Healthy,
            last_checked: Some(Utc::now()),
            detail: None,
        }
    }

    pub fn unhealthy(server_name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            server_name: server_name.into(),
            status: HealthStatus::Unhealthy,
            last_checked: Some(Utc::now()),
            detail: Some(detail.into()),
        }
    }
}

/// Combined health of the whole system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl fmt::Display for SystemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SystemStatus::Healthy => "healthy",
            SystemStatus::Degraded => "degraded",
            SystemStatus::Unhealthy => "unhealthy",
        };
        f.write_str(s)
    }
}

/// Counts of records per status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallStatus {
    pub healthy_count: usize,
    pub unhealthy_count: usize,
    pub unknown_count: usize,
    pub total: usize,
}

impl OverallStatus {
    /// Healthy when every backend is healthy, unhealthy when none is healthy
    /// and at least one failed, degraded otherwise.
    ///
    /// An empty record set is degraded: nothing is known to be serving.
    pub fn status(&self) -> SystemStatus {
        if self.total == 0 {
            SystemStatus::Degraded
        } else if self.healthy_count == self.total {
            SystemStatus::Healthy
        } else if self.healthy_count == 0 && self.unhealthy_count > 0 {
            SystemStatus::Unhealthy
        } else {
            SystemStatus::Degraded
        }
    }
}

/// Count records per status. Independent of record order.
pub fn summarize(records: &[HealthRecord]) -> OverallStatus {
    records
        .iter()
        .fold(OverallStatus::default(), |mut summary, record| {
            match record.status {
                HealthStatus::Healthy => summary.healthy_count += 1,
                HealthStatus::Unhealthy => summary.unhealthy_count += 1,
                HealthStatus::Unknown => summary.unknown_count += 1,
            }
            summary.total += 1;
            summary
        })
}

/// A change of a backend's status between two probes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthTransition {
    pub server_name: String,
    pub from: HealthStatus,
    pub to: HealthStatus,
    pub detail: Option<String>,
    pub at: DateTime<Utc>,
}

impl HealthTransition {
    /// Failures and recoveries; the initial unknown → healthy step is not one.
    pub fn is_notable(&self) -> bool {
        self.to == HealthStatus::Unhealthy
            || (self.from == HealthStatus::Unhealthy && self.to == HealthStatus::Healthy)
    }
}

/// Probes backends and owns their [`HealthRecord`]s.
///
/// The aggregator is the only writer of the record set. Every change of a
/// record's status is broadcast as a [`HealthTransition`] and, when notable,
/// handed to the configured [`Notifier`].
pub struct HealthAggregator {
    /// Records in registry order
    records: Mutex<Vec<HealthRecord>>,
    /// Default per-probe timeout
    probe_timeout: Duration,
    /// Client for endpoint probes
    client: reqwest::Client,
    /// Transition broadcast
    transitions: broadcast::Sender<HealthTransition>,
    /// Optional transition webhook
    notifier: Option<Arc<dyn Notifier>>,
}

impl HealthAggregator {
    /// Create an aggregator with one `unknown` record per server
    pub fn new<I, S>(server_names: I, probe_timeout: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let records = server_names.into_iter().map(HealthRecord::unknown).collect();
        let (transitions, _) = broadcast::channel(100);

        Self {
            records: Mutex::new(records),
            probe_timeout,
            client: probe_client(),
            transitions,
            notifier: None,
        }
    }

    /// Deliver notable transitions to `notifier`
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Subscribe to status transitions
    pub fn subscribe(&self) -> broadcast::Receiver<HealthTransition> {
        self.transitions.subscribe()
    }

    /// Probe one backend. Never fails: probe errors become an unhealthy record.
    ///
    /// The record is returned but not stored; see [`check_all`](Self::check_all).
    #[tracing::instrument(skip(self, handle), fields(server_name = %handle.name(), pid = handle.pid()))]
    pub async fn check(&self, handle: &ProcessHandle) -> HealthRecord {
        let timeout = handle.spec().probe_timeout(self.probe_timeout);

        match probe::probe(handle, &self.client, timeout).await {
            Ok(()) => {
                tracing::trace!("Probe succeeded");
                HealthRecord::healthy(handle.name())
            }
            Err(e) => {
                tracing::debug!(error = %e, "Probe failed");
                HealthRecord::unhealthy(handle.name(), e.to_string())
            }
        }
    }

    /// Probe every handle concurrently and store the results.
    ///
    /// Each probe is bounded by its own timeout, so one hung backend delays
    /// the cycle by at most that timeout. Records come back in handle order.
    #[tracing::instrument(skip(self, handles), fields(num_handles = handles.len()))]
    pub async fn check_all(&self, handles: &[ProcessHandle]) -> Vec<HealthRecord> {
        let records = futures::future::join_all(handles.iter().map(|h| self.check(h))).await;

        let transitions: Vec<HealthTransition> = {
            let mut stored = self.lock_records();
            records
                .iter()
                .filter_map(|record| store(&mut stored, record.clone()))
                .collect()
        };
        self.announce(transitions).await;

        let summary = summarize(&records);
        tracing::debug!(
            healthy = summary.healthy_count,
            unhealthy = summary.unhealthy_count,
            "Health cycle finished"
        );
        records
    }

    /// Mark a server that could not be launched as unhealthy
    #[tracing::instrument(skip(self, error))]
    pub async fn record_launch_failure(&self, server_name: &str, error: &LaunchError) {
        let record = HealthRecord::unhealthy(server_name, format!("launch failed: {}", error));
        let transition = store(&mut self.lock_records(), record);
        self.announce(transition.into_iter().collect()).await;
    }

    /// Snapshot of all records in registry order
    pub fn records(&self) -> Vec<HealthRecord> {
        self.lock_records().clone()
    }

    /// Record of one server
    pub fn record(&self, server_name: &str) -> Option<HealthRecord> {
        self.lock_records()
            .iter()
            .find(|r| r.server_name == server_name)
            .cloned()
    }

    /// Counts over the current records
    pub fn summary(&self) -> OverallStatus {
        summarize(&self.lock_records())
    }

    fn lock_records(&self) -> MutexGuard<'_, Vec<HealthRecord>> {
        // Records stay consistent even if a holder panicked; each write is one assignment.
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn announce(&self, transitions: Vec<HealthTransition>) {
        for transition in &transitions {
            if transition.to == HealthStatus::Unhealthy {
                tracing::warn!(
                    server_name = %transition.server_name,
                    from = %transition.from,
                    detail = ?transition.detail,
                    "Server became unhealthy"
                );
            } else {
                tracing::info!(
                    server_name = %transition.server_name,
                    from = %transition.from,
                    to = %transition.to,
                    "Server health changed"
                );
            }

            // No subscribers is fine.
            let _ = self.transitions.send(transition.clone());
        }

        let Some(notifier) = &self.notifier else {
            return;
        };

        // Concurrent: a cycle waits for at most one notifier timeout.
        let deliveries = transitions
            .iter()
            .filter(|transition| transition.is_notable())
            .map(|transition| async move {
                if let Err(e) = notifier.notify(transition).await {
                    tracing::warn!(
                        error = %e,
                        server_name = %transition.server_name,
                        "Failed to deliver health notification"
                    );
                }
            });
        futures::future::join_all(deliveries).await;
    }
}

/// Backends are probed directly; proxy settings from the environment do not apply.
fn probe_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Replace the stored record for `record.server_name`, returning the
/// transition if the status changed.
fn store(records: &mut Vec<HealthRecord>, record: HealthRecord) -> Option<HealthTransition> {
    let previous = match records.iter_mut().find(|r| r.server_name == record.server_name) {
        Some(existing) => std::mem::replace(existing, record.clone()).status,
        None => {
            records.push(record.clone());
            HealthStatus::Unknown
        }
    };

    (previous != record.status).then(|| HealthTransition {
        server_name: record.server_name,
        from: previous,
        to: record.status,
        detail: record.detail,
        at: record.last_checked.unwrap_or_else(Utc::now),
    })
}
