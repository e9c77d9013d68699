//! Type definitions for the health server responses.

use crate::server::{HealthRecord, HealthStatus, OverallStatus, SystemStatus, summarize};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Health of one component in the combined report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentHealth {
    /// Latest status
    pub status: HealthStatus,
    /// Failure reason, if any
    pub detail: Option<String>,
    /// Time of the last probe
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_checked: Option<DateTime<Utc>>,
}

impl From<&HealthRecord> for ComponentHealth {
    fn from(record: &HealthRecord) -> Self {
        Self {
            status: record.status,
            detail: record.detail.clone(),
            last_checked: record.last_checked,
        }
    }
}

/// Body of `GET /health`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Combined status
    pub status: SystemStatus,
    /// Per-backend health keyed by server name
    pub components: BTreeMap<String, ComponentHealth>,
    /// Counts per status
    pub summary: OverallStatus,
    /// Time the report was built
    pub timestamp: DateTime<Utc>,
}

impl HealthReport {
    /// Build a report over `records`
    pub fn from_records(records: &[HealthRecord]) -> Self {
        let summary = summarize(records);
        let components = records
            .iter()
            .map(|record| (record.server_name.clone(), ComponentHealth::from(record)))
            .collect();

        Self {
            status: summary.status(),
            components,
            summary,
            timestamp: Utc::now(),
        }
    }
}

/// Body of `GET /`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceIndex {
    pub service: String,
    pub status: String,
    pub version: String,
    pub endpoints: BTreeMap<String, String>,
}
