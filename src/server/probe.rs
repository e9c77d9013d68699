//! Liveness probes.
//!
//! Each probe resolves to `Ok(())` when the backend looks alive and to a
//! [`ProbeError`] otherwise. Probes are always bounded by a timeout.

use crate::config::ProbeStrategy;
use crate::error::ProbeError;
use crate::server::ProcessHandle;
use std::time::Duration;

/// Run the probe configured for `handle`'s spec, bounded by `timeout`.
pub async fn probe(
    handle: &ProcessHandle,
    client: &reqwest::Client,
    timeout: Duration,
) -> Result<(), ProbeError> {
    let check = async {
        match &handle.spec().health {
            ProbeStrategy::Process => probe_process(handle).await,
            ProbeStrategy::Http { url, .. } => probe_endpoint(client, url, timeout).await,
        }
    };

    match tokio::time::timeout(timeout, check).await {
        Ok(result) => result,
        Err(_) => Err(ProbeError::Timeout(timeout)),
    }
}

/// Healthy while the OS process has not exited.
pub async fn probe_process(handle: &ProcessHandle) -> Result<(), ProbeError> {
    match handle.try_exit_status().await {
        Ok(None) => Ok(()),
        Ok(Some(status)) => Err(ProbeError::Exited(status.to_string())),
        Err(e) => Err(ProbeError::ProcessStatus(e.to_string())),
    }
}

/// Healthy while `url` answers a GET with a 2xx status within `timeout`.
pub async fn probe_endpoint(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<(), ProbeError> {
    let response = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                ProbeError::Timeout(timeout)
            } else {
                ProbeError::Request(e.to_string())
            }
        })?;

    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(ProbeError::Status(status.as_u16()))
    }
}
