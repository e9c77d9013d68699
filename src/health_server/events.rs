//! Server-Sent Event framing for health transitions.

use crate::health_server::types::HealthReport;
use crate::server::HealthTransition;
use actix_web::web::Bytes;

/// SSE event name for the report sent when a client connects
pub const SNAPSHOT_EVENT: &str = "health-snapshot";
/// SSE event name for status changes
pub const TRANSITION_EVENT: &str = "health-transition";

/// Frame one SSE message
pub fn format_sse_message(event: &str, data: &str, id: Option<&str>) -> Bytes {
    let mut result = String::new();

    if let Some(id) = id {
        result.push_str(&format!("id: {}\n", id));
    }

    result.push_str(&format!("event: {}\n", event));
    result.push_str(&format!("data: {}\n\n", data));

    Bytes::from(result)
}

/// Frame the current report
pub fn format_snapshot(report: &HealthReport) -> Option<Bytes> {
    match serde_json::to_string(report) {
        Ok(data) => Some(format_sse_message(SNAPSHOT_EVENT, &data, None)),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize health snapshot");
            None
        }
    }
}

/// Frame a transition
pub fn format_transition(transition: &HealthTransition) -> Option<Bytes> {
    match serde_json::to_string(transition) {
        Ok(data) => Some(format_sse_message(
            TRANSITION_EVENT,
            &data,
            Some(&transition.server_name),
        )),
        Err(e) => {
            tracing::error!(
                error = %e,
                server_name = %transition.server_name,
                "Failed to serialize health transition"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::HealthStatus;
    use chrono::Utc;

    #[test]
    fn test_format_sse_message() {
        let bytes = format_sse_message("health-transition", "{}", Some("slack"));
        assert_eq!(
            std::str::from_utf8(&bytes).unwrap(),
            "id: slack\nevent: health-transition\ndata: {}\n\n"
        );

        let bytes = format_sse_message("health-snapshot", "{}", None);
        assert_eq!(
            std::str::from_utf8(&bytes).unwrap(),
            "event: health-snapshot\ndata: {}\n\n"
        );
    }

    #[test]
    fn test_format_transition_uses_server_as_id() {
        let transition = HealthTransition {
            server_name: "foundry".to_string(),
            from: HealthStatus::Healthy,
            to: HealthStatus::Unhealthy,
            detail: Some("health endpoint returned HTTP 503".to_string()),
            at: Utc::now(),
        };

        let bytes = format_transition(&transition).unwrap();
        let text = std::str::from_utf8(&bytes).unwrap();

        assert!(text.starts_with("id: foundry\nevent: health-transition\ndata: {"));
        assert!(text.contains("\"to\":\"unhealthy\""));
        assert!(text.ends_with("\n\n"));
    }
}
