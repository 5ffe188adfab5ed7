//! One-way phase reports to the matchmaking service

use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use crate::ws::protocol::Phase;

const REPORT_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PhaseReport {
    pub room_id: String,
    pub phase: i32,
}

/// Fire-and-forget POST of every phase change.
/// Without a callback URL it does nothing.
#[derive(Clone)]
pub struct PhaseReporter {
    client: Client,
    url: Option<String>,
    room_id: String,
}

impl PhaseReporter {
    pub fn new(url: Option<String>, room_id: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(REPORT_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            url,
            room_id: room_id.into(),
        }
    }

    pub fn disabled(room_id: impl Into<String>) -> Self {
        Self::new(None, room_id)
    }

    pub fn is_enabled(&self) -> bool {
        self.url.is_some()
    }

    pub fn payload(&self, phase: Phase) -> PhaseReport {
        PhaseReport {
            room_id: self.room_id.clone(),
            phase: phase.code(),
        }
    }

    /// Spawn the report; never blocks and never fails the caller
    pub fn report(&self, phase: Phase) {
        let Some(url) = self.url.clone() else {
            return;
        };
        let client = self.client.clone();
        let payload = self.payload(phase);

        tokio::spawn(async move {
            if let Err(e) = send(&client, &url, &payload).await {
                debug!(error = %e, phase = payload.phase, "Phase report failed");
            }
        });
    }
}

async fn send(client: &Client, url: &str, payload: &PhaseReport) -> Result<(), ReportError> {
    let response = client
        .post(url)
        .json(payload)
        .send()
        .await
        .map_err(ReportError::Request)?;

    if !response.status().is_success() {
        return Err(ReportError::Status(response.status().as_u16()));
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Callback returned status {0}")]
    Status(u16),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_carries_the_phase_code() {
        let reporter = PhaseReporter::disabled("room-7");
        assert!(!reporter.is_enabled());
        let body = serde_json::to_value(reporter.payload(Phase::Augment)).unwrap();
        assert_eq!(body, serde_json::json!({ "room_id": "room-7", "phase": 3 }));
    }

    #[test]
    fn disabled_reporter_needs_no_runtime() {
        // Would panic outside a runtime if it tried to spawn
        PhaseReporter::disabled("room").report(Phase::Round);
    }

    #[tokio::test]
    async fn unreachable_callback_is_swallowed() {
        let reporter = PhaseReporter::new(Some("http://127.0.0.1:1/phase".into()), "room");
        assert!(reporter.is_enabled());
        reporter.report(Phase::Waiting);
        tokio::task::yield_now().await;
    }
}
