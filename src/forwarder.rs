//! Forwarder - Cloud sink adapter
//!
//! ## Responsibilities
//!
//! - Ship one reading snapshot to the cloud ingest endpoint
//! - Own the request timeout
//! - Map the HTTP result to a send outcome; never surface a hard error

use crate::config::DEFAULT_SINK_TIMEOUT_SECS;
use crate::mesh::SensorAttribute;
use crate::reading_buffer::ReadingSnapshot;
use async_trait::async_trait;
use chrono::SecondsFormat;
use serde::Serialize;
use std::time::Duration;

/// Result of one forward attempt
///
/// Everything that is not `Success` is handled identically upstream: the
/// failure is logged and the device's throttle timer is left untouched, so
/// the next complete reading retries immediately.
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// Sink acknowledged with a 2xx status
    Success,
    /// Request exceeded the client timeout
    Timeout,
    /// Sink answered with a non-success status
    Rejected { status: u16, body: String },
    /// Connection-level failure (DNS, refused, TLS, ...)
    Transport { detail: String },
}

impl SendOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SendOutcome::Success)
    }
}

/// Outbound port for reading dispatch
#[async_trait]
pub trait ReadingForwarder: Send + Sync {
    /// Attempt delivery of one snapshot
    async fn send(&self, reading: &ReadingSnapshot) -> SendOutcome;
}

/// Wire payload for the sink
///
/// Channels absent from the snapshot are omitted entirely, never null.
#[derive(Debug, Clone, Serialize)]
pub struct ReadingPayload {
    pub sensor_mac: String,
    pub timestamp: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_1: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_2: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_3: Option<f32>,
}

impl ReadingPayload {
    /// Build the wire shape from a snapshot
    ///
    /// The timestamp is the capture time in ISO-8601 UTC with microsecond
    /// precision and a trailing `Z`.
    pub fn from_snapshot(reading: &ReadingSnapshot) -> Self {
        Self {
            sensor_mac: reading.device.to_string(),
            timestamp: reading
                .captured_at
                .to_rfc3339_opts(SecondsFormat::Micros, true),
            current_1: reading.value(SensorAttribute::Current1),
            current_2: reading.value(SensorAttribute::Current2),
            current_3: reading.value(SensorAttribute::Current3),
        }
    }
}

/// reqwest-backed forwarder POSTing JSON readings to the sink
pub struct HttpForwarder {
    client: reqwest::Client,
    sink_url: String,
    timeout: Duration,
}

impl HttpForwarder {
    /// Forwarder with the production timeout
    pub fn new(sink_url: String) -> Self {
        Self::with_timeout(sink_url, Duration::from_secs(DEFAULT_SINK_TIMEOUT_SECS))
    }

    /// Forwarder with a custom total request timeout
    pub fn with_timeout(sink_url: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            sink_url,
            timeout,
        }
    }

    pub fn sink_url(&self) -> &str {
        &self.sink_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl ReadingForwarder for HttpForwarder {
    async fn send(&self, reading: &ReadingSnapshot) -> SendOutcome {
        let payload = ReadingPayload::from_snapshot(reading);

        let resp = match self.client.post(&self.sink_url).json(&payload).send().await {
            Ok(resp) => resp,
            Err(e) if e.is_timeout() => return SendOutcome::Timeout,
            Err(e) => {
                return SendOutcome::Transport {
                    detail: e.to_string(),
                }
            }
        };

        let status = resp.status();
        if status.is_success() {
            SendOutcome::Success
        } else {
            let body = resp.text().await.unwrap_or_default();
            SendOutcome::Rejected {
                status: status.as_u16(),
                body,
            }
        }
    }
}
