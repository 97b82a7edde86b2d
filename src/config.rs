//! Gateway configuration
//!
//! Environment-driven settings with hardcoded fallbacks.

/// Default minimum seconds between dispatches per device
pub const DEFAULT_SEND_INTERVAL_SECS: u64 = 5;

/// Default total HTTP request timeout towards the sink, in seconds
pub const DEFAULT_SINK_TIMEOUT_SECS: u64 = 10;

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Cloud sink endpoint receiving reading payloads
    pub sink_url: String,
    /// Minimum seconds between dispatches per device
    pub send_interval_secs: u64,
    /// Total HTTP request timeout towards the sink, in seconds
    pub sink_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            sink_url: std::env::var("SINK_URL")
                .unwrap_or_else(|_| "http://localhost:9000/reading/save".to_string()),
            send_interval_secs: std::env::var("SEND_INTERVAL_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_SEND_INTERVAL_SECS),
            sink_timeout_secs: std::env::var("SINK_TIMEOUT_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_SINK_TIMEOUT_SECS),
        }
    }
}
