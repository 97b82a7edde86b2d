//! Dispatch Gate - Per-device send throttle
//!
//! Minimum-interval policy between dispatches for one device. The gate is
//! pure: callers pass the current time, and the per-device `last_sent_at`
//! timestamp lives in the device state. It only advances on confirmed
//! delivery, so a failing sink retries on every complete reading.

use crate::config::DEFAULT_SEND_INTERVAL_SECS;
use chrono::{DateTime, Duration, Utc};

/// Minimum-interval dispatch policy, shared by all devices
#[derive(Debug, Clone, Copy)]
pub struct DispatchGate {
    min_interval: Duration,
}

impl DispatchGate {
    pub fn new(min_interval: Duration) -> Self {
        Self { min_interval }
    }

    /// Whether a device may dispatch now
    ///
    /// `None` means never sent and always passes. A gap of exactly the
    /// interval is eligible.
    pub fn may_send(&self, last_sent_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match last_sent_at {
            None => true,
            Some(last) => now.signed_duration_since(last) >= self.min_interval,
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }
}

impl Default for DispatchGate {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_SEND_INTERVAL_SECS as i64))
    }
}
