//! Membership Tracker - Mesh lifecycle handling
//!
//! Creates and destroys per-device aggregation state as devices join and
//! leave the mesh. Only transitions are logged; departures of unknown
//! devices are a silent no-op.

use crate::aggregator::ReadingAggregator;
use crate::mesh::DeviceId;
use std::sync::Arc;

/// Membership transition observed for a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipEvent {
    /// First join: fresh aggregation state created
    Joined,
    /// Join for an already-tracked device: state reset to fresh
    Rejoined,
    /// Tracked device departed: state dropped
    Departed,
}

/// Applies mesh lifecycle notifications to the aggregator
pub struct MembershipTracker {
    aggregator: Arc<ReadingAggregator>,
}

impl MembershipTracker {
    pub fn new(aggregator: Arc<ReadingAggregator>) -> Self {
        Self { aggregator }
    }

    /// Device (re)joined the mesh
    ///
    /// A rejoin discards whatever state the previous life accumulated:
    /// empty buffer, never-sent throttle.
    pub async fn on_joined(&self, device: DeviceId) -> MembershipEvent {
        let had_state = self.aggregator.reset_device(device).await;
        if had_state {
            tracing::info!(device = %device, "Device rejoined - aggregation state reset");
            MembershipEvent::Rejoined
        } else {
            tracing::info!(device = %device, "Device joined");
            MembershipEvent::Joined
        }
    }

    /// Device announced its departure
    pub async fn on_left(&self, device: DeviceId) -> Option<MembershipEvent> {
        self.forget(device, "left").await
    }

    /// Device removed on the coordinator side
    pub async fn on_removed(&self, device: DeviceId) -> Option<MembershipEvent> {
        self.forget(device, "removed").await
    }

    async fn forget(&self, device: DeviceId, reason: &'static str) -> Option<MembershipEvent> {
        if self.aggregator.remove_device(device).await {
            tracing::info!(
                device = %device,
                reason = reason,
                "Device departed - aggregation state dropped"
            );
            Some(MembershipEvent::Departed)
        } else {
            tracing::debug!(
                device = %device,
                reason = reason,
                "Departure of untracked device ignored"
            );
            None
        }
    }
}
