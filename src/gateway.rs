//! Gateway - Inbound event pump
//!
//! Single consumer of transport events. Lifecycle notifications go to the
//! membership tracker, attribute reports to the aggregator. Per-device
//! workers carry the slow work, so one stalled sink call never holds up
//! the pump.

use crate::aggregator::ReadingAggregator;
use crate::membership::MembershipTracker;
use crate::mesh::NetworkEvent;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Sending half handed to the transport integration
pub type EventSender = mpsc::UnboundedSender<NetworkEvent>;

/// Event pump wiring transport events into the gateway core
pub struct Gateway {
    aggregator: Arc<ReadingAggregator>,
    membership: MembershipTracker,
    events: mpsc::UnboundedReceiver<NetworkEvent>,
}

impl Gateway {
    /// Build the pump and the sender the transport feeds
    pub fn new(
        aggregator: Arc<ReadingAggregator>,
        membership: MembershipTracker,
    ) -> (Self, EventSender) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let gateway = Self {
            aggregator,
            membership,
            events: events_rx,
        };
        (gateway, events_tx)
    }

    /// Run until every sender is dropped
    pub async fn run(mut self) {
        tracing::info!("Event pump started");
        while let Some(event) = self.events.recv().await {
            self.dispatch(event).await;
        }
        tracing::info!("Event pump stopped - transport channel closed");
    }

    async fn dispatch(&self, event: NetworkEvent) {
        match event {
            NetworkEvent::DeviceJoined { device } => {
                self.membership.on_joined(device).await;
            }
            NetworkEvent::DeviceLeft { device } => {
                self.membership.on_left(device).await;
            }
            NetworkEvent::DeviceRemoved { device } => {
                self.membership.on_removed(device).await;
            }
            NetworkEvent::AttributeUpdated {
                device,
                cluster,
                attribute,
                value,
            } => {
                self.aggregator.ingest(device, cluster, attribute, &value).await;
            }
        }
    }
}
