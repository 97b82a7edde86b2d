//! Amigo Gateway Library
//!
//! Mesh current-sensor to cloud bridge.
//!
//! ## Architecture (7 Components)
//!
//! 1. Mesh - Device identity, tracked cluster/attributes, transport events
//! 2. ReadingBuffer - Per-device last-write-wins attribute map
//! 3. DispatchGate - Per-device minimum-interval send throttle
//! 4. ReadingAggregator - Ingest pipeline + one dispatch worker per device
//! 5. MembershipTracker - Join/leave/removed lifecycle
//! 6. Forwarder - Cloud sink HTTP adapter
//! 7. Gateway - Inbound event pump
//!
//! ## Design Principles
//!
//! - Per-device serialization: one worker per device, reports applied in
//!   arrival order; devices never block each other
//! - Best-effort delivery: no queue, no backoff; the throttle timer only
//!   advances on confirmed success, so failures retry on the next reading
//! - Nothing fatal: malformed input is logged and dropped, never raised

pub mod mesh;
pub mod reading_buffer;
pub mod dispatch_gate;
pub mod aggregator;
pub mod membership;
pub mod forwarder;
pub mod gateway;
pub mod config;
pub mod error;

pub use config::GatewayConfig;
pub use error::{Error, Result};
