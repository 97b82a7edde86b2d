//! Reading Buffer - Per-device attribute aggregation
//!
//! Most-recent value per tracked attribute, last write wins. The buffer is
//! NOT cleared after a dispatch: values persist, so a device that refreshes
//! only one channel re-sends the other two at their last known values.

use crate::mesh::{DeviceId, SensorAttribute};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Last-write-wins map of tracked attribute to reported value
#[derive(Debug, Clone, Default)]
pub struct ReadingBuffer {
    values: HashMap<SensorAttribute, f32>,
}

impl ReadingBuffer {
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    /// Insert or overwrite one attribute value
    pub fn put(&mut self, attribute: SensorAttribute, value: f32) {
        self.values.insert(attribute, value);
    }

    /// Value currently held for an attribute
    pub fn get(&self, attribute: SensorAttribute) -> Option<f32> {
        self.values.get(&attribute).copied()
    }

    /// True when every required attribute has a value
    pub fn is_complete(&self, required: &[SensorAttribute]) -> bool {
        required.iter().all(|attr| self.values.contains_key(attr))
    }

    /// Owned copy for dispatch; later writes do not affect it
    pub fn snapshot(&self, device: DeviceId, captured_at: DateTime<Utc>) -> ReadingSnapshot {
        ReadingSnapshot {
            device,
            captured_at,
            values: self.values.clone(),
        }
    }

    /// Drop all held values
    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Immutable copy of a device's buffer taken at dispatch time
#[derive(Debug, Clone)]
pub struct ReadingSnapshot {
    pub device: DeviceId,
    pub captured_at: DateTime<Utc>,
    values: HashMap<SensorAttribute, f32>,
}

impl ReadingSnapshot {
    /// Value captured for an attribute, if present
    pub fn value(&self, attribute: SensorAttribute) -> Option<f32> {
        self.values.get(&attribute).copied()
    }
}
