//! Reading Aggregator - Per-device aggregation and dispatch
//!
//! ## Responsibilities
//!
//! - Consume attribute reports (cluster/attribute filtering, value coercion)
//! - Maintain per-device reading buffers and throttle state
//! - Dispatch complete readings through the forwarder
//! - Run one worker per device: same-device reports apply strictly in
//!   arrival order and the send outcome feeds back before the next report,
//!   while devices never block each other

use crate::dispatch_gate::DispatchGate;
use crate::forwarder::{ReadingForwarder, SendOutcome};
use crate::mesh::{self, DeviceId, SensorAttribute, CURRENT_SENSOR_CLUSTER};
use crate::reading_buffer::ReadingBuffer;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

/// Aggregation state for one device
#[derive(Debug, Default)]
pub struct DeviceState {
    /// Most-recent value per tracked attribute
    pub buffer: ReadingBuffer,
    /// Completion time of the last confirmed dispatch; `None` = never sent
    pub last_sent_at: Option<DateTime<Utc>>,
}

impl DeviceState {
    /// Mark a confirmed dispatch
    pub fn record_sent(&mut self, now: DateTime<Utc>) {
        self.last_sent_at = Some(now);
    }
}

/// One accepted report on its way to a device worker
#[derive(Debug, Clone, Copy)]
struct AttributeReport {
    attribute: SensorAttribute,
    value: f32,
}

/// Mailbox and shared state for one device worker
struct DeviceHandle {
    reports: mpsc::UnboundedSender<AttributeReport>,
    state: Arc<RwLock<DeviceState>>,
}

/// Per-device reading aggregation with rate-limited dispatch
pub struct ReadingAggregator {
    /// Tracked devices (device id -> worker handle)
    devices: RwLock<HashMap<DeviceId, DeviceHandle>>,
    gate: DispatchGate,
    forwarder: Arc<dyn ReadingForwarder>,
}

impl ReadingAggregator {
    pub fn new(gate: DispatchGate, forwarder: Arc<dyn ReadingForwarder>) -> Self {
        Self {
            devices: RwLock::new(HashMap::new()),
            gate,
            forwarder,
        }
    }

    /// Ingest one raw attribute report
    ///
    /// Filters by cluster and attribute id, coerces the raw value, then
    /// hands the report to the device's worker. Unknown devices are
    /// registered on first contact. Never returns an error to the event
    /// pump: bad input is logged and dropped.
    pub async fn ingest(
        &self,
        device: DeviceId,
        cluster: u16,
        attribute_id: u16,
        raw_value: &serde_json::Value,
    ) {
        if cluster != CURRENT_SENSOR_CLUSTER {
            tracing::trace!(
                device = %device,
                cluster = cluster,
                "Report for untracked cluster ignored"
            );
            return;
        }

        let attribute = match SensorAttribute::from_raw(attribute_id) {
            Some(attribute) => attribute,
            None => {
                tracing::trace!(
                    device = %device,
                    attribute_id = attribute_id,
                    "Untracked attribute ignored"
                );
                return;
            }
        };

        let value = match mesh::coerce_reading(raw_value) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(
                    device = %device,
                    attribute = %attribute,
                    error = %e,
                    "Dropping malformed reading"
                );
                return;
            }
        };

        tracing::debug!(
            device = %device,
            attribute = %attribute,
            amps = value,
            "Attribute report accepted"
        );

        let reports = {
            let devices = self.devices.read().await;
            devices.get(&device).map(|handle| handle.reports.clone())
        };
        let reports = match reports {
            Some(reports) => reports,
            None => self.ensure_device(device).await,
        };

        if reports.send(AttributeReport { attribute, value }).is_err() {
            tracing::debug!(device = %device, "Report for departed device dropped");
        }
    }

    /// Insert fresh state for a device, replacing any existing state
    ///
    /// Returns true when existing state was discarded (rejoin reset).
    pub async fn reset_device(&self, device: DeviceId) -> bool {
        let mut devices = self.devices.write().await;
        let had_state = devices.remove(&device).is_some();
        devices.insert(device, self.spawn_worker(device));
        had_state
    }

    /// Drop a device's state and worker
    ///
    /// Returns true when state existed; unknown devices are a no-op.
    pub async fn remove_device(&self, device: DeviceId) -> bool {
        self.devices.write().await.remove(&device).is_some()
    }

    /// Number of devices currently tracked
    pub async fn device_count(&self) -> usize {
        self.devices.read().await.len()
    }

    /// Whether a device currently has aggregation state
    pub async fn is_tracked(&self, device: DeviceId) -> bool {
        self.devices.read().await.contains_key(&device)
    }

    /// Current buffered values for a device
    pub async fn device_values(&self, device: DeviceId) -> Option<HashMap<SensorAttribute, f32>> {
        let devices = self.devices.read().await;
        let handle = devices.get(&device)?;
        let state = handle.state.read().await;
        Some(
            SensorAttribute::ALL
                .iter()
                .filter_map(|&attr| state.buffer.get(attr).map(|value| (attr, value)))
                .collect(),
        )
    }

    /// Completion time of the device's last confirmed dispatch
    pub async fn last_dispatch_at(&self, device: DeviceId) -> Option<DateTime<Utc>> {
        let devices = self.devices.read().await;
        let handle = devices.get(&device)?;
        let last_sent_at = handle.state.read().await.last_sent_at;
        last_sent_at
    }

    /// Mailbox for a device, creating state on first contact
    async fn ensure_device(&self, device: DeviceId) -> mpsc::UnboundedSender<AttributeReport> {
        let mut devices = self.devices.write().await;
        if let Some(handle) = devices.get(&device) {
            return handle.reports.clone();
        }

        tracing::info!(device = %device, "Auto-registered reporting device");
        let handle = self.spawn_worker(device);
        let reports = handle.reports.clone();
        devices.insert(device, handle);
        reports
    }

    fn spawn_worker(&self, device: DeviceId) -> DeviceHandle {
        let state = Arc::new(RwLock::new(DeviceState::default()));
        let (reports, mailbox) = mpsc::unbounded_channel();

        tokio::spawn(run_device_worker(
            device,
            state.clone(),
            mailbox,
            self.gate,
            self.forwarder.clone(),
        ));

        DeviceHandle { reports, state }
    }
}

/// Per-device worker loop
///
/// Applies reports in arrival order, evaluates completeness and the gate,
/// and awaits the forward attempt before taking the next report so the
/// outcome applies in order. Exits when the mailbox closes (device removed
/// or reset).
async fn run_device_worker(
    device: DeviceId,
    state: Arc<RwLock<DeviceState>>,
    mut mailbox: mpsc::UnboundedReceiver<AttributeReport>,
    gate: DispatchGate,
    forwarder: Arc<dyn ReadingForwarder>,
) {
    while let Some(report) = mailbox.recv().await {
        let snapshot = {
            let mut state = state.write().await;
            state.buffer.put(report.attribute, report.value);

            if !state.buffer.is_complete(&SensorAttribute::ALL) {
                tracing::debug!(
                    device = %device,
                    held = state.buffer.len(),
                    "Reading incomplete - waiting for remaining channels"
                );
                continue;
            }

            let now = Utc::now();
            if !gate.may_send(state.last_sent_at, now) {
                tracing::debug!(device = %device, "Reading complete but throttled");
                continue;
            }

            state.buffer.snapshot(device, now)
        };

        match forwarder.send(&snapshot).await {
            SendOutcome::Success => {
                state.write().await.record_sent(Utc::now());
                tracing::info!(device = %device, "Reading dispatched to sink");
            }
            outcome => {
                tracing::warn!(
                    device = %device,
                    outcome = ?outcome,
                    "Dispatch failed - will retry on next complete reading"
                );
            }
        }
    }

    tracing::debug!(device = %device, "Device worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading_buffer::ReadingSnapshot;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records every attempted dispatch and answers with a fixed outcome
    struct TestForwarder {
        sent: Mutex<Vec<ReadingSnapshot>>,
        outcome: SendOutcome,
    }

    impl TestForwarder {
        fn succeeding() -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
                outcome: SendOutcome::Success,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
                outcome: SendOutcome::Transport {
                    detail: "connection refused".to_string(),
                },
            })
        }

        fn sent_count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }

        fn sent_at(&self, index: usize) -> ReadingSnapshot {
            self.sent.lock().unwrap()[index].clone()
        }
    }

    #[async_trait]
    impl ReadingForwarder for TestForwarder {
        async fn send(&self, reading: &ReadingSnapshot) -> SendOutcome {
            self.sent.lock().unwrap().push(reading.clone());
            self.outcome.clone()
        }
    }

    fn aggregator(
        interval: chrono::Duration,
        forwarder: Arc<TestForwarder>,
    ) -> ReadingAggregator {
        ReadingAggregator::new(DispatchGate::new(interval), forwarder)
    }

    fn device() -> DeviceId {
        "aa:bb:cc:dd:ee:ff:00:11".parse().unwrap()
    }

    /// Let the device workers drain their mailboxes
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_last_write_wins_before_dispatch() {
        let forwarder = TestForwarder::succeeding();
        let agg = aggregator(chrono::Duration::seconds(60), forwarder.clone());

        agg.ingest(device(), CURRENT_SENSOR_CLUSTER, 0x0001, &json!(1.0)).await;
        agg.ingest(device(), CURRENT_SENSOR_CLUSTER, 0x0001, &json!(2.5)).await;
        settle().await;

        let values = agg.device_values(device()).await.unwrap();
        assert_eq!(values.get(&SensorAttribute::Current1), Some(&2.5));
        assert_eq!(forwarder.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_no_dispatch_until_complete() {
        let forwarder = TestForwarder::succeeding();
        let agg = aggregator(chrono::Duration::seconds(60), forwarder.clone());

        agg.ingest(device(), CURRENT_SENSOR_CLUSTER, 0x0001, &json!(1.0)).await;
        agg.ingest(device(), CURRENT_SENSOR_CLUSTER, 0x0002, &json!(2.0)).await;
        settle().await;
        assert_eq!(forwarder.sent_count(), 0);

        agg.ingest(device(), CURRENT_SENSOR_CLUSTER, 0x0003, &json!(3.0)).await;
        settle().await;

        assert_eq!(forwarder.sent_count(), 1);
        let snapshot = forwarder.sent_at(0);
        assert_eq!(snapshot.value(SensorAttribute::Current1), Some(1.0));
        assert_eq!(snapshot.value(SensorAttribute::Current2), Some(2.0));
        assert_eq!(snapshot.value(SensorAttribute::Current3), Some(3.0));
    }

    #[tokio::test]
    async fn test_second_complete_reading_is_throttled() {
        let forwarder = TestForwarder::succeeding();
        let agg = aggregator(chrono::Duration::seconds(60), forwarder.clone());

        for (attr, value) in [(0x0001, 1.0), (0x0002, 2.0), (0x0003, 3.0)] {
            agg.ingest(device(), CURRENT_SENSOR_CLUSTER, attr, &json!(value)).await;
        }
        settle().await;
        assert_eq!(forwarder.sent_count(), 1);

        agg.ingest(device(), CURRENT_SENSOR_CLUSTER, 0x0001, &json!(9.9)).await;
        settle().await;

        assert_eq!(forwarder.sent_count(), 1);
        let values = agg.device_values(device()).await.unwrap();
        assert_eq!(values.get(&SensorAttribute::Current1), Some(&9.9));
    }

    #[tokio::test]
    async fn test_dispatch_resumes_after_interval() {
        let forwarder = TestForwarder::succeeding();
        let agg = aggregator(chrono::Duration::milliseconds(100), forwarder.clone());

        for (attr, value) in [(0x0001, 1.0), (0x0002, 2.0), (0x0003, 3.0)] {
            agg.ingest(device(), CURRENT_SENSOR_CLUSTER, attr, &json!(value)).await;
        }
        settle().await;
        assert_eq!(forwarder.sent_count(), 1);

        tokio::time::sleep(Duration::from_millis(150)).await;
        agg.ingest(device(), CURRENT_SENSOR_CLUSTER, 0x0001, &json!(5.5)).await;
        settle().await;

        assert_eq!(forwarder.sent_count(), 2);
        let snapshot = forwarder.sent_at(1);
        assert_eq!(snapshot.value(SensorAttribute::Current1), Some(5.5));
        // untouched channels re-send their last known values
        assert_eq!(snapshot.value(SensorAttribute::Current2), Some(2.0));
        assert_eq!(snapshot.value(SensorAttribute::Current3), Some(3.0));
    }

    #[tokio::test]
    async fn test_failed_dispatch_retries_without_backoff() {
        let forwarder = TestForwarder::failing();
        let agg = aggregator(chrono::Duration::seconds(60), forwarder.clone());

        for (attr, value) in [(0x0001, 1.0), (0x0002, 2.0), (0x0003, 3.0)] {
            agg.ingest(device(), CURRENT_SENSOR_CLUSTER, attr, &json!(value)).await;
        }
        settle().await;
        assert_eq!(forwarder.sent_count(), 1);
        assert_eq!(agg.last_dispatch_at(device()).await, None);

        // throttle never advanced, so the very next complete reading retries
        agg.ingest(device(), CURRENT_SENSOR_CLUSTER, 0x0002, &json!(2.1)).await;
        settle().await;

        assert_eq!(forwarder.sent_count(), 2);
        assert_eq!(agg.last_dispatch_at(device()).await, None);
    }

    #[tokio::test]
    async fn test_success_records_dispatch_time() {
        let forwarder = TestForwarder::succeeding();
        let agg = aggregator(chrono::Duration::seconds(60), forwarder.clone());

        for (attr, value) in [(0x0001, 1.0), (0x0002, 2.0), (0x0003, 3.0)] {
            agg.ingest(device(), CURRENT_SENSOR_CLUSTER, attr, &json!(value)).await;
        }
        settle().await;

        assert!(agg.last_dispatch_at(device()).await.is_some());
    }

    #[tokio::test]
    async fn test_untracked_attribute_does_not_register_device() {
        let forwarder = TestForwarder::succeeding();
        let agg = aggregator(chrono::Duration::seconds(60), forwarder.clone());

        agg.ingest(device(), CURRENT_SENSOR_CLUSTER, 0x0009, &json!(1.0)).await;
        settle().await;

        assert_eq!(agg.device_count().await, 0);
        assert_eq!(forwarder.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_foreign_cluster_is_ignored() {
        let forwarder = TestForwarder::succeeding();
        let agg = aggregator(chrono::Duration::seconds(60), forwarder.clone());

        agg.ingest(device(), 0x0006, 0x0001, &json!(1.0)).await;
        settle().await;

        assert_eq!(agg.device_count().await, 0);
    }

    #[tokio::test]
    async fn test_malformed_value_causes_no_state_change() {
        let forwarder = TestForwarder::succeeding();
        let agg = aggregator(chrono::Duration::seconds(60), forwarder.clone());

        // unknown device + malformed value: nothing is registered
        agg.ingest(device(), CURRENT_SENSOR_CLUSTER, 0x0001, &json!("garbage")).await;
        settle().await;
        assert_eq!(agg.device_count().await, 0);

        // known device + malformed value: held value is untouched
        agg.ingest(device(), CURRENT_SENSOR_CLUSTER, 0x0001, &json!(1.0)).await;
        agg.ingest(device(), CURRENT_SENSOR_CLUSTER, 0x0001, &json!({"weird": true})).await;
        agg.ingest(device(), CURRENT_SENSOR_CLUSTER, 0x0001, &json!("inf")).await;
        settle().await;

        let values = agg.device_values(device()).await.unwrap();
        assert_eq!(values.get(&SensorAttribute::Current1), Some(&1.0));
    }

    #[tokio::test]
    async fn test_numeric_string_reports_coerce() {
        let forwarder = TestForwarder::succeeding();
        let agg = aggregator(chrono::Duration::seconds(60), forwarder.clone());

        agg.ingest(device(), CURRENT_SENSOR_CLUSTER, 0x0001, &json!("12.5")).await;
        settle().await;

        let values = agg.device_values(device()).await.unwrap();
        assert_eq!(values.get(&SensorAttribute::Current1), Some(&12.5));
    }

    #[tokio::test]
    async fn test_first_report_registers_device_lazily() {
        let forwarder = TestForwarder::succeeding();
        let agg = aggregator(chrono::Duration::seconds(60), forwarder.clone());

        assert!(!agg.is_tracked(device()).await);
        agg.ingest(device(), CURRENT_SENSOR_CLUSTER, 0x0001, &json!(1.0)).await;

        assert!(agg.is_tracked(device()).await);
        assert_eq!(agg.device_count().await, 1);
    }

    #[tokio::test]
    async fn test_reset_device_discards_values_and_throttle() {
        let forwarder = TestForwarder::succeeding();
        let agg = aggregator(chrono::Duration::seconds(60), forwarder.clone());

        for (attr, value) in [(0x0001, 1.0), (0x0002, 2.0), (0x0003, 3.0)] {
            agg.ingest(device(), CURRENT_SENSOR_CLUSTER, attr, &json!(value)).await;
        }
        settle().await;
        assert_eq!(forwarder.sent_count(), 1);

        assert!(agg.reset_device(device()).await);

        let values = agg.device_values(device()).await.unwrap();
        assert!(values.is_empty());
        assert_eq!(agg.last_dispatch_at(device()).await, None);
    }

    #[tokio::test]
    async fn test_remove_device_is_idempotent() {
        let forwarder = TestForwarder::succeeding();
        let agg = aggregator(chrono::Duration::seconds(60), forwarder.clone());

        assert!(!agg.remove_device(device()).await);

        agg.ingest(device(), CURRENT_SENSOR_CLUSTER, 0x0001, &json!(1.0)).await;
        assert!(agg.remove_device(device()).await);
        assert!(!agg.remove_device(device()).await);
        assert!(!agg.is_tracked(device()).await);
    }
}
