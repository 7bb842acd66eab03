//! In-memory registry and listener doubles.
//!
//! `SimRegistry` stands in for the real radio/profile stack in the demo
//! binary and in tests: scriptable failures, observable call log, and the
//! synchronous lookups the Device Manager performs. `RecordingListener`
//! captures notifications for assertions; `TraceListener` logs them.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::info;

use crate::error::{RegistryError, RegistryResult};
use crate::listener::RouteListener;
use crate::registry::DeviceRegistry;
use crate::types::{DeviceAddress, Transport};

#[derive(Default)]
struct SimInner {
    /// Number of upcoming connect calls that will be rejected.
    fail_connects: u32,
    /// Transports whose backend service is currently unavailable.
    service_down: Vec<Transport>,
    sync_ids: HashMap<DeviceAddress, i64>,
    group_ids: HashMap<DeviceAddress, i32>,
    group_leaders: HashMap<i32, DeviceAddress>,
    comm_device: Option<Transport>,
    comm_device_claims: u32,
    connect_calls: Vec<(DeviceAddress, Transport, bool)>,
    disconnect_calls: u32,
}

/// Scriptable in-memory stand-in for the radio/profile stack.
#[derive(Default)]
pub struct SimRegistry {
    inner: Mutex<SimInner>,
}

impl SimRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the next `n` connect calls.
    pub fn fail_next_connects(&self, n: u32) {
        self.inner.lock().fail_connects = n;
    }

    /// Mark a transport's backend service available or unavailable.
    pub fn set_service_down(&self, transport: Transport, down: bool) {
        let mut inner = self.inner.lock();
        inner.service_down.retain(|t| *t != transport);
        if down {
            inner.service_down.push(transport);
        }
    }

    pub fn set_sync_id(&self, address: &DeviceAddress, sync_id: i64) {
        self.inner.lock().sync_ids.insert(address.clone(), sync_id);
    }

    pub fn set_group(&self, address: &DeviceAddress, group_id: i32) {
        self.inner.lock().group_ids.insert(address.clone(), group_id);
    }

    pub fn set_group_leader(&self, group_id: i32, leader: &DeviceAddress) {
        self.inner
            .lock()
            .group_leaders
            .insert(group_id, leader.clone());
    }

    /// Every connect call observed so far, as (address, transport, switching).
    pub fn connect_calls(&self) -> Vec<(DeviceAddress, Transport, bool)> {
        self.inner.lock().connect_calls.clone()
    }

    pub fn comm_device(&self) -> Option<Transport> {
        self.inner.lock().comm_device
    }

    pub fn comm_device_claims(&self) -> u32 {
        self.inner.lock().comm_device_claims
    }

    pub fn disconnect_count(&self) -> u32 {
        self.inner.lock().disconnect_calls
    }
}

#[async_trait]
impl DeviceRegistry for SimRegistry {
    async fn connect(
        &self,
        address: &DeviceAddress,
        transport: Transport,
        switching: bool,
    ) -> RegistryResult<()> {
        let mut inner = self.inner.lock();
        inner
            .connect_calls
            .push((address.clone(), transport, switching));
        if inner.service_down.contains(&transport) {
            return Err(RegistryError::ServiceUnavailable(transport));
        }
        if inner.fail_connects > 0 {
            inner.fail_connects -= 1;
            return Err(RegistryError::Rejected("simulated failure".to_string()));
        }
        Ok(())
    }

    async fn disconnect_audio(&self) -> RegistryResult<()> {
        self.inner.lock().disconnect_calls += 1;
        Ok(())
    }

    async fn set_communication_device(&self, transport: Transport) -> RegistryResult<()> {
        let mut inner = self.inner.lock();
        if inner.service_down.contains(&transport) {
            return Err(RegistryError::ServiceUnavailable(transport));
        }
        inner.comm_device = Some(transport);
        inner.comm_device_claims += 1;
        Ok(())
    }

    async fn clear_communication_device(&self, transport: Transport) {
        let mut inner = self.inner.lock();
        if inner.comm_device == Some(transport) {
            inner.comm_device = None;
        }
    }

    fn sync_id(&self, address: &DeviceAddress) -> Option<i64> {
        self.inner.lock().sync_ids.get(address).copied()
    }

    fn group_id(&self, address: &DeviceAddress) -> Option<i32> {
        self.inner.lock().group_ids.get(address).copied()
    }

    fn group_leader(&self, group_id: i32) -> Option<DeviceAddress> {
        self.inner.lock().group_leaders.get(&group_id).cloned()
    }
}

/// Notification observed by a [`RecordingListener`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerEvent {
    DeviceListChanged,
    ActiveDevicePresent,
    ActiveDeviceGone,
    AudioConnected(DeviceAddress),
    AudioDisconnected,
    UnexpectedState,
}

/// Listener that records every notification for later assertions.
#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<ListenerEvent>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ListenerEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self, wanted: &ListenerEvent) -> usize {
        self.events.lock().iter().filter(|e| *e == wanted).count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl RouteListener for RecordingListener {
    fn on_bluetooth_device_list_changed(&self) {
        self.events.lock().push(ListenerEvent::DeviceListChanged);
    }

    fn on_bluetooth_active_device_present(&self) {
        self.events.lock().push(ListenerEvent::ActiveDevicePresent);
    }

    fn on_bluetooth_active_device_gone(&self) {
        self.events.lock().push(ListenerEvent::ActiveDeviceGone);
    }

    fn on_bluetooth_audio_connected(&self, device: &DeviceAddress) {
        self.events
            .lock()
            .push(ListenerEvent::AudioConnected(device.clone()));
    }

    fn on_bluetooth_audio_disconnected(&self) {
        self.events.lock().push(ListenerEvent::AudioDisconnected);
    }

    fn on_unexpected_bluetooth_state_change(&self) {
        self.events.lock().push(ListenerEvent::UnexpectedState);
    }
}

/// Listener that logs every notification, used by the demo binary.
#[derive(Default)]
pub struct TraceListener;

impl RouteListener for TraceListener {
    fn on_bluetooth_device_list_changed(&self) {
        info!("listener: device list changed");
    }

    fn on_bluetooth_active_device_present(&self) {
        info!("listener: active device present");
    }

    fn on_bluetooth_active_device_gone(&self) {
        info!("listener: active device gone");
    }

    fn on_bluetooth_audio_connected(&self, device: &DeviceAddress) {
        info!(%device, "listener: audio connected");
    }

    fn on_bluetooth_audio_disconnected(&self) {
        info!("listener: audio disconnected");
    }

    fn on_unexpected_bluetooth_state_change(&self) {
        info!("listener: unexpected state change");
    }
}
