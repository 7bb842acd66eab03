//! RouteHandle - public surface of the route actor.
//!
//! Wraps the command queue with ergonomic methods: fire-and-forget entry
//! points for commands and registry signals, plus the bounded query surface.
//! All fire-and-forget methods are non-blocking for the caller.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use super::commands::{QueryReply, RouteCommand};
use super::types::RouteSnapshot;
use crate::device_manager::DeviceManager;
use crate::types::{DeviceAddress, Transport};

/// Handle for the route actor.
#[derive(Clone)]
pub struct RouteHandle {
    cmd_tx: mpsc::UnboundedSender<RouteCommand>,
    device_manager: Arc<DeviceManager>,
    query_wait: Duration,
}

impl RouteHandle {
    pub(crate) fn new(
        cmd_tx: mpsc::UnboundedSender<RouteCommand>,
        device_manager: Arc<DeviceManager>,
        query_wait: Duration,
    ) -> Self {
        Self {
            cmd_tx,
            device_manager,
            query_wait,
        }
    }

    // =========================================================================
    // Commands (fire-and-forget)
    // =========================================================================

    /// Route call audio to `address`, or let the machine pick an accessory
    /// when omitted.
    pub fn connect_bluetooth_audio(&self, address: Option<DeviceAddress>) {
        let _ = self.cmd_tx.send(RouteCommand::ConnectAudio { address });
    }

    /// Tear down the audio route. The machine leaves its current state only
    /// once the stack confirms with an audio-lost signal.
    pub fn disconnect_bluetooth_audio(&self) {
        let _ = self.cmd_tx.send(RouteCommand::DisconnectAudio);
    }

    /// Remember the active hearing-aid accessory ahead of a deliberate
    /// transport handoff.
    pub fn cache_hearing_aid_device(&self) {
        let _ = self.cmd_tx.send(RouteCommand::CacheHearingAidDevice);
    }

    /// Re-assert the hearing-aid accessory remembered by the last cache.
    pub fn restore_hearing_aid_device(&self) {
        let _ = self.cmd_tx.send(RouteCommand::RestoreHearingAidDevice);
    }

    // =========================================================================
    // Registry signal entry points (fire-and-forget)
    // =========================================================================

    pub fn on_device_connected(&self, address: DeviceAddress, transport: Transport) {
        let _ = self
            .cmd_tx
            .send(RouteCommand::DeviceConnected { address, transport });
    }

    pub fn on_device_disconnected(&self, address: DeviceAddress, transport: Transport) {
        let _ = self
            .cmd_tx
            .send(RouteCommand::DeviceDisconnected { address, transport });
    }

    pub fn on_active_device_changed(&self, address: Option<DeviceAddress>, transport: Transport) {
        let _ = self
            .cmd_tx
            .send(RouteCommand::ActiveDeviceChanged { address, transport });
    }

    pub fn on_group_node_added(&self, address: DeviceAddress, group_id: i32) {
        let _ = self
            .cmd_tx
            .send(RouteCommand::GroupNodeAdded { address, group_id });
    }

    pub fn on_group_node_removed(&self, address: DeviceAddress, group_id: i32) {
        let _ = self
            .cmd_tx
            .send(RouteCommand::GroupNodeRemoved { address, group_id });
    }

    pub fn on_audio_on(&self, address: DeviceAddress) {
        let _ = self.cmd_tx.send(RouteCommand::AudioOn { address });
    }

    pub fn on_audio_lost(&self, address: Option<DeviceAddress>) {
        let _ = self.cmd_tx.send(RouteCommand::AudioLost { address });
    }

    // =========================================================================
    // Query surface
    // =========================================================================

    /// True iff any accessory is tracked on any transport. Reads the Device
    /// Manager directly; no actor round trip.
    pub fn is_bluetooth_available(&self) -> bool {
        !self.device_manager.is_empty()
    }

    /// Synchronous connected-or-pending query for callers outside the
    /// runtime. Posts a query message and blocks on a single-slot rendezvous
    /// with a bounded wait; a timed-out or failed rendezvous fails safe to
    /// `false`. Must not be called from the actor's own worker.
    pub fn is_bluetooth_audio_connected_or_pending(&self) -> bool {
        let (tx, rx) = std::sync::mpsc::sync_channel(1);
        let cmd = RouteCommand::QueryConnectedOrPending {
            response: QueryReply::Blocking(tx),
        };
        if self.cmd_tx.send(cmd).is_err() {
            return false;
        }
        match rx.recv_timeout(self.query_wait) {
            Ok(value) => value,
            Err(_) => {
                warn!("Connected-or-pending query timed out, reporting not connected");
                false
            }
        }
    }

    /// Async variant of the connected-or-pending query.
    pub async fn connected_or_pending(&self) -> bool {
        let (tx, rx) = oneshot::channel();
        let cmd = RouteCommand::QueryConnectedOrPending {
            response: QueryReply::Async(tx),
        };
        if self.cmd_tx.send(cmd).is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Diagnostics snapshot. Also doubles as an ordering barrier in tests:
    /// the reply is sent only after every previously posted command was
    /// processed.
    pub async fn snapshot(&self) -> Option<RouteSnapshot> {
        let (tx, rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(RouteCommand::Snapshot { response: tx })
            .is_err()
        {
            return None;
        }
        rx.await.ok()
    }

    /// All tracked accessories.
    pub fn connected_devices(&self) -> Vec<DeviceAddress> {
        self.device_manager.connected_devices()
    }

    /// Tracked accessories with sync pairs collapsed and non-leader LE
    /// members filtered out.
    pub fn unique_connected_devices(&self) -> Vec<DeviceAddress> {
        self.device_manager.unique_connected_devices()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// False once the actor's queue is closed.
    pub fn is_alive(&self) -> bool {
        !self.cmd_tx.is_closed()
    }

    /// Signal the actor to shut down gracefully.
    pub fn shutdown(&self) {
        let _ = self.cmd_tx.send(RouteCommand::Shutdown);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<RouteHandle>();
    }

    #[test]
    fn test_queries_fail_safe_when_actor_gone() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let registry = Arc::new(crate::sim::SimRegistry::new());
        let handle = RouteHandle::new(
            tx,
            Arc::new(DeviceManager::new(registry)),
            Duration::from_millis(10),
        );
        assert!(!handle.is_alive());
        assert!(!handle.is_bluetooth_audio_connected_or_pending());
    }
}
