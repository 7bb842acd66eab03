//! Consumer-facing notification seam.

use crate::types::DeviceAddress;

/// Consumer of routing-change notifications (typically the call-control
/// layer).
///
/// Callbacks are invoked from the route actor's worker and must return
/// quickly; heavy work belongs on the consumer's own executor.
pub trait RouteListener: Send + Sync {
    /// Per-transport accessory membership changed. Fired before the routing
    /// state machine processes the corresponding change.
    fn on_bluetooth_device_list_changed(&self);

    /// The active-device cache went from empty to non-empty across all
    /// transports.
    fn on_bluetooth_active_device_present(&self);

    /// The active-device cache went from non-empty to empty across all
    /// transports.
    fn on_bluetooth_active_device_gone(&self);

    /// Call audio is routed, or being routed, to `device`. Re-emitted on
    /// each idempotent connect of the already-routed device.
    fn on_bluetooth_audio_connected(&self, device: &DeviceAddress);

    /// Call audio is no longer routed to any accessory.
    fn on_bluetooth_audio_disconnected(&self);

    /// The stack reported something contradicting the current routing state,
    /// e.g. audio lost while already off. Resynchronization is left to the
    /// consumer.
    fn on_unexpected_bluetooth_state_change(&self);
}
