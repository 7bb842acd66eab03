//! Seam to the underlying radio/profile stack.

use crate::error::RegistryResult;
use crate::types::{DeviceAddress, Transport};
use async_trait::async_trait;

/// Outbound operations against the radio/profile stack, plus the synchronous
/// lookups the Device Manager needs (sync ids, group topology).
///
/// Implementations must not block: the route actor awaits these calls on its
/// single serialized worker. Pairing, RF and codec negotiation live behind
/// this trait and are out of scope for the routing core.
///
/// Note: All methods take &self to support Arc<dyn DeviceRegistry>.
/// Implementations should use interior mutability for mutable state.
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    /// Select `address` as the transport's active device and open the voice
    /// audio path. `switching` is set when the attempt supersedes a
    /// different currently-routed accessory.
    async fn connect(
        &self,
        address: &DeviceAddress,
        transport: Transport,
        switching: bool,
    ) -> RegistryResult<()>;

    /// Tear down any open voice audio link.
    async fn disconnect_audio(&self) -> RegistryResult<()>;

    /// Claim the OS communication-device slot for `transport`.
    async fn set_communication_device(&self, transport: Transport) -> RegistryResult<()>;

    /// Release the OS communication-device slot for `transport`.
    async fn clear_communication_device(&self, transport: Transport);

    /// Hearing-aid sync id for `address`, if the stack knows it yet.
    fn sync_id(&self, address: &DeviceAddress) -> Option<i64>;

    /// LE audio group id for `address`, if resolvable synchronously.
    /// Group membership may instead arrive later through the group-node
    /// callbacks.
    fn group_id(&self, address: &DeviceAddress) -> Option<i32>;

    /// Elected leader of an LE audio group, if one exists.
    fn group_leader(&self, group_id: i32) -> Option<DeviceAddress>;
}
