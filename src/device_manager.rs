//! Accessory membership and active-device tracking.
//!
//! Owns the per-transport membership sets, performs the actual connect calls
//! against the registry, resolves the "which accessory is audio-active right
//! now" tie-break, manages the mutually exclusive communication-device
//! claims, and collapses hearing-aid sync pairs into one logical accessory.
//!
//! All mutation happens from the route actor's worker. The membership maps
//! are additionally guarded by a mutex because the synchronous read methods
//! (`connected_devices`, counts) are invoked directly from caller threads
//! outside the actor's queue. No lock is ever held across an `.await`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::registry::DeviceRegistry;
use crate::types::{DeviceAddress, Transport};

/// Which communication-device slot is currently claimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommDevice {
    HearingAid,
    LeAudio,
}

impl CommDevice {
    fn transport(self) -> Transport {
        match self {
            CommDevice::HearingAid => Transport::HearingAid,
            CommDevice::LeAudio => Transport::LeAudio,
        }
    }
}

/// Edge reported by [`DeviceManager::record_active_device`], used by the
/// actor to emit present/gone notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveDeviceEdge {
    BecamePresent,
    BecameGone,
    Unchanged,
}

#[derive(Default)]
struct Membership {
    /// Insertion-ordered membership per transport. Order is the default
    /// iteration order only, never semantically significant.
    hfp: Vec<DeviceAddress>,
    hearing_aid: Vec<DeviceAddress>,
    le_audio: Vec<DeviceAddress>,

    /// Hearing-aid accessory -> shared sync id.
    sync_ids: HashMap<DeviceAddress, i64>,

    /// LE accessory -> group id. Absent while group resolution is pending.
    group_ids: HashMap<DeviceAddress, i32>,

    /// Registry-reported active device per transport.
    active: HashMap<Transport, DeviceAddress>,

    /// Most recently reported active accessory across all transports.
    most_recent_active: Option<(DeviceAddress, Transport)>,

    /// Hearing-aid device remembered across a deliberate transport handoff.
    /// Valid only between `cache_hearing_aid_device` and the next restore.
    cached_hearing_aid: Option<DeviceAddress>,

    /// Currently claimed communication-device slot.
    comm_device: Option<CommDevice>,
}

impl Membership {
    fn list(&self, transport: Transport) -> &Vec<DeviceAddress> {
        match transport {
            Transport::Hfp => &self.hfp,
            Transport::HearingAid => &self.hearing_aid,
            Transport::LeAudio => &self.le_audio,
        }
    }

    fn list_mut(&mut self, transport: Transport) -> &mut Vec<DeviceAddress> {
        match transport {
            Transport::Hfp => &mut self.hfp,
            Transport::HearingAid => &mut self.hearing_aid,
            Transport::LeAudio => &mut self.le_audio,
        }
    }
}

/// Membership and active-device tracker backing the route state machine.
pub struct DeviceManager {
    registry: Arc<dyn DeviceRegistry>,
    inner: Mutex<Membership>,
}

impl DeviceManager {
    pub fn new(registry: Arc<dyn DeviceRegistry>) -> Self {
        Self {
            registry,
            inner: Mutex::new(Membership::default()),
        }
    }

    // =========================================================================
    // Membership updates (route actor only)
    // =========================================================================

    /// Register a newly connected accessory. Returns true iff the accessory
    /// was not already tracked on this transport.
    pub fn on_device_connected(&self, address: &DeviceAddress, transport: Transport) -> bool {
        let mut inner = self.inner.lock();
        if inner.list(transport).contains(address) {
            trace!(device = %address, %transport, "Device already tracked");
            return false;
        }
        inner.list_mut(transport).push(address.clone());

        match transport {
            Transport::HearingAid => {
                if let Some(sync_id) = self.registry.sync_id(address) {
                    inner.sync_ids.insert(address.clone(), sync_id);
                }
            }
            Transport::LeAudio => match self.registry.group_id(address) {
                Some(group_id) => {
                    inner.group_ids.insert(address.clone(), group_id);
                }
                None => {
                    // Group resolution deferred to the group-node callback.
                    debug!(device = %address, "LE audio group id not yet known");
                }
            },
            Transport::Hfp => {}
        }

        debug!(device = %address, %transport, "Device connected");
        true
    }

    /// Remove a lost accessory and its cached sync/group ids. Returns true
    /// iff the accessory was tracked on this transport.
    pub fn on_device_disconnected(&self, address: &DeviceAddress, transport: Transport) -> bool {
        let mut inner = self.inner.lock();
        let list = inner.list_mut(transport);
        let Some(pos) = list.iter().position(|a| a == address) else {
            trace!(device = %address, %transport, "Disconnect for untracked device");
            return false;
        };
        list.remove(pos);

        match transport {
            Transport::HearingAid => {
                inner.sync_ids.remove(address);
            }
            Transport::LeAudio => {
                inner.group_ids.remove(address);
            }
            Transport::Hfp => {}
        }

        // Drop stale active-cache entries naming the departed device so a
        // later recompute cannot adopt an address outside membership.
        if inner.active.get(&transport) == Some(address) {
            inner.active.remove(&transport);
        }
        if inner
            .most_recent_active
            .as_ref()
            .is_some_and(|(a, t)| a == address && *t == transport)
        {
            inner.most_recent_active = None;
        }

        debug!(device = %address, %transport, "Device disconnected");
        true
    }

    /// Late LE audio group resolution. Returns true iff the accessory became
    /// newly tracked through this callback.
    pub fn on_group_node_added(&self, address: &DeviceAddress, group_id: i32) -> bool {
        let mut inner = self.inner.lock();
        inner.group_ids.insert(address.clone(), group_id);
        if inner.le_audio.contains(address) {
            trace!(device = %address, group_id, "Group id resolved for tracked device");
            false
        } else {
            // Group membership can arrive before the connect signal.
            inner.le_audio.push(address.clone());
            debug!(device = %address, group_id, "Device tracked via group callback");
            true
        }
    }

    pub fn on_group_node_removed(&self, address: &DeviceAddress, group_id: i32) {
        let mut inner = self.inner.lock();
        if inner.group_ids.remove(address).is_some() {
            debug!(device = %address, group_id, "Device left LE audio group");
        }
    }

    // =========================================================================
    // Synchronous reads (any thread)
    // =========================================================================

    /// All tracked accessories, transports in priority order, insertion
    /// order within a transport.
    pub fn connected_devices(&self) -> Vec<DeviceAddress> {
        let inner = self.inner.lock();
        let mut out = Vec::new();
        for transport in Transport::priority_order() {
            out.extend(inner.list(*transport).iter().cloned());
        }
        out
    }

    /// Tracked accessories with hearing-aid sync pairs collapsed to one
    /// representative (preferring the member the transport reports active)
    /// and LE accessories included only while they lead their group.
    pub fn unique_connected_devices(&self) -> Vec<DeviceAddress> {
        let inner = self.inner.lock();
        let mut out = Vec::new();

        for address in &inner.le_audio {
            let leads = inner
                .group_ids
                .get(address)
                .and_then(|gid| self.registry.group_leader(*gid))
                .is_some_and(|leader| &leader == address);
            if leads {
                out.push(address.clone());
            }
        }

        let hearing_aid_active = inner.active.get(&Transport::HearingAid);
        let mut seen_sync_ids: Vec<i64> = Vec::new();
        for address in &inner.hearing_aid {
            match inner.sync_ids.get(address) {
                Some(sync_id) => {
                    if seen_sync_ids.contains(sync_id) {
                        continue;
                    }
                    seen_sync_ids.push(*sync_id);
                    // Prefer the pair member the transport reports active.
                    let representative = inner
                        .hearing_aid
                        .iter()
                        .filter(|a| inner.sync_ids.get(*a) == Some(sync_id))
                        .find(|a| hearing_aid_active == Some(*a))
                        .unwrap_or(address);
                    out.push(representative.clone());
                }
                None => out.push(address.clone()),
            }
        }

        out.extend(inner.hfp.iter().cloned());
        out
    }

    pub fn is_member(&self, address: &DeviceAddress) -> bool {
        let inner = self.inner.lock();
        Transport::priority_order()
            .iter()
            .any(|t| inner.list(*t).contains(address))
    }

    pub fn is_empty(&self) -> bool {
        let inner = self.inner.lock();
        inner.hfp.is_empty() && inner.hearing_aid.is_empty() && inner.le_audio.is_empty()
    }

    pub fn device_count(&self) -> usize {
        let inner = self.inner.lock();
        inner.hfp.len() + inner.hearing_aid.len() + inner.le_audio.len()
    }

    /// Transport an accessory is reachable over, by static priority when it
    /// is a member of several.
    pub fn device_transport(&self, address: &DeviceAddress) -> Option<Transport> {
        let inner = self.inner.lock();
        Transport::priority_order()
            .iter()
            .copied()
            .find(|t| inner.list(*t).contains(address))
    }

    // =========================================================================
    // Active-device cache and tie-break
    // =========================================================================

    /// Record a registry active-device signal and report whether the cache
    /// crossed an empty/non-empty edge across all transports.
    pub fn record_active_device(
        &self,
        address: Option<DeviceAddress>,
        transport: Transport,
    ) -> ActiveDeviceEdge {
        let mut inner = self.inner.lock();
        let was_present = !inner.active.is_empty();

        match address {
            Some(address) => {
                trace!(device = %address, %transport, "Active device reported");
                inner.active.insert(transport, address.clone());
                inner.most_recent_active = Some((address, transport));
            }
            None => {
                trace!(%transport, "Active device cleared");
                inner.active.remove(&transport);
                if inner
                    .most_recent_active
                    .as_ref()
                    .is_some_and(|(_, t)| *t == transport)
                {
                    inner.most_recent_active = None;
                }
            }
        }

        let now_present = !inner.active.is_empty();
        match (was_present, now_present) {
            (false, true) => ActiveDeviceEdge::BecamePresent,
            (true, false) => ActiveDeviceEdge::BecameGone,
            _ => ActiveDeviceEdge::Unchanged,
        }
    }

    /// The accessory actually carrying audio right now, per the tie-break:
    /// with several transports simultaneously active, recency wins over
    /// static transport priority; priority applies only when the most-recent
    /// pointer no longer matches any live active entry.
    pub fn audio_active_device(&self) -> Option<DeviceAddress> {
        let inner = self.inner.lock();
        let mut live: Vec<&DeviceAddress> = Vec::new();
        for transport in Transport::priority_order() {
            if let Some(address) = inner.active.get(transport) {
                live.push(address);
            }
        }

        match live.len() {
            0 => None,
            1 => Some(live[0].clone()),
            _ => {
                if let Some((address, transport)) = &inner.most_recent_active {
                    if inner.active.get(transport) == Some(address) {
                        return Some(address.clone());
                    }
                }
                // Stale recency pointer: fall back to static priority.
                Some(live[0].clone())
            }
        }
    }

    /// Registry-reported active device for one transport.
    pub fn active_device(&self, transport: Transport) -> Option<DeviceAddress> {
        self.inner.lock().active.get(&transport).cloned()
    }

    // =========================================================================
    // Audio activation (route actor only)
    // =========================================================================

    /// Issue the transport-appropriate activation sequence for `address`.
    /// Returns false without side effects when the backend is unavailable or
    /// the activation call is rejected.
    pub async fn connect_audio(&self, address: &DeviceAddress, switching: bool) -> bool {
        let Some(transport) = self.device_transport(address) else {
            warn!(device = %address, "Connect requested for untracked device");
            return false;
        };

        if let Err(err) = self.registry.connect(address, transport, switching).await {
            warn!(device = %address, %transport, %err, "Audio connect failed");
            return false;
        }

        match transport {
            Transport::Hfp => true,
            Transport::HearingAid => self.set_hearing_aid_communication_device().await,
            Transport::LeAudio => self.set_le_audio_communication_device().await,
        }
    }

    /// Tear down any voice audio link and release whichever
    /// communication-device claim is held.
    pub async fn disconnect_audio(&self) {
        if let Err(err) = self.registry.disconnect_audio().await {
            warn!(%err, "Audio disconnect failed");
        }
        let claimed = self.inner.lock().comm_device.take();
        if let Some(claimed) = claimed {
            self.registry
                .clear_communication_device(claimed.transport())
                .await;
            debug!(transport = %claimed.transport(), "Communication device released");
        }
    }

    /// Claim the LE audio communication-device slot, releasing the
    /// hearing-aid slot first. Idempotent if already claimed.
    pub async fn set_le_audio_communication_device(&self) -> bool {
        self.set_communication_device(CommDevice::LeAudio).await
    }

    /// Claim the hearing-aid communication-device slot, releasing the LE
    /// audio slot first. Idempotent if already claimed.
    pub async fn set_hearing_aid_communication_device(&self) -> bool {
        self.set_communication_device(CommDevice::HearingAid).await
    }

    async fn set_communication_device(&self, wanted: CommDevice) -> bool {
        let current = self.inner.lock().comm_device;
        if current == Some(wanted) {
            return true;
        }
        if let Some(other) = current {
            self.registry
                .clear_communication_device(other.transport())
                .await;
            self.inner.lock().comm_device = None;
            debug!(transport = %other.transport(), "Released competing communication device");
        }

        match self
            .registry
            .set_communication_device(wanted.transport())
            .await
        {
            Ok(()) => {
                self.inner.lock().comm_device = Some(wanted);
                debug!(transport = %wanted.transport(), "Communication device claimed");
                true
            }
            Err(err) => {
                warn!(transport = %wanted.transport(), %err, "Communication device claim rejected");
                false
            }
        }
    }

    // =========================================================================
    // Hearing-aid handoff side channel
    // =========================================================================

    /// Remember the currently active hearing-aid accessory ahead of a
    /// deliberate transport handoff.
    pub fn cache_hearing_aid_device(&self) {
        let mut inner = self.inner.lock();
        inner.cached_hearing_aid = inner.active.get(&Transport::HearingAid).cloned();
        if let Some(device) = &inner.cached_hearing_aid {
            debug!(%device, "Hearing aid device cached for handoff");
        }
    }

    /// Re-assert the hearing-aid accessory remembered by the last cache
    /// call. The cache is consumed even when re-assertion fails.
    pub async fn restore_hearing_aid_device(&self) {
        let cached = self.inner.lock().cached_hearing_aid.take();
        let Some(device) = cached else {
            trace!("No cached hearing aid device to restore");
            return;
        };
        debug!(%device, "Restoring cached hearing aid device");
        if let Err(err) = self
            .registry
            .connect(&device, Transport::HearingAid, false)
            .await
        {
            warn!(%device, %err, "Failed to restore hearing aid device");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimRegistry;

    fn addr(s: &str) -> DeviceAddress {
        DeviceAddress::from(s)
    }

    fn manager() -> (DeviceManager, Arc<SimRegistry>) {
        let registry = Arc::new(SimRegistry::new());
        (DeviceManager::new(registry.clone()), registry)
    }

    #[test]
    fn test_membership_tracks_once_per_transport() {
        let (dm, _) = manager();
        assert!(dm.on_device_connected(&addr("AA"), Transport::Hfp));
        assert!(!dm.on_device_connected(&addr("AA"), Transport::Hfp));
        assert!(dm.on_device_connected(&addr("AA"), Transport::LeAudio));
        assert_eq!(dm.device_count(), 2);
        assert!(dm.is_member(&addr("AA")));
    }

    #[test]
    fn test_transport_resolution_uses_priority() {
        let (dm, _) = manager();
        dm.on_device_connected(&addr("AA"), Transport::Hfp);
        dm.on_device_connected(&addr("AA"), Transport::LeAudio);
        assert_eq!(dm.device_transport(&addr("AA")), Some(Transport::LeAudio));
    }

    #[test]
    fn test_tie_break_prefers_most_recent_over_priority() {
        let (dm, _) = manager();
        dm.on_device_connected(&addr("LE"), Transport::LeAudio);
        dm.on_device_connected(&addr("HF"), Transport::Hfp);

        dm.record_active_device(Some(addr("LE")), Transport::LeAudio);
        dm.record_active_device(Some(addr("HF")), Transport::Hfp);

        // HFP reported last, so recency beats LE audio's static priority.
        assert_eq!(dm.audio_active_device(), Some(addr("HF")));

        dm.record_active_device(Some(addr("LE")), Transport::LeAudio);
        assert_eq!(dm.audio_active_device(), Some(addr("LE")));
    }

    #[test]
    fn test_tie_break_single_active_wins_outright() {
        let (dm, _) = manager();
        dm.on_device_connected(&addr("HF"), Transport::Hfp);
        dm.record_active_device(Some(addr("HF")), Transport::Hfp);
        assert_eq!(dm.audio_active_device(), Some(addr("HF")));
    }

    #[test]
    fn test_tie_break_stale_pointer_falls_back_to_priority() {
        let (dm, _) = manager();
        dm.on_device_connected(&addr("HF"), Transport::Hfp);
        dm.on_device_connected(&addr("HA"), Transport::HearingAid);
        dm.on_device_connected(&addr("LE"), Transport::LeAudio);
        dm.record_active_device(Some(addr("LE")), Transport::LeAudio);
        dm.record_active_device(Some(addr("HF")), Transport::Hfp);
        dm.record_active_device(Some(addr("HA")), Transport::HearingAid);

        // Losing the most recently reported device leaves two live entries
        // and no recency pointer; static priority picks LE audio.
        dm.on_device_disconnected(&addr("HA"), Transport::HearingAid);
        assert_eq!(dm.audio_active_device(), Some(addr("LE")));
    }

    #[test]
    fn test_active_device_edges() {
        let (dm, _) = manager();
        assert_eq!(
            dm.record_active_device(Some(addr("AA")), Transport::Hfp),
            ActiveDeviceEdge::BecamePresent
        );
        assert_eq!(
            dm.record_active_device(Some(addr("BB")), Transport::LeAudio),
            ActiveDeviceEdge::Unchanged
        );
        assert_eq!(
            dm.record_active_device(None, Transport::Hfp),
            ActiveDeviceEdge::Unchanged
        );
        assert_eq!(
            dm.record_active_device(None, Transport::LeAudio),
            ActiveDeviceEdge::BecameGone
        );
    }

    #[test]
    fn test_disconnect_clears_stale_active_entries() {
        let (dm, _) = manager();
        dm.on_device_connected(&addr("AA"), Transport::Hfp);
        dm.record_active_device(Some(addr("AA")), Transport::Hfp);
        dm.on_device_disconnected(&addr("AA"), Transport::Hfp);
        assert_eq!(dm.audio_active_device(), None);
        assert!(dm.is_empty());
    }

    #[test]
    fn test_unique_devices_collapse_sync_pairs() {
        let (dm, registry) = manager();
        registry.set_sync_id(&addr("L"), 7);
        registry.set_sync_id(&addr("R"), 7);
        dm.on_device_connected(&addr("L"), Transport::HearingAid);
        dm.on_device_connected(&addr("R"), Transport::HearingAid);

        assert_eq!(dm.unique_connected_devices(), vec![addr("L")]);

        // The transport-reported active member becomes the representative.
        dm.record_active_device(Some(addr("R")), Transport::HearingAid);
        assert_eq!(dm.unique_connected_devices(), vec![addr("R")]);
    }

    #[test]
    fn test_unique_devices_keep_unpaired_hearing_aids() {
        let (dm, _) = manager();
        dm.on_device_connected(&addr("SOLO"), Transport::HearingAid);
        assert_eq!(dm.unique_connected_devices(), vec![addr("SOLO")]);
    }

    #[test]
    fn test_unique_devices_filter_non_leader_le_members() {
        let (dm, registry) = manager();
        registry.set_group(&addr("LEAD"), 3);
        registry.set_group(&addr("FOLLOW"), 3);
        registry.set_group_leader(3, &addr("LEAD"));
        dm.on_device_connected(&addr("LEAD"), Transport::LeAudio);
        dm.on_device_connected(&addr("FOLLOW"), Transport::LeAudio);

        assert_eq!(dm.unique_connected_devices(), vec![addr("LEAD")]);
    }

    #[test]
    fn test_group_node_added_tracks_new_device() {
        let (dm, _) = manager();
        assert!(dm.on_group_node_added(&addr("AA"), 4));
        assert!(dm.is_member(&addr("AA")));
        assert!(!dm.on_group_node_added(&addr("AA"), 4));
    }

    #[tokio::test]
    async fn test_connect_audio_unavailable_service() {
        let (dm, registry) = manager();
        dm.on_device_connected(&addr("AA"), Transport::Hfp);
        registry.set_service_down(Transport::Hfp, true);

        assert!(!dm.connect_audio(&addr("AA"), false).await);
        assert_eq!(registry.comm_device(), None);
    }

    #[tokio::test]
    async fn test_connect_audio_claims_comm_device_for_le() {
        let (dm, registry) = manager();
        registry.set_group(&addr("AA"), 1);
        dm.on_device_connected(&addr("AA"), Transport::LeAudio);

        assert!(dm.connect_audio(&addr("AA"), false).await);
        assert_eq!(registry.comm_device(), Some(Transport::LeAudio));
    }

    #[tokio::test]
    async fn test_comm_device_claims_are_exclusive_and_idempotent() {
        let (dm, registry) = manager();
        assert!(dm.set_hearing_aid_communication_device().await);
        assert_eq!(registry.comm_device(), Some(Transport::HearingAid));

        // Claiming LE audio releases hearing aid first.
        assert!(dm.set_le_audio_communication_device().await);
        assert_eq!(registry.comm_device(), Some(Transport::LeAudio));

        // Idempotent re-claim does not touch the registry again.
        let claims_before = registry.comm_device_claims();
        assert!(dm.set_le_audio_communication_device().await);
        assert_eq!(registry.comm_device_claims(), claims_before);
    }

    #[tokio::test]
    async fn test_disconnect_audio_releases_claims() {
        let (dm, registry) = manager();
        assert!(dm.set_le_audio_communication_device().await);
        dm.disconnect_audio().await;
        assert_eq!(registry.comm_device(), None);
        assert_eq!(registry.disconnect_count(), 1);
    }

    #[tokio::test]
    async fn test_cache_and_restore_hearing_aid_device() {
        let (dm, registry) = manager();
        dm.on_device_connected(&addr("HA"), Transport::HearingAid);
        dm.record_active_device(Some(addr("HA")), Transport::HearingAid);

        dm.cache_hearing_aid_device();
        dm.restore_hearing_aid_device().await;
        let calls = registry.connect_calls();
        assert_eq!(calls.last().unwrap().0, addr("HA"));

        // The cache is single-shot: a second restore is a no-op.
        dm.restore_hearing_aid_device().await;
        assert_eq!(registry.connect_calls().len(), calls.len());
    }
}
