//! RouteActor - serialized owner of the routing state machine.
//!
//! All routing-state mutation is confined to this actor's run loop: registry
//! signals, user commands and timers arrive as [`RouteCommand`] messages and
//! are processed one at a time. Timeout and retry timers post their expiry
//! back through the same queue, so a timer can never race an in-flight
//! transition. Nothing here blocks the worker thread.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use super::commands::RouteCommand;
use super::handle::RouteHandle;
use super::types::{AddressBookkeeping, RouteSnapshot, RouteState};
use crate::config::RouteConfig;
use crate::device_manager::{ActiveDeviceEdge, DeviceManager};
use crate::listener::RouteListener;
use crate::types::{DeviceAddress, Transport};

pub struct RouteActor {
    device_manager: Arc<DeviceManager>,
    listener: Arc<dyn RouteListener>,
    config: RouteConfig,

    /// Sender side of the command queue, cloned into timer tasks.
    cmd_tx: mpsc::UnboundedSender<RouteCommand>,
    cmd_rx: mpsc::UnboundedReceiver<RouteCommand>,

    state: RouteState,

    /// Lazily created per-address bookkeeping, purged on every entry to Off.
    bookkeeping: HashMap<DeviceAddress, AddressBookkeeping>,

    /// Most-recently-used addresses, front is most recent. Consulted when a
    /// connect command omits a target.
    most_recently_used: Vec<DeviceAddress>,

    /// Identity of the currently armed connect timeout. Bumping it
    /// invalidates every timeout message armed before the bump.
    timeout_token: u64,
}

impl RouteActor {
    /// Spawn the actor and return the handle used to talk to it.
    pub fn spawn(
        device_manager: Arc<DeviceManager>,
        listener: Arc<dyn RouteListener>,
        config: RouteConfig,
    ) -> RouteHandle {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        let query_wait = config.query_wait();
        let actor = RouteActor {
            device_manager: device_manager.clone(),
            listener,
            config,
            cmd_tx: cmd_tx.clone(),
            cmd_rx,
            state: RouteState::Off,
            bookkeeping: HashMap::new(),
            most_recently_used: Vec::new(),
            timeout_token: 0,
        };

        tokio::spawn(actor.run());
        info!("Route actor spawned");

        RouteHandle::new(cmd_tx, device_manager, query_wait)
    }

    async fn run(mut self) {
        debug!("Route actor run loop started");

        while let Some(cmd) = self.cmd_rx.recv().await {
            trace!(?cmd, "Processing command");

            match cmd {
                RouteCommand::DeviceConnected { address, transport } => {
                    self.handle_device_connected(address, transport);
                }
                RouteCommand::DeviceDisconnected { address, transport } => {
                    self.handle_device_disconnected(address, transport);
                }
                RouteCommand::ActiveDeviceChanged { address, transport } => {
                    self.handle_active_device_changed(address, transport);
                }
                RouteCommand::GroupNodeAdded { address, group_id } => {
                    if self.device_manager.on_group_node_added(&address, group_id) {
                        self.listener.on_bluetooth_device_list_changed();
                    }
                }
                RouteCommand::GroupNodeRemoved { address, group_id } => {
                    self.device_manager.on_group_node_removed(&address, group_id);
                }
                RouteCommand::AudioOn { address } => {
                    self.handle_audio_on(address);
                }
                RouteCommand::AudioLost { address } => {
                    self.handle_audio_lost(address);
                }
                RouteCommand::ConnectAudio { address } => {
                    self.handle_connect(address, 0).await;
                }
                RouteCommand::DisconnectAudio => {
                    // State stays put until the stack confirms with an
                    // audio-lost signal.
                    debug!("Disconnect requested, tearing down audio route");
                    self.device_manager.disconnect_audio().await;
                }
                RouteCommand::CacheHearingAidDevice => {
                    self.device_manager.cache_hearing_aid_device();
                }
                RouteCommand::RestoreHearingAidDevice => {
                    self.device_manager.restore_hearing_aid_device().await;
                }
                RouteCommand::RetryConnect { address, attempt } => {
                    self.handle_retry(address, attempt).await;
                }
                RouteCommand::ConnectTimeout { address, token } => {
                    self.handle_timeout(address, token);
                }
                RouteCommand::QueryConnectedOrPending { response } => {
                    response.send(self.state.is_connected_or_pending());
                }
                RouteCommand::Snapshot { response } => {
                    let _ = response.send(self.snapshot());
                }
                RouteCommand::Shutdown => {
                    info!("Route actor received shutdown command");
                    break;
                }
            }
        }

        debug!("Route actor run loop terminated");
    }

    // =========================================================================
    // Membership signals
    // =========================================================================

    fn handle_device_connected(&mut self, address: DeviceAddress, transport: Transport) {
        if self.device_manager.on_device_connected(&address, transport) {
            // Fired before any routing-state consequence of the change.
            self.listener.on_bluetooth_device_list_changed();
        }
    }

    fn handle_device_disconnected(&mut self, address: DeviceAddress, transport: Transport) {
        if self.device_manager.on_device_disconnected(&address, transport) {
            self.listener.on_bluetooth_device_list_changed();
        }

        if self
            .state
            .address()
            .is_some_and(|a| !self.device_manager.is_member(a))
        {
            // The routed accessory left membership; resync with the stack.
            self.transition_to_actual_state("routed device lost");
        } else if self.state.is_off() {
            // Off already: the lost accessory's bookkeeping dies with it.
            self.bookkeeping.remove(&address);
        }
    }

    fn handle_active_device_changed(
        &mut self,
        address: Option<DeviceAddress>,
        transport: Transport,
    ) {
        match self.device_manager.record_active_device(address, transport) {
            ActiveDeviceEdge::BecamePresent => self.listener.on_bluetooth_active_device_present(),
            ActiveDeviceEdge::BecameGone => self.listener.on_bluetooth_active_device_gone(),
            ActiveDeviceEdge::Unchanged => {}
        }
    }

    // =========================================================================
    // Audio signals
    // =========================================================================

    fn handle_audio_on(&mut self, address: DeviceAddress) {
        if !self.device_manager.is_member(&address) {
            warn!(device = %address, "Audio reported on an untracked device");
            self.listener.on_unexpected_bluetooth_state_change();
            return;
        }

        match &self.state {
            RouteState::Connecting(pending) if *pending != address => {
                info!(
                    requested = %pending,
                    actual = %address,
                    "Stack routed audio to a different device than requested"
                );
            }
            RouteState::Off => {
                debug!(device = %address, "Unsolicited audio on, adopting");
            }
            _ => {}
        }

        self.enter_connected(address);
    }

    fn handle_audio_lost(&mut self, address: Option<DeviceAddress>) {
        if self.state.is_off() {
            debug!("Audio lost reported while already off");
            self.listener.on_unexpected_bluetooth_state_change();
            return;
        }
        if let Some(address) = &address {
            trace!(device = %address, "Audio lost");
        }
        self.transition_to_actual_state("audio lost");
    }

    // =========================================================================
    // Connect / retry / timeout
    // =========================================================================

    async fn handle_connect(&mut self, address: Option<DeviceAddress>, attempt: u8) {
        let Some(target) = self.select_target(address) else {
            debug!("No connectable bluetooth device");
            return;
        };

        match &self.state {
            RouteState::Connected(current) if *current == target => {
                // Idempotent: re-emit so the consumer can resynchronize.
                trace!(device = %target, "Already connected, re-emitting");
                self.listener.on_bluetooth_audio_connected(&target);
                return;
            }
            RouteState::Connecting(current) if *current == target => {
                trace!(device = %target, "Connect already in progress");
                return;
            }
            _ => {}
        }

        let switching = self.state.address().is_some_and(|a| *a != target);
        let entry = self.bookkeeping.entry(target.clone()).or_default();
        entry.attempts = attempt;

        if self.device_manager.connect_audio(&target, switching).await {
            self.enter_connecting(target);
        } else if attempt < self.config.max_connection_retries {
            let next = attempt + 1;
            debug!(
                device = %target,
                attempt = next,
                backoff_ms = self.config.retry_backoff_ms,
                "Connect failed, scheduling retry"
            );
            self.schedule_retry(target, next);
        } else {
            // Out of retries: absorbed silently past this log line.
            warn!(device = %target, "Connect failed, giving up after retries");
        }
    }

    async fn handle_retry(&mut self, address: DeviceAddress, attempt: u8) {
        match &self.state {
            RouteState::Off => {
                // A retry from an older attempt sequence carries a count at
                // or below the recorded one; only the live sequence advances.
                let recorded = self
                    .bookkeeping
                    .get(&address)
                    .map(|b| b.attempts)
                    .unwrap_or(0);
                if attempt <= recorded {
                    trace!(device = %address, attempt, recorded, "Stale retry discarded");
                    return;
                }
                debug!(device = %address, attempt, "Dispatching connect retry");
                self.handle_connect(Some(address), attempt).await;
            }
            RouteState::Connecting(current) if *current == address => {
                trace!(device = %address, "Retry ignored, connect in progress");
            }
            RouteState::Connected(current) if *current == address => {
                trace!(device = %address, "Retry ignored, already connected");
            }
            _ => {
                // An intervening connect moved the machine to a different
                // address; the retry no longer applies.
                debug!(device = %address, "Dropping retry superseded by another connect");
            }
        }
    }

    fn handle_timeout(&mut self, address: DeviceAddress, token: u64) {
        if token != self.timeout_token {
            trace!(device = %address, "Stale connect timeout discarded");
            return;
        }
        if !matches!(&self.state, RouteState::Connecting(a) if *a == address) {
            trace!(device = %address, "Connect timeout no longer applicable");
            return;
        }
        // The connection may have completed on another transport right
        // before the timer fired; resolve from the registry's view instead
        // of forcing Off.
        warn!(device = %address, "Connect timed out");
        self.transition_to_actual_state("connect timeout");
    }

    fn schedule_retry(&self, address: DeviceAddress, attempt: u8) {
        let tx = self.cmd_tx.clone();
        let backoff = self.config.retry_backoff();
        tokio::spawn(async move {
            tokio::time::sleep(backoff).await;
            let _ = tx.send(RouteCommand::RetryConnect { address, attempt });
        });
    }

    fn arm_connect_timeout(&self, address: DeviceAddress, token: u64) {
        let tx = self.cmd_tx.clone();
        let timeout = self.config.connect_timeout();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = tx.send(RouteCommand::ConnectTimeout { address, token });
        });
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    fn enter_connecting(&mut self, address: DeviceAddress) {
        // Arming a new timeout supersedes any timer tied to the previous
        // address.
        self.timeout_token += 1;
        self.arm_connect_timeout(address.clone(), self.timeout_token);
        self.bookkeeping.entry(address.clone()).or_default();

        info!(device = %address, "Bluetooth audio connecting");
        self.state = RouteState::Connecting(address.clone());
        self.listener.on_bluetooth_audio_connected(&address);
    }

    fn enter_connected(&mut self, address: DeviceAddress) {
        // Cancels the pending connect timeout and any retries for this
        // address.
        self.timeout_token += 1;
        self.bookkeeping.remove(&address);
        self.push_most_recently_used(&address);

        info!(device = %address, "Bluetooth audio connected");
        self.state = RouteState::Connected(address.clone());
        self.listener.on_bluetooth_audio_connected(&address);
    }

    fn enter_off(&mut self, reason: &str) {
        if self.state.is_off() {
            return;
        }
        self.timeout_token += 1;
        // Entering Off purges every sub-state instance.
        self.bookkeeping.clear();

        info!(reason, "Bluetooth audio off");
        self.state = RouteState::Off;
        self.listener.on_bluetooth_audio_disconnected();
    }

    /// Ask the Device Manager which accessory presently carries audio and
    /// adopt that as ground truth.
    fn transition_to_actual_state(&mut self, reason: &str) {
        let actual = self
            .device_manager
            .audio_active_device()
            .filter(|a| self.device_manager.is_member(a));
        match actual {
            Some(address) => {
                debug!(device = %address, reason, "Resynchronized to active device");
                self.enter_connected(address);
            }
            None => self.enter_off(reason),
        }
    }

    // =========================================================================
    // Target selection
    // =========================================================================

    /// Resolve the accessory a connect command should target: the explicit
    /// address when it is still a member, else the tie-broken audio-active
    /// device, else the most recently used member, else the first unique
    /// connected accessory.
    fn select_target(&self, address: Option<DeviceAddress>) -> Option<DeviceAddress> {
        if let Some(address) = address {
            if self.device_manager.is_member(&address) {
                return Some(address);
            }
            warn!(device = %address, "Requested device is not connected, selecting another");
        }

        if let Some(address) = self
            .device_manager
            .audio_active_device()
            .filter(|a| self.device_manager.is_member(a))
        {
            return Some(address);
        }

        if let Some(address) = self
            .most_recently_used
            .iter()
            .find(|a| self.device_manager.is_member(a))
        {
            return Some(address.clone());
        }

        self.device_manager
            .unique_connected_devices()
            .into_iter()
            .next()
            .or_else(|| self.device_manager.connected_devices().into_iter().next())
    }

    fn push_most_recently_used(&mut self, address: &DeviceAddress) {
        self.most_recently_used.retain(|a| a != address);
        self.most_recently_used.insert(0, address.clone());
    }

    fn snapshot(&self) -> RouteSnapshot {
        RouteSnapshot {
            state: self.state.clone(),
            tracked_addresses: self.bookkeeping.keys().cloned().collect(),
            most_recently_used: self.most_recently_used.clone(),
        }
    }
}
