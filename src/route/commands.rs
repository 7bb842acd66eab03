//! Command messages for the route actor.
//!
//! Everything that can touch routing state arrives through this enum:
//! registry signals, user commands, timer expirations, and queries. Timers
//! are ordinary messages, so their firing cannot race an in-flight
//! transition.

use super::types::RouteSnapshot;
use crate::types::{DeviceAddress, Transport};
use tokio::sync::oneshot;

/// Reply channel for the connected-or-pending query.
///
/// The blocking flavor is a single-slot rendezvous for callers outside the
/// runtime; the async flavor serves callers already on it.
#[derive(Debug)]
pub enum QueryReply {
    Blocking(std::sync::mpsc::SyncSender<bool>),
    Async(oneshot::Sender<bool>),
}

impl QueryReply {
    pub fn send(self, value: bool) {
        match self {
            // A caller that already gave up on its bounded wait simply
            // drops the receiver; that is not an error here.
            QueryReply::Blocking(tx) => {
                let _ = tx.try_send(value);
            }
            QueryReply::Async(tx) => {
                let _ = tx.send(value);
            }
        }
    }
}

/// Commands processed by the route actor, one at a time.
#[derive(Debug)]
pub enum RouteCommand {
    // -------------------------------------------------------------------------
    // Registry signals
    // -------------------------------------------------------------------------
    /// An accessory became reachable on a transport.
    DeviceConnected {
        address: DeviceAddress,
        transport: Transport,
    },

    /// An accessory was lost on a transport.
    DeviceDisconnected {
        address: DeviceAddress,
        transport: Transport,
    },

    /// The transport's own notion of "currently active" changed.
    ActiveDeviceChanged {
        address: Option<DeviceAddress>,
        transport: Transport,
    },

    /// Asynchronous LE audio group membership resolution.
    GroupNodeAdded {
        address: DeviceAddress,
        group_id: i32,
    },

    GroupNodeRemoved {
        address: DeviceAddress,
        group_id: i32,
    },

    /// The stack reports call audio up on `address`.
    AudioOn { address: DeviceAddress },

    /// The stack reports call audio down. `address` is the accessory it was
    /// last reported on, when the stack names one.
    AudioLost { address: Option<DeviceAddress> },

    // -------------------------------------------------------------------------
    // User commands
    // -------------------------------------------------------------------------
    /// Route call audio to `address`, or to an automatically selected
    /// accessory when omitted.
    ConnectAudio { address: Option<DeviceAddress> },

    /// Tear down the audio route. State changes only once the stack
    /// confirms with an audio-lost signal.
    DisconnectAudio,

    /// Remember the active hearing-aid accessory ahead of a transport
    /// handoff.
    CacheHearingAidDevice,

    /// Re-assert the hearing-aid accessory remembered by the last cache.
    RestoreHearingAidDevice,

    // -------------------------------------------------------------------------
    // Timer messages (posted back by the actor's own timers)
    // -------------------------------------------------------------------------
    /// Delayed retry of a failed connect, carrying the attempt count.
    RetryConnect { address: DeviceAddress, attempt: u8 },

    /// Connect timeout expiry. `token` identifies the arming transition;
    /// stale tokens are discarded at dispatch.
    ConnectTimeout { address: DeviceAddress, token: u64 },

    // -------------------------------------------------------------------------
    // Request-response
    // -------------------------------------------------------------------------
    /// Is the machine in `Connecting` or `Connected`?
    QueryConnectedOrPending { response: QueryReply },

    /// Diagnostics snapshot of the actor's internals.
    Snapshot {
        response: oneshot::Sender<RouteSnapshot>,
    },

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------
    /// Gracefully stop the actor.
    Shutdown,
}
