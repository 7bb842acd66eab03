//! Route state machine value types.

use crate::types::DeviceAddress;

/// Top-level routing disposition. Exactly one variant is current at any
/// time; the per-address state space is collapsed into this fixed-shape
/// value plus a side bookkeeping map keyed by address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteState {
    /// No accessory carries call audio.
    Off,
    /// A connect was issued and the stack has not yet reported audio up.
    Connecting(DeviceAddress),
    /// The stack reports call audio routed to the accessory.
    Connected(DeviceAddress),
}

impl RouteState {
    /// The accessory this state refers to, if any.
    pub fn address(&self) -> Option<&DeviceAddress> {
        match self {
            RouteState::Off => None,
            RouteState::Connecting(address) | RouteState::Connected(address) => Some(address),
        }
    }

    pub fn is_off(&self) -> bool {
        matches!(self, RouteState::Off)
    }

    /// True in both `Connecting` and `Connected`, matching the semantics of
    /// the connected-or-pending query.
    pub fn is_connected_or_pending(&self) -> bool {
        !self.is_off()
    }
}

/// Per-address transient bookkeeping, created lazily on first reference and
/// purged when the machine returns to `Off`.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct AddressBookkeeping {
    /// Retry attempts issued so far for this address.
    pub attempts: u8,
}

/// Point-in-time view of the actor's internals, for diagnostics and tests.
#[derive(Debug, Clone)]
pub struct RouteSnapshot {
    pub state: RouteState,
    /// Addresses with live bookkeeping entries.
    pub tracked_addresses: Vec<DeviceAddress>,
    /// Most-recently-used order, front is most recent.
    pub most_recently_used: Vec<DeviceAddress>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_address() {
        assert_eq!(RouteState::Off.address(), None);
        let addr = DeviceAddress::from("AA");
        assert_eq!(
            RouteState::Connecting(addr.clone()).address(),
            Some(&addr)
        );
        assert_eq!(RouteState::Connected(addr.clone()).address(), Some(&addr));
    }

    #[test]
    fn test_connected_or_pending() {
        assert!(!RouteState::Off.is_connected_or_pending());
        assert!(RouteState::Connecting(DeviceAddress::from("AA")).is_connected_or_pending());
        assert!(RouteState::Connected(DeviceAddress::from("AA")).is_connected_or_pending());
    }
}
