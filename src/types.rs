//! Core identifier types shared across the routing core.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque stable identifier of a remote accessory.
///
/// Treated as an opaque key everywhere; the routing core never parses it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceAddress(String);

impl DeviceAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DeviceAddress {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for DeviceAddress {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Transport a call-audio accessory is reachable over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Transport {
    /// Legacy headset profile.
    Hfp,
    /// Hearing-aid profile, usually a synchronized left/right pair.
    HearingAid,
    /// LE audio group presented as one logical sink.
    LeAudio,
}

impl Transport {
    /// All transports in static priority order, highest first.
    ///
    /// Priority only disambiguates stale cached active devices; live signals
    /// are resolved by recency.
    pub fn priority_order() -> &'static [Transport] {
        &[Transport::LeAudio, Transport::HearingAid, Transport::Hfp]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Hfp => "hfp",
            Transport::HearingAid => "hearing-aid",
            Transport::LeAudio => "le-audio",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_display_roundtrip() {
        let addr = DeviceAddress::from("AA:BB:CC:DD:EE:FF");
        assert_eq!(addr.to_string(), "AA:BB:CC:DD:EE:FF");
        assert_eq!(addr.as_str(), "AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn test_priority_order_highest_first() {
        let order = Transport::priority_order();
        assert_eq!(order[0], Transport::LeAudio);
        assert_eq!(order[2], Transport::Hfp);
    }
}
