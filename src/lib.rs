//! btroute - Bluetooth call-audio routing core
//!
//! Decides which wireless accessory carries call audio across the legacy
//! headset profile, the hearing-aid profile and LE audio groups; drives
//! connect attempts with bounded retries and timeouts; and reconciles its
//! belief with asynchronous, sometimes contradictory, stack signals.
//!
//! The core is a serialized route actor ([`route::RouteActor`]) over a
//! [`DeviceManager`] that tracks membership, active devices and
//! communication-device claims. The surrounding stack is abstracted as a
//! [`DeviceRegistry`]; routing notifications flow out through a
//! [`RouteListener`]. Routing state is purely in-memory and rebuilt from
//! live registry signals.

pub mod config;
pub mod device_manager;
pub mod error;
pub mod listener;
pub mod registry;
pub mod route;
pub mod sim;
pub mod types;

pub use config::RouteConfig;
pub use device_manager::DeviceManager;
pub use error::{RegistryError, RegistryResult};
pub use listener::RouteListener;
pub use registry::DeviceRegistry;
pub use route::{RouteActor, RouteHandle, RouteSnapshot, RouteState};
pub use types::{DeviceAddress, Transport};
