//! Route state machine: a serialized actor owning the Off / Connecting /
//! Connected disposition per accessory, with retry and timeout scheduling
//! delivered through its own message queue.

mod actor;
mod commands;
mod handle;
mod types;


pub use actor::RouteActor;
pub use commands::{QueryReply, RouteCommand};
pub use handle::RouteHandle;
pub use types::{RouteSnapshot, RouteState};
