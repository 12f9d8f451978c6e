//! Live reload system.
//!
//! Watches the served tree, optionally rebuilds it, and pushes control
//! commands to connected browsers over WebSocket.

mod broadcaster;
mod build;
mod coordinator;
mod protocol;
mod session;
mod trigger;
mod websocket;

pub use build::BuildOutcome;
#[cfg(test)]
pub(crate) use build::SharedOutcome;
pub(crate) use coordinator::{Coordinator, CoordinatorHandle, CoordinatorSettings, Event, channel};
pub(crate) use session::is_boss_address;
pub(crate) use websocket::ws_handler;
