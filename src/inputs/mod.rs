//! Input plugins shipped with the shim binary

pub mod heartbeat;
pub mod uptime;

pub use heartbeat::Heartbeat;
pub use uptime::Uptime;

use crate::config::Registry;

/// Registry holding every built-in input
pub fn builtin_registry() -> Registry {
    let mut registry = Registry::new();
    registry.add::<Heartbeat>("heartbeat");
    registry.add::<Uptime>("uptime");
    registry
}
