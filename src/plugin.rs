//! Capability contract for input plugins
//!
//! An input may be a *polling* plugin (the shim calls [`Input::gather`] on a
//! timer or on request), a *service* plugin (the shim calls
//! [`Input::start`] once and [`Input::stop`] at shutdown, and the plugin
//! reports from its own threads), both, or neither. The shim never guesses:
//! it asks [`Input::capabilities`] and only calls what is advertised.

use crate::accumulator::Accumulator;
use crate::error::PluginError;

/// Which parts of the plugin contract an input implements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// `gather` may be called repeatedly
    pub polling: bool,
    /// `start`/`stop` own the plugin lifecycle
    pub service: bool,
}

impl Capabilities {
    pub const NONE: Capabilities = Capabilities {
        polling: false,
        service: false,
    };

    pub const POLLING: Capabilities = Capabilities {
        polling: true,
        service: false,
    };

    pub const SERVICE: Capabilities = Capabilities {
        polling: false,
        service: true,
    };

    pub const BOTH: Capabilities = Capabilities {
        polling: true,
        service: true,
    };
}

/// A data-collection plugin hosted by the shim
#[cfg_attr(test, mockall::automock)]
pub trait Input: Send {
    /// One-line description shown by `--list-inputs`
    fn description(&self) -> String {
        String::new()
    }

    /// Example TOML settings shown by `--list-inputs`
    fn sample_config(&self) -> String {
        String::new()
    }

    /// Which capabilities the shim may use
    fn capabilities(&self) -> Capabilities;

    /// Validate settings once, before the plugin is scheduled
    fn init(&mut self) -> Result<(), PluginError> {
        Ok(())
    }

    /// Collect once and report into `acc` (polling capability)
    fn gather(&mut self, _acc: &Accumulator) -> Result<(), PluginError> {
        Err(PluginError::Unsupported("gather"))
    }

    /// Begin background collection (service capability)
    ///
    /// Background work keeps a clone of `acc` and reports through it.
    fn start(&mut self, _acc: &Accumulator) -> Result<(), PluginError> {
        Err(PluginError::Unsupported("start"))
    }

    /// Stop background collection (service capability)
    ///
    /// Called exactly once at shutdown, and must cope with being called after
    /// earlier errors.
    fn stop(&mut self) -> Result<(), PluginError> {
        Ok(())
    }
}
