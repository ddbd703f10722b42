/// Error types for the shim and its plugins
pub mod error;

/// Metric data model
pub mod metric;

/// Line protocol rendering and parsing
pub mod line_protocol;

/// Serialized writer over the output stream
pub mod writer;

/// Control events for the run loop
pub mod events;

/// Sink that plugins report measurements into
pub mod accumulator;

/// Control stream listener
pub mod signal;

/// Input plugin contract
pub mod plugin;

/// Run loop hosting one input plugin
pub mod shim;

/// Configuration loading and plugin registry
pub mod config;

/// Built-in input plugins
pub mod inputs;

#[cfg(test)]
mod testutil;

// Re-export commonly used types
pub use accumulator::Accumulator;
pub use error::{ConfigError, LineProtocolError, PluginError, ShimError, WriteError};
pub use metric::{FieldValue, Metric};
pub use plugin::{Capabilities, Input};
pub use shim::{PollInterval, Shim};
