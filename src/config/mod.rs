//! Configuration file loading and the input plugin registry

pub mod duration;
pub mod env;
pub mod loader;
pub mod registry;

pub use duration::parse_duration;
pub use loader::{load_config, load_config_with, parse_config, single_input};
pub use registry::{InputInfo, Registry};
