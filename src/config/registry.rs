use crate::error::ConfigError;
use crate::plugin::Input;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use toml::{Table, Value};

type Constructor = Box<dyn Fn(Value) -> Result<Box<dyn Input>, toml::de::Error> + Send + Sync>;

/// Listing entry for a registered input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputInfo {
    pub name: String,
    pub description: String,
    pub sample_config: String,
}

/// Name to constructor table for input plugins
///
/// Constructors deserialize the plugin straight from its TOML table, so
/// a plugin declares its settings as serde fields with defaults.
///
/// # Example
///
/// ```
/// use execd_shim::config::Registry;
/// use execd_shim::inputs::uptime::Uptime;
///
/// let mut registry = Registry::new();
/// registry.add::<Uptime>("uptime");
/// assert!(registry.construct_default("uptime").is_ok());
/// ```
#[derive(Default)]
pub struct Registry {
    constructors: BTreeMap<String, Constructor>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` under `name`, replacing any earlier registration
    pub fn add<T>(&mut self, name: &str)
    where
        T: Input + DeserializeOwned + Default + 'static,
    {
        let constructor: Constructor = Box::new(|settings: Value| {
            let input: T = settings.try_into()?;
            Ok(Box::new(input) as Box<dyn Input>)
        });
        self.constructors.insert(name.to_string(), constructor);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Registered names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    /// Build the input `name` from its settings table
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::UnknownPlugin` for an unregistered name and
    /// `ConfigError::InvalidPlugin` if the settings do not bind to the plugin.
    pub fn construct(&self, name: &str, settings: Value) -> Result<Box<dyn Input>, ConfigError> {
        let constructor = self
            .constructors
            .get(name)
            .ok_or_else(|| ConfigError::UnknownPlugin(name.to_string()))?;

        constructor(settings).map_err(|e| ConfigError::InvalidPlugin {
            plugin: name.to_string(),
            message: e.message().trim().to_string(),
        })
    }

    /// Build the input `name` with all settings at their defaults
    pub fn construct_default(&self, name: &str) -> Result<Box<dyn Input>, ConfigError> {
        self.construct(name, Value::Table(Table::new()))
    }

    /// Description and sample configuration of every registered input
    pub fn describe(&self) -> Vec<InputInfo> {
        self.names()
            .filter_map(|name| {
                let input = self.construct_default(name).ok()?;
                Some(InputInfo {
                    name: name.to_string(),
                    description: input.description(),
                    sample_config: input.sample_config(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::Capabilities;
    use serde::Deserialize;

    #[derive(Debug, Default, Deserialize)]
    #[serde(default, deny_unknown_fields)]
    struct Probe {
        target: String,
        retries: u32,
    }

    impl Input for Probe {
        fn description(&self) -> String {
            format!("Probe {} with {} retries", self.target, self.retries)
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities::POLLING
        }
    }

    #[derive(Debug, Default, Deserialize)]
    struct Strict {
        #[allow(dead_code)]
        endpoint: String,
    }

    impl Input for Strict {
        fn capabilities(&self) -> Capabilities {
            Capabilities::NONE
        }
    }

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry.add::<Probe>("probe");
        registry.add::<Strict>("strict");
        registry
    }

    fn table(text: &str) -> Value {
        Value::Table(toml::from_str(text).unwrap())
    }

    #[test]
    fn test_construct_binds_settings() {
        let input = registry()
            .construct("probe", table("target = \"db\"\nretries = 3"))
            .unwrap();
        assert_eq!(input.description(), "Probe db with 3 retries");
    }

    #[test]
    fn test_construct_default_uses_defaults() {
        let input = registry().construct_default("probe").unwrap();
        assert_eq!(input.description(), "Probe  with 0 retries");
    }

    #[test]
    fn test_unknown_plugin() {
        assert!(matches!(
            registry().construct_default("missing"),
            Err(ConfigError::UnknownPlugin(name)) if name == "missing"
        ));
    }

    #[test]
    fn test_bind_failures() {
        let registry = registry();

        for (name, settings) in [
            ("probe", "retries = \"three\""),
            ("probe", "unexpected = true"),
            ("strict", ""),
        ] {
            match registry.construct(name, table(settings)) {
                Err(ConfigError::InvalidPlugin { plugin, message }) => {
                    assert_eq!(plugin, name);
                    assert!(!message.is_empty());
                }
                Err(e) => panic!("Unexpected error for {:?}: {}", settings, e),
                Ok(_) => panic!("Expected bind failure for {:?}", settings),
            }
        }
    }

    #[test]
    fn test_describe_lists_constructible_inputs() {
        let infos = registry().describe();
        // `strict` has a required field and cannot be built from defaults
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].name, "probe");
        assert_eq!(registry().names().collect::<Vec<_>>(), vec!["probe", "strict"]);
        assert!(registry().contains("strict"));
        assert!(!registry().contains("missing"));
    }
}
