use crate::config::env::{expand_value, process_env};
use crate::config::registry::Registry;
use crate::error::ConfigError;
use crate::plugin::Input;
use log::{debug, info};
use std::fs;
use std::path::Path;
use toml::{Table, Value};

/// Load every input declared in the TOML file at `path`
///
/// String settings may reference environment variables as `$NAME` or
/// `${NAME}`. Plugins are returned in declaration order.
///
/// # Arguments
///
/// * `path` - Configuration file with an `[inputs]` table
/// * `registry` - Constructors for the input names the file may use
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read or parsed, names an
/// unknown input, or holds settings the input rejects.
pub fn load_config(path: &Path, registry: &Registry) -> Result<Vec<Box<dyn Input>>, ConfigError> {
    load_config_with(path, registry, &process_env)
}

/// Like [`load_config`], resolving variables through `lookup`
pub fn load_config_with<F>(
    path: &Path,
    registry: &Registry,
    lookup: &F,
) -> Result<Vec<Box<dyn Input>>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let text = fs::read_to_string(path)
        .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;
    let inputs = parse_config(&text, registry, lookup)?;
    info!("Loaded {} input(s) from {}", inputs.len(), path.display());
    Ok(inputs)
}

/// Build inputs from configuration text
pub fn parse_config<F>(
    text: &str,
    registry: &Registry,
    lookup: &F,
) -> Result<Vec<Box<dyn Input>>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut document: Table = toml::from_str(text)?;

    let inputs = match document.remove("inputs") {
        Some(Value::Table(inputs)) => inputs,
        Some(_) => return Err(ConfigError::ParseError("'inputs' must be a table".to_string())),
        None => return Err(ConfigError::ParseError("missing [inputs] table".to_string())),
    };
    for key in document.keys() {
        debug!("Ignoring top-level config key '{}'", key);
    }

    let mut built = Vec::new();
    for (name, entry) in inputs {
        match entry {
            Value::Table(settings) => {
                built.push(build_input(&name, settings, registry, lookup)?);
            }
            Value::Array(entries) => {
                for entry in entries {
                    let Value::Table(settings) = entry else {
                        return Err(ConfigError::ParseError(format!(
                            "entries of inputs.{} must be tables",
                            name
                        )));
                    };
                    built.push(build_input(&name, settings, registry, lookup)?);
                }
            }
            _ => {
                return Err(ConfigError::ParseError(format!(
                    "inputs.{} must be a table or an array of tables",
                    name
                )))
            }
        }
    }

    Ok(built)
}

/// Reduce the configured inputs to the single one a shim can host
pub fn single_input(mut inputs: Vec<Box<dyn Input>>) -> Result<Box<dyn Input>, ConfigError> {
    match inputs.len() {
        1 => inputs.pop().ok_or(ConfigError::PluginCount(0)),
        n => Err(ConfigError::PluginCount(n)),
    }
}

fn build_input<F>(
    name: &str,
    settings: Table,
    registry: &Registry,
    lookup: &F,
) -> Result<Box<dyn Input>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut settings = Value::Table(settings);
    expand_value(&mut settings, lookup);
    debug!("Building input '{}'", name);
    registry.construct(name, settings)
}
