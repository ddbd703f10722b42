use thiserror::Error;

/// Errors returned by plugin code from `init`, `gather`, `start` and `stop`
#[derive(Error, Debug)]
pub enum PluginError {
    #[error("{0}")]
    Failed(String),

    #[error("Operation not supported by this plugin: {0}")]
    Unsupported(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PluginError {
    /// Shorthand for a plugin failure carrying only a message
    pub fn failed(message: impl Into<String>) -> Self {
        PluginError::Failed(message.into())
    }
}

/// Errors that can occur when constructing a metric
#[derive(Error, Debug, PartialEq, Eq)]
pub enum MetricError {
    #[error("Metric name must not be empty")]
    EmptyName,

    #[error("Metric '{0}' has no fields")]
    NoFields(String),

    #[error("Metric '{0}' has a field with an empty key")]
    EmptyFieldKey(String),
}

/// Errors from rendering or parsing line protocol text
#[derive(Error, Debug, PartialEq, Eq)]
pub enum LineProtocolError {
    #[error("Metric '{0}' has no field that can be serialized")]
    NoSerializableFields(String),

    #[error("Timestamp of metric '{0}' is out of the nanosecond range")]
    TimestampOutOfRange(String),

    #[error("Failed to parse line: {0}")]
    ParseError(String),
}

/// Errors that can occur while writing metrics to the output stream
#[derive(Error, Debug)]
pub enum WriteError {
    #[error("Failed to write metric: {0}")]
    Io(#[from] std::io::Error),

    #[error("Output stream is closed after an earlier write failure")]
    Closed,

    #[error("Failed to serialize metric: {0}")]
    Serialize(#[from] LineProtocolError),
}

impl WriteError {
    /// Whether this error means the output stream is unusable
    pub fn is_fatal(&self) -> bool {
        !matches!(self, WriteError::Serialize(_))
    }
}

/// Errors that can occur during configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Input plugin '{0}' is not registered")]
    UnknownPlugin(String),

    #[error("Invalid configuration for input '{plugin}': {message}")]
    InvalidPlugin { plugin: String, message: String },

    #[error("Expected exactly one input plugin, found {0}")]
    PluginCount(usize),

    #[error("Invalid duration '{input}': {message}")]
    InvalidDuration { input: String, message: String },

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}

/// Terminal outcomes of the shim
#[derive(Error, Debug)]
pub enum ShimError {
    #[error("No input plugin was added to the shim")]
    NoInput,

    #[error("The shim already hosts an input plugin")]
    InputAlreadySet,

    #[error("Failed to initialize input: {0}")]
    Init(#[source] PluginError),

    #[error("Failed to start input: {0}")]
    Start(#[source] PluginError),

    #[error("Output stream failed: {0}")]
    Write(#[from] WriteError),

    #[error("Failed to spawn thread: {0}")]
    Spawn(#[source] std::io::Error),
}
