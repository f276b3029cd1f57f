use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    /// Caller invoked an operation whose precondition does not hold,
    /// e.g. presenting with nothing pending or resolving twice.
    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Malformed RPC envelope: missing or invalid `{field}`")]
    MalformedEnvelope { field: &'static str },

    /// The signing/execution collaborator rejected the call.
    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Channel `{0}` is closed")]
    ChannelClosed(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[cfg(feature = "native")]
    #[error("Configuration error: {0}")]
    Config(String),

    #[cfg(feature = "native")]
    #[error("I/O error: {0}")]
    Io(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialization(String),

    #[error("Lock poisoned: {0}")]
    Poisoned(&'static str),
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(feature = "native")]
impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::Io(err.to_string())
    }
}

#[cfg(feature = "native")]
impl From<config::ConfigError> for CoreError {
    fn from(err: config::ConfigError) -> Self {
        CoreError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for CoreError {
    fn from(err: toml::ser::Error) -> Self {
        CoreError::TomlSerialization(err.to_string())
    }
}
