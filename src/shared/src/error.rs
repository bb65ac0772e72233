use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure taxonomy shared by every layer.
///
/// Execution, timeout and parse failures are normally folded back into data
/// (`CommandOutput`, `InteractionResponse`) before they cross a component
/// boundary. `Provider` and `InvalidState` are the only variants callers are
/// expected to see.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Command execution error: {0}")]
    Execution(String),

    #[error("Command timed out after {0} seconds")]
    Timeout(u64),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Provider misconfiguration aborts the current request; everything else
    /// is recoverable.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Provider(_))
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Execution(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(format!("JSON error: {}", err))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Http(err.to_string())
    }
}
