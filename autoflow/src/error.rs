use thiserror::Error;

/// Error types for the capture/replay engine
#[derive(Debug, Error)]
pub enum AutoflowError {
    /// The operation was invoked in the wrong session state
    /// (e.g. start while already recording, resume while not paused)
    #[error("invalid operation for current state: {0}")]
    StateConflict(String),

    /// An OS hook or input-synthesis facility was unavailable or failed
    #[error("input facility unavailable: {0}")]
    ResourceUnavailable(String),

    /// The trace was missing or empty when playback was requested
    #[error("no trace data available: {0}")]
    DataUnavailable(String),

    /// Reading, writing, or parsing the persisted trace or config failed
    #[error("persistence failure: {0}")]
    PersistenceFailure(String),

    /// The schedule configuration was malformed
    #[error("invalid configuration: {0}")]
    ConfigurationInvalid(String),
}

impl From<std::io::Error> for AutoflowError {
    fn from(err: std::io::Error) -> Self {
        AutoflowError::PersistenceFailure(err.to_string())
    }
}

impl From<serde_json::Error> for AutoflowError {
    fn from(err: serde_json::Error) -> Self {
        AutoflowError::PersistenceFailure(err.to_string())
    }
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, AutoflowError>;
