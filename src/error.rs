//! Error types for speechrt

use crate::engine::EngineState;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Main error type for engine and pipeline operations
#[derive(Error, Debug)]
pub enum EngineError {
    /// The requested transition is not legal from the current state.
    /// State is left untouched.
    #[error("{operation} not allowed in state {state}")]
    InvalidTransition {
        operation: &'static str,
        state: EngineState,
    },

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// A backend capability (allocation, synthesis, playback...) failed
    #[error("Backend error: {0}")]
    Backend(String),

    /// The engine was deallocated while a caller was waiting on it
    #[error("Engine deallocated while waiting for {0}")]
    Deallocated(String),

    #[error("Output pipeline has been shut down")]
    ShutDown,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("INI parse error: {0}")]
    IniParse(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for speechrt operations
pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    /// True for failures that leave the engine untouched (rejected calls)
    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, EngineError::InvalidTransition { .. })
    }
}

impl From<String> for EngineError {
    fn from(s: String) -> Self {
        EngineError::Other(s)
    }
}

impl From<&str> for EngineError {
    fn from(s: &str) -> Self {
        EngineError::Other(s.to_string())
    }
}
