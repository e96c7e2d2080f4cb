//! Engine client error types

use std::time::Duration;

use thiserror::Error;

/// Failures talking to the external search process.
///
/// Cloneable so it can ride along on the broadcast event stream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Engine unavailable: {0}")]
    Unavailable(String),

    #[error("Engine gave no bestmove within {0:?}")]
    Timeout(Duration),

    #[error("Malformed engine output: {0}")]
    MalformedOutput(String),

    #[error("Engine I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::Io(e.to_string())
    }
}
