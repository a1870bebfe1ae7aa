//! Reader error types.

use crate::config::ConfigError;
use smlmeter_protocol::{DecodeError, FailureKind};
use thiserror::Error;

/// Reader errors.
#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("fatal decode error: {0}")]
    Fatal(DecodeError),
}

impl ReaderError {
    /// Returns the failure code for decode errors.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            ReaderError::Fatal(e) => Some(e.failure_kind()),
            _ => None,
        }
    }
}
