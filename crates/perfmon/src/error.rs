//! Error types for perfmon

use std::time::Duration;
use thiserror::Error;

use crate::types::CounterIndex;

/// Performance monitor errors
#[derive(Error, Debug)]
pub enum PerfMonError {
    /// The request channel rejected a command
    #[error("Transport error: {0}")]
    Transport(String),

    /// No indication arrived before the response timeout
    #[error("Timed out after {waited:?} waiting for counter {index}")]
    Timeout {
        /// Counter that was being read
        index: CounterIndex,
        /// How long the reader waited
        waited: Duration,
    },

    /// The read was cancelled before a response arrived
    #[error("Read of counter {index} cancelled")]
    Cancelled {
        /// Counter that was being read
        index: CounterIndex,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Counter list could not be interpreted
    #[error("Counter list error: {0}")]
    CounterList(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for perfmon operations
pub type Result<T> = std::result::Result<T, PerfMonError>;
