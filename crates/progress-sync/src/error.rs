// crates/progress-sync/src/error.rs
//! Error types for progress synchronization

use crate::config::ValidationError;
use thiserror::Error;

/// Result type for progress operations
pub type ProgressResult<T> = Result<T, ProgressError>;

/// Errors that can occur while synchronizing playback progress
#[derive(Debug, Error)]
pub enum ProgressError {
    /// Inbound message failed shape validation
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Inbound message carried a type we do not handle
    #[error("Unknown message type: {0}")]
    UnknownMessageType(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration values out of range
    #[error("Invalid configuration: {}", format_validation(.0))]
    InvalidConfig(Vec<ValidationError>),

    /// Configuration document could not be parsed
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// A shared lock was poisoned by a panicking holder
    #[error("Lock poisoned")]
    LockPoisoned,

    /// The recurring sync check needs a tokio runtime
    #[error("Sync scheduler requires a running tokio runtime")]
    SchedulerUnavailable,

    /// Outbound delivery failed
    #[error("Transport error: {0}")]
    Transport(String),
}

fn format_validation(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl<T> From<std::sync::PoisonError<T>> for ProgressError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        ProgressError::LockPoisoned
    }
}
