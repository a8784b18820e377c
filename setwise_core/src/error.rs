//! Error types for the setwise_core library.

use crate::types::{ExerciseId, ProgramDayId};
use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for setwise_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A mutation or submission was attempted without a live session
    #[error("No active workout session")]
    NoActiveSession,

    /// A session is already live and the caller did not confirm discarding it
    #[error("A workout session for program day {0} is already in progress")]
    SessionInProgress(ProgramDayId),

    /// The exercise cannot be worked until the one before it is completed
    #[error("Exercise {0} is locked until the previous exercise is completed")]
    ExerciseLocked(ExerciseId),

    /// Rep selection was attempted against a spec that yields no options
    #[error("Malformed rep specification: {0:?}")]
    MalformedRepSpecification(String),

    /// A state machine action was issued in a phase that does not accept it
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// The workout log could not be delivered to the backend
    #[error("Submission failed: {0}")]
    Submission(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(code) => {
                Error::Submission(format!("backend responded with status {}", code))
            }
            other => Error::Submission(other.to_string()),
        }
    }
}
