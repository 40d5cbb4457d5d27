// Central Error Type for the Core Crate

use thiserror::Error;

/// Engine-level error type returned by every state machine operation.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    #[error("store error: {0}")]
    Store(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
