// Domain Error Types

use thiserror::Error;

/// Precondition and boundary errors raised by the job state machine.
///
/// Every variant corresponds to one of the error kinds named by the
/// operation specs: missing/malformed caller arguments, lost ownership,
/// and state preconditions that do not hold. `NotFound` is deliberately
/// absent here - each operation that can target a missing job returns an
/// absent value (`None`/`false`) instead of raising.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("missing required argument: {0}")]
    ArgumentMissing(String),

    #[error("argument {name} has the wrong type: {reason}")]
    ArgumentType { name: String, reason: String },

    #[error("worker {caller} does not hold the lock for job {jid} (held by {holder:?})")]
    OwnershipLost {
        jid: String,
        caller: String,
        holder: Option<String>,
    },

    #[error("job {jid} is in state {actual}, operation requires {expected}")]
    StateViolation {
        jid: String,
        expected: String,
        actual: String,
    },
}

pub type Result<T> = std::result::Result<T, DomainError>;
