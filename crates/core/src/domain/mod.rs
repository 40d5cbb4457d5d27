// Domain Layer - Pure business logic and entities

pub mod error;
pub mod job;

pub use error::DomainError;
pub use job::{Failure, HistoryEntry, Job, JobId, JobPayload, JobState, QueueId, WorkerId};
