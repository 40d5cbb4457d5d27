// `complete`'s options, validated exhaustively at the boundary instead of
// threaded through as a flat key/value pair list.

use crate::domain::{DomainError, JobId};

#[derive(Debug, Clone, Default)]
pub struct CompleteOptions {
    pub next: Option<String>,
    pub delay: i64,
    pub depends: Vec<JobId>,
}

impl CompleteOptions {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.delay > 0 && !self.depends.is_empty() {
            return Err(DomainError::ArgumentType {
                name: "delay/depends".to_string(),
                reason: "delay > 0 and non-empty depends are mutually exclusive".to_string(),
            });
        }
        if self.next.is_none() && (self.delay > 0 || !self.depends.is_empty()) {
            return Err(DomainError::ArgumentType {
                name: "delay/depends".to_string(),
                reason: "delay or depends given without next".to_string(),
            });
        }
        Ok(())
    }
}
