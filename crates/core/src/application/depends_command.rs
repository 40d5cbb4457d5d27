// `depends`'s command argument, parsed at the boundary the same way
// `CompleteOptions` replaces `complete`'s flat pair list.

use crate::domain::{DomainError, JobId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependsCommand {
    On(Vec<JobId>),
    OffAll,
    Off(Vec<JobId>),
}

impl DependsCommand {
    /// Parse the wire form `("on"|"off", args...)` into a typed command.
    /// Anything else is an error.
    pub fn parse(command: &str, args: Vec<String>) -> Result<Self, DomainError> {
        match command {
            "on" => Ok(DependsCommand::On(args)),
            "off" if args.len() == 1 && args[0] == "all" => Ok(DependsCommand::OffAll),
            "off" => Ok(DependsCommand::Off(args)),
            other => Err(DomainError::ArgumentType {
                name: "command".to_string(),
                reason: format!("unknown depends command: {other}"),
            }),
        }
    }
}
