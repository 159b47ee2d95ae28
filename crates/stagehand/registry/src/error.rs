use stagehand_types::{ErrorCode, JobKindId};
use thiserror::Error;

/// Errors from job kind registration and lookup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("job kind id must not be empty")]
    EmptyKindId,

    #[error("job kind {0} declares no allowed partitioners")]
    EmptyPartitioners(JobKindId),

    #[error("job kind {0} declares no allowed executors")]
    EmptyExecutors(JobKindId),

    #[error("job kind {kind_id} names unregistered {role} '{name}'")]
    UnknownImplementation {
        kind_id: JobKindId,
        role: &'static str,
        name: String,
    },

    #[error("job kind {kind_id} already registered at version {current}; got version {attempted}")]
    DuplicateKind {
        kind_id: JobKindId,
        current: u32,
        attempted: u32,
    },

    #[error("job kind {0} must declare a non-zero default SLA")]
    ZeroSla(JobKindId),

    #[error("job kind not found: {0}")]
    NotFound(JobKindId),
}

impl RegistryError {
    pub fn code(&self) -> ErrorCode {
        match self {
            RegistryError::NotFound(_) => ErrorCode::NotFound,
            _ => ErrorCode::ValidationError,
        }
    }
}

pub type RegistryResult<T> = Result<T, RegistryError>;
