use stagehand_types::{ErrorCode, ExecutorName, FailureClass};
use thiserror::Error;

/// Errors an executor reports for a single attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    /// Transient; the attempt may be repeated
    #[error("retryable: {0}")]
    Retryable(String),

    /// Re-attempting will not help
    #[error("fatal: {0}")]
    Fatal(String),

    #[error("invalid partition input: {0}")]
    InvalidInput(String),

    #[error("execution cancelled")]
    Cancelled,

    #[error("executor not registered: {0}")]
    UnknownExecutor(ExecutorName),
}

impl ExecutionError {
    pub fn retryable(message: impl Into<String>) -> Self {
        ExecutionError::Retryable(message.into())
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        ExecutionError::Fatal(message.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ExecutionError::Retryable(_))
    }

    /// Failure class, or `None` for cancellation
    pub fn class(&self) -> Option<FailureClass> {
        match self {
            ExecutionError::Retryable(_) => Some(FailureClass::Retryable),
            ExecutionError::Cancelled => None,
            _ => Some(FailureClass::Fatal),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ExecutionError::Retryable(_) => ErrorCode::ExecutionRetryable,
            ExecutionError::UnknownExecutor(_) => ErrorCode::ValidationError,
            _ => ErrorCode::ExecutionFatal,
        }
    }
}

pub type ExecutionOutcome<T> = Result<T, ExecutionError>;
