use stagehand_types::{ErrorCode, PlanId};
use thiserror::Error;

/// Errors from the certification pipeline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GateError {
    #[error("certification already in progress for plan {0}")]
    ConcurrentCertification(PlanId),

    #[error("certification log immutability violation: {plan_id} attempt {attempt} already recorded")]
    DuplicateCertification { plan_id: PlanId, attempt: u32 },

    #[error("validator already registered: {0}")]
    DuplicateValidator(String),

    #[error("validator {name} failed: {reason}")]
    ValidatorFailed { name: String, reason: String },
}

impl GateError {
    pub fn code(&self) -> ErrorCode {
        match self {
            GateError::ConcurrentCertification(_) => ErrorCode::InvalidTransition,
            GateError::DuplicateCertification { .. } => ErrorCode::Storage,
            GateError::DuplicateValidator(_) => ErrorCode::ValidationError,
            GateError::ValidatorFailed { .. } => ErrorCode::CertificationRejected,
        }
    }
}

pub type GateResult<T> = Result<T, GateError>;
