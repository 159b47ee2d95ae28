//! Error types for the orchestrator.

use stagehand_gate::GateError;
use stagehand_health::HealthError;
use stagehand_registry::RegistryError;
use stagehand_types::{Certification, ErrorCode, PlanId, PlanStatus, PublicError, Violation};
use thiserror::Error;

/// Errors raised by plan storage backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Certification records are append-only
    #[error("certification {attempt} for plan {plan_id} already stored")]
    Immutable { plan_id: PlanId, attempt: u32 },
}

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned by the orchestrator control plane.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Submission-time validation failed; nothing was persisted or run.
    #[error("plan {plan_id} failed validation with {} violation(s)", violations.len())]
    Validation { plan_id: PlanId, violations: Vec<Violation> },

    /// The gate refused the plan. The plan is stored as `Rejected`.
    #[error("plan {} rejected by {}", certification.plan_id, certification.rejected_by().join(", "))]
    CertificationRejected { certification: Box<Certification> },

    #[error("plan not found: {0}")]
    NotFound(PlanId),

    #[error("plan already submitted: {0}")]
    DuplicatePlan(PlanId),

    #[error("plan {plan_id} cannot move from {from} to {to}")]
    InvalidTransition {
        plan_id: PlanId,
        from: PlanStatus,
        to: PlanStatus,
    },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Gate(#[from] GateError),

    #[error(transparent)]
    Health(#[from] HealthError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl EngineError {
    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::Validation { .. } | EngineError::DuplicatePlan(_) | EngineError::Config(_) => {
                ErrorCode::ValidationError
            }
            EngineError::CertificationRejected { .. } => ErrorCode::CertificationRejected,
            EngineError::NotFound(_) => ErrorCode::NotFound,
            EngineError::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            EngineError::Registry(e) => e.code(),
            EngineError::Gate(e) => e.code(),
            EngineError::Health(e) => e.code(),
            EngineError::Store(_) => ErrorCode::Storage,
        }
    }

    /// Client-facing form. Storage internals are not exposed.
    pub fn to_public(&self) -> PublicError {
        match self {
            EngineError::Validation { violations, .. } => {
                PublicError::new(self.code(), self.to_string()).with_details(violations.clone())
            }
            EngineError::CertificationRejected { certification } => {
                let details = certification
                    .rejection_reasons
                    .iter()
                    .map(|r| {
                        let violation = match &r.stage_id {
                            Some(stage_id) => Violation::new(stage_id.clone(), r.code, r.message.clone()),
                            None => Violation::plan_level(r.code, r.message.clone()),
                        };
                        Violation {
                            message: format!("{}: {}", r.validator, violation.message),
                            ..violation
                        }
                    })
                    .collect();
                PublicError::new(self.code(), self.to_string()).with_details(details)
            }
            EngineError::Store(_) => PublicError::new(self.code(), "internal storage error"),
            _ => PublicError::new(self.code(), self.to_string()),
        }
    }
}

/// Result type for orchestrator operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use stagehand_types::{RejectionReason, StageId};
    use std::collections::BTreeMap;

    #[test]
    fn validation_error_carries_violations() {
        let err = EngineError::Validation {
            plan_id: PlanId::new("p"),
            violations: vec![
                Violation::new(StageId::new("a"), ErrorCode::UnknownKind, "unknown kind"),
                Violation::plan_level(ErrorCode::ValidationError, "no stages"),
            ],
        };
        let public = err.to_public();
        assert_eq!(public.code, ErrorCode::ValidationError);
        assert_eq!(public.details.len(), 2);
        assert!(public.details[1].is_plan_level());
    }

    #[test]
    fn rejection_cites_validator() {
        let certification = Certification {
            plan_id: PlanId::new("p"),
            attempt: 1,
            fingerprint: "f".into(),
            dry_run: false,
            validator_results: BTreeMap::from([("safety".to_string(), false)]),
            certified: false,
            rejection_reasons: vec![RejectionReason::new(
                "safety",
                ErrorCode::MissingPriorDryRun,
                "missing prior dry-run",
            )
            .for_stage(StageId::new("migrate"))],
            timestamp: Utc::now(),
            valid_until: None,
        };
        let err = EngineError::CertificationRejected {
            certification: Box::new(certification),
        };

        assert_eq!(err.to_string(), "plan p rejected by safety");
        let public = err.to_public();
        assert_eq!(public.code, ErrorCode::CertificationRejected);
        assert_eq!(public.details[0].stage_id.as_str(), "migrate");
        assert_eq!(public.details[0].message, "safety: missing prior dry-run");
    }

    #[test]
    fn storage_details_stay_internal() {
        let err = EngineError::Store(StoreError::Io(std::io::Error::other("/var/lib/secret")));
        let public = err.to_public();
        assert_eq!(public.code, ErrorCode::Storage);
        assert!(!public.message.contains("secret"));
    }
}
