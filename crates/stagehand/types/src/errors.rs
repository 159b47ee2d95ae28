//! Stable reason codes and the public error shape

use serde::{Deserialize, Serialize};

use crate::StageId;

/// Machine-readable reason code carried by every externally visible error
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    ValidationError,
    PolicyViolation,
    CertificationRejected,
    ExecutionRetryable,
    ExecutionFatal,
    Timeout,
    ChannelDegraded,
    NotFound,
    InvalidTransition,
    Storage,
    UnknownKind,
    DisallowedPartitioner,
    DisallowedExecutor,
    IllegalNonIdempotent,
    SchemaViolation,
    MissingPriorDryRun,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "validation_error",
            ErrorCode::PolicyViolation => "policy_violation",
            ErrorCode::CertificationRejected => "certification_rejected",
            ErrorCode::ExecutionRetryable => "execution_retryable",
            ErrorCode::ExecutionFatal => "execution_fatal",
            ErrorCode::Timeout => "timeout",
            ErrorCode::ChannelDegraded => "channel_degraded",
            ErrorCode::NotFound => "not_found",
            ErrorCode::InvalidTransition => "invalid_transition",
            ErrorCode::Storage => "storage",
            ErrorCode::UnknownKind => "unknown_kind",
            ErrorCode::DisallowedPartitioner => "disallowed_partitioner",
            ErrorCode::DisallowedExecutor => "disallowed_executor",
            ErrorCode::IllegalNonIdempotent => "illegal_non_idempotent",
            ErrorCode::SchemaViolation => "schema_violation",
            ErrorCode::MissingPriorDryRun => "missing_prior_dry_run",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single reason a stage failed validation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub stage_id: StageId,
    pub code: ErrorCode,
    pub message: String,
}

impl Violation {
    pub fn new(stage_id: StageId, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            stage_id,
            code,
            message: message.into(),
        }
    }

    /// A violation of the plan as a whole rather than one stage
    pub fn plan_level(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(StageId::new(PLAN_SCOPE), code, message)
    }

    pub fn is_plan_level(&self) -> bool {
        self.stage_id.as_str() == PLAN_SCOPE
    }
}

/// Stage id used for plan-level violations
pub const PLAN_SCOPE: &str = "*";

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.code, self.stage_id, self.message)
    }
}

/// Client-facing error: a reason code plus a human-readable message
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PublicError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<Violation>,
}

impl PublicError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: Vec::new(),
        }
    }

    pub fn with_details(mut self, details: Vec<Violation>) -> Self {
        self.details = details;
        self
    }
}

impl std::fmt::Display for PublicError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_serialize_as_snake_case() {
        for code in [
            ErrorCode::MissingPriorDryRun,
            ErrorCode::DisallowedExecutor,
            ErrorCode::CertificationRejected,
        ] {
            let encoded = serde_json::to_string(&code).unwrap();
            assert_eq!(encoded, format!("\"{}\"", code.as_str()));
        }
    }

    #[test]
    fn public_error_omits_empty_details() {
        let err = PublicError::new(ErrorCode::NotFound, "plan not found");
        let encoded = serde_json::to_value(&err).unwrap();
        assert!(encoded.get("details").is_none());
        assert_eq!(encoded["code"], "not_found");
    }
}
