//! Certification records
//!
//! One record per certification attempt. Records are write-once: the
//! certification log refuses to overwrite an existing
//! `(plan_id, attempt)` key.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ErrorCode, PlanId, StageId};

/// Why a validator disapproved a plan
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionReason {
    pub validator: String,
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_id: Option<StageId>,
}

impl RejectionReason {
    pub fn new(validator: impl Into<String>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            validator: validator.into(),
            code,
            message: message.into(),
            stage_id: None,
        }
    }

    pub fn for_stage(mut self, stage_id: StageId) -> Self {
        self.stage_id = Some(stage_id);
        self
    }
}

/// Outcome of one certification attempt
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Certification {
    pub plan_id: PlanId,
    /// 1-based attempt number for this plan
    pub attempt: u32,
    pub fingerprint: String,
    pub dry_run: bool,
    pub validator_results: BTreeMap<String, bool>,
    pub certified: bool,
    #[serde(default)]
    pub rejection_reasons: Vec<RejectionReason>,
    pub timestamp: DateTime<Utc>,
    /// Certified dry runs authorize real runs until this instant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<DateTime<Utc>>,
}

impl Certification {
    /// Whether this record authorizes a real run of `fingerprint` at `now`
    pub fn authorizes_real_run(&self, fingerprint: &str, now: DateTime<Utc>) -> bool {
        self.certified
            && self.dry_run
            && self.fingerprint == fingerprint
            && self.valid_until.map_or(false, |until| now <= until)
    }

    pub fn rejected_by(&self) -> Vec<&str> {
        self.validator_results
            .iter()
            .filter(|(_, approved)| !**approved)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn summary(&self) -> CertificationSummary {
        CertificationSummary {
            attempt: self.attempt,
            certified: self.certified,
            approvals: self.validator_results.values().filter(|a| **a).count(),
            validators: self.validator_results.len(),
            rejected_by: self.rejected_by().into_iter().map(String::from).collect(),
            reasons: self
                .rejection_reasons
                .iter()
                .map(|r| format!("{}: {}", r.validator, r.message))
                .collect(),
            timestamp: self.timestamp,
        }
    }
}

/// Compact view of a certification for status queries
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CertificationSummary {
    pub attempt: u32,
    pub certified: bool,
    pub approvals: usize,
    pub validators: usize,
    pub rejected_by: Vec<String>,
    pub reasons: Vec<String>,
    pub timestamp: DateTime<Utc>,
}
