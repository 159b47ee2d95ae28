use async_trait::async_trait;
use chrono::{DateTime, Utc};
use stagehand_types::{Plan, RejectionReason};

use crate::{CertificationLog, GateResult};

/// Outcome of one validator's review
#[derive(Clone, Debug, PartialEq)]
pub enum Verdict {
    Approve,
    Reject(Vec<RejectionReason>),
}

impl Verdict {
    pub fn is_approve(&self) -> bool {
        matches!(self, Verdict::Approve)
    }

    /// Approve when `reasons` is empty, reject with them otherwise
    pub fn from_reasons(reasons: Vec<RejectionReason>) -> Self {
        if reasons.is_empty() {
            Verdict::Approve
        } else {
            Verdict::Reject(reasons)
        }
    }
}

/// Read-only view handed to validators
pub struct ValidationContext<'a> {
    pub now: DateTime<Utc>,
    pub log: &'a CertificationLog,
}

/// An independent reviewer of submitted plans.
///
/// Validators must not depend on each other's verdicts; the gate runs
/// them concurrently.
#[async_trait]
pub trait Validator: Send + Sync {
    /// Unique name, used as the key in `validator_results`
    fn name(&self) -> &str;

    async fn validate(&self, plan: &Plan, ctx: &ValidationContext<'_>) -> GateResult<Verdict>;
}
