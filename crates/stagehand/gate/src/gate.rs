use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use stagehand_types::{Certification, ErrorCode, Plan, RejectionReason};
use tracing::{debug, info, warn};

use crate::{CertificationLog, GateError, GateResult, QuorumPolicy, ValidationContext, Validator, Verdict};

/// Configuration for the Safety Gate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateConfig {
    #[serde(default)]
    pub quorum: QuorumPolicy,
    /// How long a certified dry run authorizes real runs (default: 24h)
    #[serde(default = "default_dry_run_validity_ms")]
    pub dry_run_validity_ms: u64,
}

fn default_dry_run_validity_ms() -> u64 {
    24 * 60 * 60 * 1000
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            quorum: QuorumPolicy::All,
            dry_run_validity_ms: default_dry_run_validity_ms(),
        }
    }
}

/// The Safety Gate: runs validators and records one certification per
/// attempt.
pub struct SafetyGate {
    validators: RwLock<Vec<Arc<dyn Validator>>>,
    log: Arc<CertificationLog>,
    config: GateConfig,
}

impl SafetyGate {
    pub fn new(config: GateConfig) -> Self {
        Self::with_log(config, Arc::new(CertificationLog::new()))
    }

    pub fn with_log(config: GateConfig, log: Arc<CertificationLog>) -> Self {
        Self {
            validators: RwLock::new(Vec::new()),
            log,
            config,
        }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn log(&self) -> &Arc<CertificationLog> {
        &self.log
    }

    /// Add a validator. Names must be unique.
    pub fn register_validator(&self, validator: Arc<dyn Validator>) -> GateResult<()> {
        let mut validators = self.validators.write().unwrap_or_else(PoisonError::into_inner);
        if validators.iter().any(|v| v.name() == validator.name()) {
            return Err(GateError::DuplicateValidator(validator.name().to_string()));
        }
        info!(validator = validator.name(), "Validator registered");
        validators.push(validator);
        Ok(())
    }

    pub fn validator_names(&self) -> Vec<String> {
        self.validators
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|v| v.name().to_string())
            .collect()
    }

    /// Run every validator over `plan` and append the resulting record.
    ///
    /// A rejection is a successful certification attempt with
    /// `certified == false`; errors mean no record was written.
    pub async fn certify(&self, plan: &Plan) -> GateResult<Certification> {
        let guard = self.log.begin(&plan.id)?;
        let validators: Vec<Arc<dyn Validator>> = self
            .validators
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let now = Utc::now();
        let ctx = ValidationContext { now, log: &self.log };
        let verdicts = futures::future::join_all(validators.iter().map(|v| v.validate(plan, &ctx))).await;

        let mut validator_results = BTreeMap::new();
        let mut rejection_reasons = Vec::new();
        for (validator, verdict) in validators.iter().zip(verdicts) {
            let name = validator.name().to_string();
            match verdict {
                Ok(Verdict::Approve) => {
                    debug!(plan_id = %plan.id, validator = %name, "Validator approved");
                    validator_results.insert(name, true);
                }
                Ok(Verdict::Reject(reasons)) => {
                    warn!(plan_id = %plan.id, validator = %name, reasons = reasons.len(), "Validator rejected");
                    rejection_reasons.extend(reasons);
                    validator_results.insert(name, false);
                }
                Err(err) => {
                    warn!(plan_id = %plan.id, validator = %name, error = %err, "Validator failed");
                    rejection_reasons.push(RejectionReason::new(
                        name.clone(),
                        ErrorCode::CertificationRejected,
                        "validator failed to reach a verdict",
                    ));
                    validator_results.insert(name, false);
                }
            }
        }

        let approvals = validator_results.values().filter(|approved| **approved).count();
        let certified = self.config.quorum.is_met(approvals, validators.len());
        if validators.is_empty() {
            rejection_reasons.push(RejectionReason::new(
                "gate",
                ErrorCode::CertificationRejected,
                "no validators registered",
            ));
        }

        let valid_for = Duration::milliseconds(self.config.dry_run_validity_ms.min(i64::MAX as u64) as i64);
        let certification = Certification {
            plan_id: plan.id.clone(),
            attempt: guard.attempt(),
            fingerprint: plan.fingerprint.clone(),
            dry_run: plan.dry_run,
            validator_results,
            certified,
            rejection_reasons,
            timestamp: now,
            valid_until: (certified && plan.dry_run).then(|| now + valid_for),
        };
        self.log.append(certification.clone())?;

        if certified {
            info!(
                plan_id = %plan.id,
                attempt = certification.attempt,
                approvals,
                quorum = %self.config.quorum,
                dry_run = plan.dry_run,
                "Plan certified"
            );
        } else {
            warn!(
                plan_id = %plan.id,
                attempt = certification.attempt,
                approvals,
                quorum = %self.config.quorum,
                "Plan rejected"
            );
        }
        Ok(certification)
    }
}
