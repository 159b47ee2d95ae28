use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use stagehand_registry::JobKindRegistry;
use stagehand_types::{ErrorCode, ExecutorName, Plan, RejectionReason};

use crate::{GateResult, ValidationContext, Validator, Verdict};

pub const SAFETY: &str = "safety";

/// Policy review: non-idempotent work is flagged and permitted, and real
/// runs of dry-run-gated kinds follow a certified dry run.
pub struct SafetyValidator {
    registry: Arc<JobKindRegistry>,
    /// Executors that commit non-reversible effects
    non_idempotent_executors: BTreeSet<ExecutorName>,
}

impl SafetyValidator {
    pub fn new(registry: Arc<JobKindRegistry>) -> Self {
        Self {
            registry,
            non_idempotent_executors: BTreeSet::new(),
        }
    }

    pub fn with_non_idempotent_executors(mut self, names: impl IntoIterator<Item = ExecutorName>) -> Self {
        self.non_idempotent_executors.extend(names);
        self
    }
}

#[async_trait]
impl Validator for SafetyValidator {
    fn name(&self) -> &str {
        SAFETY
    }

    async fn validate(&self, plan: &Plan, ctx: &ValidationContext<'_>) -> GateResult<Verdict> {
        let mut reasons = Vec::new();
        let mut needs_dry_run = false;

        for stage in &plan.stages {
            let Ok(kind) = self.registry.get(&stage.kind_id) else {
                continue;
            };

            if stage.non_idempotent && !kind.safety_policy.allow_non_idempotent {
                reasons.push(
                    RejectionReason::new(
                        SAFETY,
                        ErrorCode::PolicyViolation,
                        format!("job kind '{}' does not permit non-idempotent stages", kind.id),
                    )
                    .for_stage(stage.id.clone()),
                );
            }
            if !stage.non_idempotent && self.non_idempotent_executors.contains(&stage.executor) {
                reasons.push(
                    RejectionReason::new(
                        SAFETY,
                        ErrorCode::PolicyViolation,
                        format!(
                            "executor '{}' is non-idempotent; stage must be flagged non_idempotent",
                            stage.executor
                        ),
                    )
                    .for_stage(stage.id.clone()),
                );
            }
            needs_dry_run |= kind.safety_policy.require_dry_run;
        }

        if needs_dry_run && !plan.dry_run && ctx.log.find_valid_dry_run(&plan.fingerprint, ctx.now).is_none() {
            reasons.push(RejectionReason::new(
                SAFETY,
                ErrorCode::MissingPriorDryRun,
                format!(
                    "missing prior dry-run: no valid certified dry run for fingerprint {}",
                    &plan.fingerprint[..12.min(plan.fingerprint.len())]
                ),
            ));
        }

        Ok(Verdict::from_reasons(reasons))
    }
}
