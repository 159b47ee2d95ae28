use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use stagehand_registry::JobKindRegistry;
use stagehand_types::{ErrorCode, Plan, RejectionReason};

use crate::{GateResult, ValidationContext, Validator, Verdict};

pub const CORRECTNESS: &str = "correctness";

/// Structural review: every stage binds to its kind's allowed
/// implementations and its inputs match the kind's schema.
pub struct CorrectnessValidator {
    registry: Arc<JobKindRegistry>,
}

impl CorrectnessValidator {
    pub fn new(registry: Arc<JobKindRegistry>) -> Self {
        Self { registry }
    }

    fn review(&self, plan: &Plan) -> Vec<RejectionReason> {
        let mut reasons = Vec::new();

        if plan.stages.is_empty() {
            reasons.push(RejectionReason::new(
                CORRECTNESS,
                ErrorCode::ValidationError,
                "plan has no stages",
            ));
        }
        if plan.fingerprint != plan.compute_fingerprint() {
            reasons.push(RejectionReason::new(
                CORRECTNESS,
                ErrorCode::ValidationError,
                "fingerprint does not match plan contents",
            ));
        }

        let mut seen = HashSet::new();
        for stage in &plan.stages {
            if !seen.insert(&stage.id) {
                reasons.push(
                    RejectionReason::new(
                        CORRECTNESS,
                        ErrorCode::ValidationError,
                        format!("duplicate stage id '{}'", stage.id),
                    )
                    .for_stage(stage.id.clone()),
                );
            }
            let violations = self
                .registry
                .validate_stage(stage)
                .into_iter()
                .chain(self.registry.check_inputs(stage));
            for violation in violations {
                reasons.push(
                    RejectionReason::new(CORRECTNESS, violation.code, violation.message)
                        .for_stage(violation.stage_id),
                );
            }
        }
        reasons
    }
}

#[async_trait]
impl Validator for CorrectnessValidator {
    fn name(&self) -> &str {
        CORRECTNESS
    }

    async fn validate(&self, plan: &Plan, _ctx: &ValidationContext<'_>) -> GateResult<Verdict> {
        Ok(Verdict::from_reasons(self.review(plan)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CertificationLog;
    use chrono::Utc;
    use serde_json::json;
    use stagehand_registry::{deploy_pack_kind, ImplementationCatalog};
    use stagehand_types::Stage;

    fn registry() -> Arc<JobKindRegistry> {
        let catalog = ImplementationCatalog::new()
            .with_partitioner("by_filesize")
            .with_partitioner("by_key_range")
            .with_executor("pack_backend");
        let registry = JobKindRegistry::new(catalog);
        registry.register(deploy_pack_kind()).unwrap();
        Arc::new(registry)
    }

    async fn verdict(plan: &Plan) -> Verdict {
        let log = CertificationLog::new();
        let ctx = ValidationContext {
            now: Utc::now(),
            log: &log,
        };
        CorrectnessValidator::new(registry()).validate(plan, &ctx).await.unwrap()
    }

    #[tokio::test]
    async fn approves_well_formed_plan() {
        let plan = Plan::new("ok").with_stage(
            Stage::new("pack", "deploy.pack", "by_filesize", "pack_backend").with_inputs(json!({"items": []})),
        );
        assert!(verdict(&plan).await.is_approve());
    }

    #[tokio::test]
    async fn rejects_schema_and_binding_problems() {
        let plan = Plan::new("bad").with_stage(
            Stage::new("pack", "deploy.pack", "by_filesize", "sql_migrate").with_inputs(json!({"files": []})),
        );
        let Verdict::Reject(reasons) = verdict(&plan).await else {
            panic!("expected rejection");
        };
        let codes: Vec<ErrorCode> = reasons.iter().map(|r| r.code).collect();
        assert_eq!(codes, vec![ErrorCode::DisallowedExecutor, ErrorCode::SchemaViolation]);
    }

    #[tokio::test]
    async fn rejects_tampered_fingerprint() {
        let mut plan = Plan::new("t").with_stage(
            Stage::new("pack", "deploy.pack", "by_filesize", "pack_backend").with_inputs(json!({"items": []})),
        );
        plan.stages[0].inputs = json!({"items": [{"path": "x", "size_bytes": 1}]});
        assert!(!verdict(&plan).await.is_approve());
    }

    #[tokio::test]
    async fn rejects_empty_plan() {
        assert!(!verdict(&Plan::new("empty")).await.is_approve());
    }
}
