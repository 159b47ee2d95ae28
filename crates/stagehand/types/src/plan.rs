//! Plans and stages

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{canonical_digest, ExecutorName, JobKindId, PartitionerName, PlanId, StageId};

// ── Stage ────────────────────────────────────────────────────────────

/// One job-kind-typed step of a plan, bound to a partitioner and an executor
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub id: StageId,
    pub kind_id: JobKindId,
    pub partitioner: PartitionerName,
    pub executor: ExecutorName,
    /// Opaque payload, validated against the kind's input schema
    #[serde(default)]
    pub inputs: Value,
    /// Must be set truthfully when the stage commits non-reversible effects
    #[serde(default)]
    pub non_idempotent: bool,
    /// Plan-level override of the kind's `default_sla_ms`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sla_ms: Option<u64>,
}

impl Stage {
    pub fn new(
        id: impl Into<String>,
        kind_id: impl Into<String>,
        partitioner: impl Into<String>,
        executor: impl Into<String>,
    ) -> Self {
        Self {
            id: StageId::new(id),
            kind_id: JobKindId::new(kind_id),
            partitioner: PartitionerName::new(partitioner),
            executor: ExecutorName::new(executor),
            inputs: Value::Null,
            non_idempotent: false,
            sla_ms: None,
        }
    }

    pub fn with_inputs(mut self, inputs: Value) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn non_idempotent(mut self) -> Self {
        self.non_idempotent = true;
        self
    }

    pub fn with_sla_ms(mut self, sla_ms: u64) -> Self {
        self.sla_ms = Some(sla_ms);
        self
    }
}

/// Execution status of a stage within a running plan
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    TimedOut,
    Cancelled,
    /// Not attempted because an earlier stage aborted the plan
    Skipped,
}

impl StageStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StageStatus::Pending | StageStatus::Running)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, StageStatus::Failed | StageStatus::TimedOut)
    }
}

// ── Plan ─────────────────────────────────────────────────────────────

/// What happens to later stages once a stage fails
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailurePolicy {
    #[default]
    AbortOnFailure,
    ContinueOnFailure,
}

/// Lifecycle status of a plan.
///
/// `Submitted → Certifying → {Certified → Running → {Completed | Failed} | Rejected}`,
/// with `Cancelled` reachable from any non-terminal status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlanStatus {
    Submitted,
    Certifying,
    Certified,
    Rejected,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl PlanStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PlanStatus::Completed | PlanStatus::Failed | PlanStatus::Rejected | PlanStatus::Cancelled
        )
    }

    pub fn can_transition_to(&self, next: PlanStatus) -> bool {
        use PlanStatus::*;
        match (self, next) {
            (from, Cancelled) => !from.is_terminal(),
            (Submitted, Certifying) => true,
            (Certifying, Certified) | (Certifying, Rejected) => true,
            (Certified, Running) => true,
            (Running, Completed) | (Running, Failed) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanStatus::Submitted => "submitted",
            PlanStatus::Certifying => "certifying",
            PlanStatus::Certified => "certified",
            PlanStatus::Rejected => "rejected",
            PlanStatus::Running => "running",
            PlanStatus::Completed => "completed",
            PlanStatus::Failed => "failed",
            PlanStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A submitted unit of work composed of ordered stages
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    pub stages: Vec<Stage>,
    #[serde(default)]
    pub dry_run: bool,
    /// Content hash of the stages; equal for a dry run and its real run
    #[serde(default)]
    pub fingerprint: String,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    #[serde(default = "default_status")]
    pub status: PlanStatus,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    /// External channels this plan depends on, in addition to its kinds'
    #[serde(default)]
    pub channels: Vec<String>,
    /// Upper bound on partitions per stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_partitions: Option<usize>,
}

fn default_status() -> PlanStatus {
    PlanStatus::Submitted
}

impl Plan {
    pub fn new(id: impl Into<String>) -> Self {
        let mut plan = Self {
            id: PlanId::new(id),
            stages: Vec::new(),
            dry_run: false,
            fingerprint: String::new(),
            failure_policy: FailurePolicy::default(),
            status: PlanStatus::Submitted,
            created_at: Utc::now(),
            channels: Vec::new(),
            max_partitions: None,
        };
        plan.fingerprint = plan.compute_fingerprint();
        plan
    }

    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self.fingerprint = self.compute_fingerprint();
        self
    }

    pub fn as_dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn depends_on_channel(mut self, channel: impl Into<String>) -> Self {
        self.channels.push(channel.into());
        self
    }

    pub fn with_max_partitions(mut self, max: usize) -> Self {
        self.max_partitions = Some(max);
        self.fingerprint = self.compute_fingerprint();
        self
    }

    /// Copy of this plan as a real run under a new id, keeping the fingerprint
    pub fn promote(&self, id: impl Into<String>) -> Self {
        let mut plan = self.clone();
        plan.id = PlanId::new(id);
        plan.dry_run = false;
        plan.status = PlanStatus::Submitted;
        plan.created_at = Utc::now();
        plan
    }

    /// Hash over everything that determines the work performed.
    ///
    /// The plan id, `dry_run` flag, status and timestamps are excluded so
    /// that a dry run and the real run it authorizes share a fingerprint.
    pub fn compute_fingerprint(&self) -> String {
        let stages: Vec<Value> = self
            .stages
            .iter()
            .map(|s| {
                json!({
                    "id": s.id,
                    "kind_id": s.kind_id,
                    "partitioner": s.partitioner,
                    "executor": s.executor,
                    "inputs": s.inputs,
                    "non_idempotent": s.non_idempotent,
                    "sla_ms": s.sla_ms,
                })
            })
            .collect();
        let body = json!({
            "stages": stages,
            "max_partitions": self.max_partitions,
        });
        canonical_digest("stagehand-plan-v1", &body)
    }

    pub fn stage(&self, id: &StageId) -> Option<&Stage> {
        self.stages.iter().find(|s| &s.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pack_stage() -> Stage {
        Stage::new("pack", "deploy.pack", "by_filesize", "pack_backend")
            .with_inputs(json!({"items": [{"key": "a", "size_bytes": 10}]}))
    }

    #[test]
    fn transitions_follow_state_machine() {
        use PlanStatus::*;
        assert!(Submitted.can_transition_to(Certifying));
        assert!(Certifying.can_transition_to(Rejected));
        assert!(Certified.can_transition_to(Running));
        assert!(Running.can_transition_to(Completed));
        assert!(!Submitted.can_transition_to(Running));
        assert!(!Rejected.can_transition_to(Running));
        assert!(!Certifying.can_transition_to(Completed));
    }

    #[test]
    fn cancel_only_from_non_terminal() {
        use PlanStatus::*;
        for status in [Submitted, Certifying, Certified, Running] {
            assert!(status.can_transition_to(Cancelled), "{status}");
        }
        for status in [Completed, Failed, Rejected, Cancelled] {
            assert!(!status.can_transition_to(Cancelled), "{status}");
        }
    }

    #[test]
    fn fingerprint_shared_by_dry_run_and_promotion() {
        let dry = Plan::new("dry-1").with_stage(pack_stage()).as_dry_run();
        let real = dry.promote("real-1");

        assert!(!real.dry_run);
        assert_eq!(dry.fingerprint, real.fingerprint);
        assert_eq!(real.fingerprint, real.compute_fingerprint());
    }

    #[test]
    fn fingerprint_tracks_inputs() {
        let a = Plan::new("a").with_stage(pack_stage());
        let b = Plan::new("b").with_stage(pack_stage().with_inputs(json!({"items": []})));
        assert_ne!(a.fingerprint, b.fingerprint);
    }

    #[test]
    fn builders_keep_fingerprint_current() {
        let checks: Vec<Plan> = vec![
            Plan::new("p"),
            Plan::new("p").with_stage(pack_stage()),
            Plan::new("p").with_stage(pack_stage()).with_max_partitions(3),
            Plan::new("p").with_max_partitions(3).with_stage(pack_stage()),
            Plan::new("p").with_stage(pack_stage()).as_dry_run(),
            Plan::new("p")
                .with_stage(pack_stage())
                .with_failure_policy(FailurePolicy::ContinueOnFailure),
            Plan::new("p").with_stage(pack_stage()).depends_on_channel("federation"),
            Plan::new("p").with_stage(pack_stage()).with_max_partitions(2).promote("q"),
        ];
        for plan in checks {
            assert_eq!(plan.fingerprint, plan.compute_fingerprint());
        }

        let capped = Plan::new("p").with_stage(pack_stage()).with_max_partitions(3);
        let uncapped = Plan::new("p").with_stage(pack_stage());
        assert_ne!(capped.fingerprint, uncapped.fingerprint);
    }

    #[test]
    fn failure_policy_wire_format() {
        let encoded = serde_json::to_string(&FailurePolicy::ContinueOnFailure).unwrap();
        assert_eq!(encoded, "\"CONTINUE_ON_FAILURE\"");
    }
}
