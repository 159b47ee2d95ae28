//! Persisted plan state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use stagehand_types::{
    CertificationSummary, ErrorDetail, ExecutionResult, FallbackAction, JobKindId, PartitionId, Plan, PlanId,
    PlanStatus, StageId, StageStatus,
};

use crate::aggregate::{merkle_proof, MerkleProof};
use crate::{EngineError, EngineResult};

/// Per-stage progress and aggregated outcome
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage_id: StageId,
    pub kind_id: JobKindId,
    pub status: StageStatus,
    #[serde(default)]
    pub partitions: usize,
    /// Ordered by partition id
    #[serde(default)]
    pub results: Vec<ExecutionResult>,
    #[serde(default)]
    pub aggregated: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merkle_root: Option<String>,
    /// Fallbacks in force while the stage ran
    #[serde(default)]
    pub fallbacks: Vec<(String, FallbackAction)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
    #[serde(default)]
    pub sla_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl StageRecord {
    pub fn pending(stage_id: StageId, kind_id: JobKindId) -> Self {
        Self {
            stage_id,
            kind_id,
            status: StageStatus::Pending,
            partitions: 0,
            results: Vec::new(),
            aggregated: Value::Null,
            merkle_root: None,
            fallbacks: Vec::new(),
            error: None,
            sla_ms: 0,
            started_at: None,
            finished_at: None,
        }
    }

    /// Proof that one partition's result is covered by `merkle_root`
    pub fn merkle_proof(&self, partition_id: &PartitionId) -> Option<MerkleProof> {
        self.merkle_root.as_ref()?;
        merkle_proof(&self.results, partition_id)
    }

    pub(crate) fn finish(&mut self, status: StageStatus, error: Option<ErrorDetail>) {
        self.status = status;
        self.error = error;
        self.finished_at = Some(Utc::now());
    }
}

/// A partition result that arrived after its stage stopped collecting
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LateResult {
    pub stage_id: StageId,
    pub result: ExecutionResult,
    pub received_at: DateTime<Utc>,
}

/// Everything the orchestrator knows about one plan
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanRecord {
    pub plan: Plan,
    pub stages: Vec<StageRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certification: Option<CertificationSummary>,
    #[serde(default)]
    pub late_results: Vec<LateResult>,
    pub updated_at: DateTime<Utc>,
}

impl PlanRecord {
    pub fn new(plan: Plan) -> Self {
        let stages = plan
            .stages
            .iter()
            .map(|s| StageRecord::pending(s.id.clone(), s.kind_id.clone()))
            .collect();
        Self {
            plan,
            stages,
            certification: None,
            late_results: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &PlanId {
        &self.plan.id
    }

    pub fn status(&self) -> PlanStatus {
        self.plan.status
    }

    /// Move to `next`, refusing anything the plan state machine forbids
    pub fn transition(&mut self, next: PlanStatus) -> EngineResult<()> {
        let from = self.plan.status;
        if !from.can_transition_to(next) {
            return Err(EngineError::InvalidTransition {
                plan_id: self.plan.id.clone(),
                from,
                to: next,
            });
        }
        self.plan.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn stage_mut(&mut self, stage_id: &StageId) -> Option<&mut StageRecord> {
        self.stages.iter_mut().find(|s| &s.stage_id == stage_id)
    }

    pub fn report(&self) -> PlanStatusReport {
        PlanStatusReport {
            plan_id: self.plan.id.clone(),
            status: self.plan.status,
            dry_run: self.plan.dry_run,
            fingerprint: self.plan.fingerprint.clone(),
            stages: self.stages.clone(),
            certification: self.certification.clone(),
            late_results: self.late_results.len(),
            updated_at: self.updated_at,
        }
    }
}

/// Answer to a status query
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanStatusReport {
    pub plan_id: PlanId,
    pub status: PlanStatus,
    pub dry_run: bool,
    pub fingerprint: String,
    pub stages: Vec<StageRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certification: Option<CertificationSummary>,
    /// Number of results recorded after their stage stopped collecting
    pub late_results: usize,
    pub updated_at: DateTime<Utc>,
}

impl PlanStatusReport {
    pub fn stage(&self, stage_id: &str) -> Option<&StageRecord> {
        self.stages.iter().find(|s| s.stage_id.as_str() == stage_id)
    }
}
