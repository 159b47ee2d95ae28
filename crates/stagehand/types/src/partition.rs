//! Partitions and their execution results

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{canonical_digest, ExecutorName, PartitionId, StageId};

/// An independently executable slice of a stage's input
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PartitionDescriptor {
    pub partition_id: PartitionId,
    pub stage_id: StageId,
    /// Position in the partitioner's output
    pub index: usize,
    /// Partition-scoped input slice
    pub input: Value,
    /// Content address: hash of (stage, executor, input)
    pub content_id: String,
}

impl PartitionDescriptor {
    pub fn new(stage_id: &StageId, executor: &ExecutorName, index: usize, input: Value) -> Self {
        let content_id = Self::compute_content_id(stage_id, executor, &input);
        Self {
            partition_id: PartitionId::for_stage(stage_id, index),
            stage_id: stage_id.clone(),
            index,
            input,
            content_id,
        }
    }

    pub fn compute_content_id(stage_id: &StageId, executor: &ExecutorName, input: &Value) -> String {
        let body = json!({
            "stage_id": stage_id,
            "executor": executor,
            "input": input,
        });
        let digest = canonical_digest("stagehand-partition-v1", &body);
        digest[..32].to_string()
    }
}

/// Executor-assigned classification of a failure
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureClass {
    /// Transient; safe to re-attempt
    Retryable,
    /// Re-attempting will not help
    Fatal,
}

/// Terminal status of a partition execution
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    Succeeded,
    Failed(FailureClass),
    TimedOut,
    /// The plan was cancelled before or while the partition ran
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionStatus::Succeeded)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Succeeded => "succeeded",
            ExecutionStatus::Failed(FailureClass::Retryable) => "failed_retryable",
            ExecutionStatus::Failed(FailureClass::Fatal) => "failed_fatal",
            ExecutionStatus::TimedOut => "timed_out",
            ExecutionStatus::Cancelled => "cancelled",
        }
    }
}

/// Structured error attached to a failed execution
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

impl ErrorDetail {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Outcome of running one partition (after retries)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub partition_id: PartitionId,
    pub content_id: String,
    pub status: ExecutionStatus,
    #[serde(default)]
    pub output: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
    pub duration_ms: u64,
    /// Number of executor invocations made
    pub attempts: u32,
}

impl ExecutionResult {
    pub fn succeeded(partition: &PartitionDescriptor, output: Value, attempts: u32, duration_ms: u64) -> Self {
        Self {
            partition_id: partition.partition_id.clone(),
            content_id: partition.content_id.clone(),
            status: ExecutionStatus::Succeeded,
            output,
            error: None,
            duration_ms,
            attempts,
        }
    }

    pub fn failed(
        partition: &PartitionDescriptor,
        status: ExecutionStatus,
        error: ErrorDetail,
        attempts: u32,
        duration_ms: u64,
    ) -> Self {
        Self {
            partition_id: partition.partition_id.clone(),
            content_id: partition.content_id.clone(),
            status,
            output: Value::Null,
            error: Some(error),
            duration_ms,
            attempts,
        }
    }

    /// Digest of the output payload, used as a Merkle leaf component
    pub fn output_digest(&self) -> String {
        canonical_digest("stagehand-output-v1", &self.output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_id_is_deterministic() {
        let stage = StageId::new("pack");
        let exec = ExecutorName::new("pack_backend");
        let a = PartitionDescriptor::new(&stage, &exec, 0, json!({"items": ["x"]}));
        let b = PartitionDescriptor::new(&stage, &exec, 0, json!({"items": ["x"]}));
        let c = PartitionDescriptor::new(&stage, &exec, 0, json!({"items": ["y"]}));

        assert_eq!(a.content_id, b.content_id);
        assert_ne!(a.content_id, c.content_id);
        assert_eq!(a.content_id.len(), 32);
        assert_eq!(a.partition_id.as_str(), "pack/p000000");
    }

    #[test]
    fn status_strings() {
        assert_eq!(ExecutionStatus::Succeeded.as_str(), "succeeded");
        assert_eq!(
            ExecutionStatus::Failed(FailureClass::Fatal).as_str(),
            "failed_fatal"
        );
        assert!(!ExecutionStatus::TimedOut.is_success());
    }
}
