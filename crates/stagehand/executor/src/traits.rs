use async_trait::async_trait;
use serde_json::Value;
use stagehand_types::{ExecutorName, PartitionDescriptor};

use crate::{ExecutionContext, ExecutionOutcome};

/// Runs one partition.
///
/// Unless the owning stage is flagged `non_idempotent`, running the same
/// partition twice must give the same output with no further side effects.
#[async_trait]
pub trait Executor: Send + Sync {
    fn name(&self) -> ExecutorName;

    /// Whether this implementation commits effects that repeat on re-run
    fn is_idempotent(&self) -> bool {
        true
    }

    async fn execute(&self, partition: &PartitionDescriptor, ctx: &ExecutionContext) -> ExecutionOutcome<Value>;
}
