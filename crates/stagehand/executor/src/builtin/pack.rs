use async_trait::async_trait;
use serde_json::{json, Value};
use stagehand_types::{ExecutorName, FallbackAction, PartitionDescriptor};

use super::partition_items;
use crate::{ExecutionContext, ExecutionOutcome, Executor};

pub const PACK_BACKEND: &str = "pack_backend";

/// Packs a partition's files into a content-addressed bundle.
///
/// Reports `mode: "local"` when a `LocalOnly` fallback is in force and
/// `"federated"` otherwise.
#[derive(Clone, Debug, Default)]
pub struct PackExecutor;

impl PackExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Executor for PackExecutor {
    fn name(&self) -> ExecutorName {
        ExecutorName::new(PACK_BACKEND)
    }

    async fn execute(&self, partition: &PartitionDescriptor, ctx: &ExecutionContext) -> ExecutionOutcome<Value> {
        ctx.checkpoint()?;
        let items = partition_items(partition)?;

        let mut hasher = blake3::Hasher::new();
        hasher.update(b"stagehand-pack-v1:");
        let mut bytes: u64 = 0;
        for item in items {
            ctx.checkpoint()?;
            let path = item
                .get("path")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| item.to_string());
            hasher.update(path.as_bytes());
            hasher.update(b"\n");
            bytes = bytes.saturating_add(item.get("size_bytes").and_then(Value::as_u64).unwrap_or(0));
        }

        let mode = if ctx.has_fallback(FallbackAction::LocalOnly) {
            "local"
        } else {
            "federated"
        };

        tracing::debug!(
            plan_id = %ctx.plan_id,
            partition_id = %partition.partition_id,
            files = items.len(),
            bytes,
            mode,
            "Partition packed"
        );

        Ok(json!({
            "files_processed": items.len(),
            "bytes_processed": bytes,
            "bundle_digest": hasher.finalize().to_hex().to_string(),
            "mode": mode,
        }))
    }
}
