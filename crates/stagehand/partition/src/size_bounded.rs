use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use stagehand_types::{PartitionDescriptor, PartitionerName, Stage};

use crate::traits::{input_u64, stage_items};
use crate::{PartitionError, PartitionResult, Partitioner};

pub const BY_FILESIZE: &str = "by_filesize";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeBoundedConfig {
    /// Byte budget per partition; `inputs.chunk_size_bytes` overrides it
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,
    /// Optional item budget per partition; `inputs.max_items` overrides it
    #[serde(default)]
    pub max_items: Option<u64>,
    /// Item field holding its size in bytes
    #[serde(default = "default_size_field")]
    pub size_field: String,
}

fn default_max_bytes() -> u64 {
    50 * 1024 * 1024
}

fn default_size_field() -> String {
    "size_bytes".into()
}

impl Default for SizeBoundedConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_max_bytes(),
            max_items: None,
            size_field: default_size_field(),
        }
    }
}

/// Greedy accumulator: items are added to the open partition until the
/// next one would exceed the byte or item budget.
///
/// An item larger than the byte budget gets a partition to itself.
#[derive(Clone, Debug, Default)]
pub struct SizeBoundedPartitioner {
    config: SizeBoundedConfig,
}

impl SizeBoundedPartitioner {
    pub fn new(config: SizeBoundedConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SizeBoundedConfig {
        &self.config
    }
}

struct OpenPartition {
    items: Vec<Value>,
    bytes: u64,
}

impl OpenPartition {
    fn empty() -> Self {
        Self {
            items: Vec::new(),
            bytes: 0,
        }
    }
}

impl Partitioner for SizeBoundedPartitioner {
    fn name(&self) -> PartitionerName {
        PartitionerName::new(BY_FILESIZE)
    }

    fn partition(&self, stage: &Stage) -> PartitionResult<Vec<PartitionDescriptor>> {
        let items = stage_items(stage)?;
        let max_bytes = input_u64(stage, "chunk_size_bytes")?.unwrap_or(self.config.max_bytes);
        let max_items = input_u64(stage, "max_items")?.or(self.config.max_items);
        let field = &self.config.size_field;

        let mut closed: Vec<OpenPartition> = Vec::new();
        let mut open = OpenPartition::empty();

        for (index, item) in items.iter().enumerate() {
            let size = item.get(field).and_then(Value::as_u64).ok_or_else(|| {
                PartitionError::MissingSize {
                    stage_id: stage.id.clone(),
                    index,
                    field: field.clone(),
                }
            })?;

            let over_bytes = open.bytes.saturating_add(size) > max_bytes;
            let over_items = max_items.map_or(false, |max| open.items.len() as u64 + 1 > max);
            if !open.items.is_empty() && (over_bytes || over_items) {
                closed.push(std::mem::replace(&mut open, OpenPartition::empty()));
            }
            open.bytes = open.bytes.saturating_add(size);
            open.items.push(item.clone());
        }
        if !open.items.is_empty() {
            closed.push(open);
        }

        let partitions: Vec<PartitionDescriptor> = closed
            .into_iter()
            .enumerate()
            .map(|(index, part)| {
                PartitionDescriptor::new(
                    &stage.id,
                    &stage.executor,
                    index,
                    json!({ "items": part.items, "bytes": part.bytes }),
                )
            })
            .collect();

        tracing::debug!(
            stage_id = %stage.id,
            items = items.len(),
            partitions = partitions.len(),
            max_bytes,
            "Size-bounded partitioning complete"
        );
        Ok(partitions)
    }
}
