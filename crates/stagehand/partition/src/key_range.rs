use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use stagehand_types::{PartitionDescriptor, PartitionerName, Stage};

use crate::traits::{input_str, input_u64, stage_items};
use crate::{PartitionError, PartitionResult, Partitioner};

pub const BY_KEY_RANGE: &str = "by_key_range";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRangeConfig {
    /// Item field holding the sort key; `inputs.key_field` overrides it
    #[serde(default = "default_key_field")]
    pub key_field: String,
    /// Fixed partition count; `inputs.partitions` overrides it
    #[serde(default)]
    pub partitions: Option<u64>,
    /// Used to derive the count when none is fixed; `inputs.target_partition_size`
    #[serde(default = "default_target_partition_size")]
    pub target_partition_size: u64,
}

fn default_key_field() -> String {
    "key".into()
}

fn default_target_partition_size() -> u64 {
    100
}

impl Default for KeyRangeConfig {
    fn default() -> Self {
        Self {
            key_field: default_key_field(),
            partitions: None,
            target_partition_size: default_target_partition_size(),
        }
    }
}

/// Sort key. Integers order before strings.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum SortKey {
    Int(i64),
    Str(String),
}

impl SortKey {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(SortKey::Str(s.clone())),
            Value::Number(n) => n.as_i64().map(SortKey::Int),
            _ => None,
        }
    }

    fn to_value(&self) -> Value {
        match self {
            SortKey::Int(n) => json!(n),
            SortKey::Str(s) => json!(s),
        }
    }
}

/// Sorts items by key and splits them into contiguous, roughly
/// equal-count ranges.
///
/// Items sharing a key always land in the same partition, so partition
/// key ranges never overlap. Scalar items are their own key.
#[derive(Clone, Debug, Default)]
pub struct KeyRangePartitioner {
    config: KeyRangeConfig,
}

impl KeyRangePartitioner {
    pub fn new(config: KeyRangeConfig) -> Self {
        Self { config }
    }
}

impl Partitioner for KeyRangePartitioner {
    fn name(&self) -> PartitionerName {
        PartitionerName::new(BY_KEY_RANGE)
    }

    fn partition(&self, stage: &Stage) -> PartitionResult<Vec<PartitionDescriptor>> {
        let items = stage_items(stage)?;
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let field = input_str(stage, "key_field").unwrap_or(&self.config.key_field);

        let mut keyed: Vec<(SortKey, String, &Value)> = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let key_value = if item.is_object() { item.get(field) } else { Some(item) };
            let key = key_value.and_then(SortKey::from_value).ok_or_else(|| {
                PartitionError::MissingKey {
                    stage_id: stage.id.clone(),
                    index,
                    field: field.to_string(),
                }
            })?;
            keyed.push((key, item.to_string(), item));
        }
        // Serialized form breaks ties so input order never matters
        keyed.sort_by(|a, b| match a.0.cmp(&b.0) {
            Ordering::Equal => a.1.cmp(&b.1),
            other => other,
        });

        let total = keyed.len() as u64;
        let target = input_u64(stage, "target_partition_size")?
            .unwrap_or(self.config.target_partition_size)
            .max(1);
        let count = input_u64(stage, "partitions")?
            .or(self.config.partitions)
            .unwrap_or_else(|| total.div_ceil(target))
            .clamp(1, total);

        let mut bounds: Vec<usize> = Vec::with_capacity(count as usize + 1);
        bounds.push(0);
        for i in 1..count {
            let mut cut = ((i * total) / count) as usize;
            let floor = bounds.last().copied().unwrap_or(0);
            cut = cut.max(floor);
            while cut > 0 && cut < keyed.len() && keyed[cut - 1].0 == keyed[cut].0 {
                cut += 1;
            }
            bounds.push(cut);
        }
        bounds.push(keyed.len());
        bounds.dedup();

        let partitions: Vec<PartitionDescriptor> = bounds
            .windows(2)
            .filter(|w| w[0] < w[1])
            .enumerate()
            .map(|(index, w)| {
                let slice = &keyed[w[0]..w[1]];
                let members: Vec<Value> = slice.iter().map(|(_, _, item)| (*item).clone()).collect();
                let start = slice[0].0.to_value();
                let end = slice[slice.len() - 1].0.to_value();
                PartitionDescriptor::new(
                    &stage.id,
                    &stage.executor,
                    index,
                    json!({
                        "items": members,
                        "key_range": { "start": start, "end": end },
                    }),
                )
            })
            .collect();

        tracing::debug!(
            stage_id = %stage.id,
            items = keyed.len(),
            requested = count,
            partitions = partitions.len(),
            "Key-range partitioning complete"
        );
        Ok(partitions)
    }
}
