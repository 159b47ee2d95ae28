use serde_json::Value;
use stagehand_types::{PartitionDescriptor, PartitionerName, Stage};

use crate::{PartitionError, PartitionResult};

/// Turns one stage's inputs into ordered, independently executable slices.
///
/// Implementations must be deterministic in `stage.inputs`.
pub trait Partitioner: Send + Sync {
    fn name(&self) -> PartitionerName;

    fn partition(&self, stage: &Stage) -> PartitionResult<Vec<PartitionDescriptor>>;
}

/// The stage's `items` array. `null` inputs count as no items.
pub fn stage_items(stage: &Stage) -> PartitionResult<&[Value]> {
    match &stage.inputs {
        Value::Null => Ok(&[]),
        Value::Object(map) => match map.get("items") {
            Some(Value::Array(items)) => Ok(items.as_slice()),
            Some(Value::Null) | None => Ok(&[]),
            Some(_) => Err(PartitionError::InvalidInput {
                stage_id: stage.id.clone(),
                reason: "'items' must be an array".into(),
            }),
        },
        _ => Err(PartitionError::InvalidInput {
            stage_id: stage.id.clone(),
            reason: "inputs must be a JSON object".into(),
        }),
    }
}

/// A numeric per-stage override from `inputs`, if present
pub(crate) fn input_u64(stage: &Stage, field: &str) -> PartitionResult<Option<u64>> {
    match stage.inputs.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v.as_u64().filter(|n| *n > 0).map(Some).ok_or_else(|| {
            PartitionError::InvalidInput {
                stage_id: stage.id.clone(),
                reason: format!("'{field}' must be a positive integer"),
            }
        }),
    }
}

pub(crate) fn input_str<'a>(stage: &'a Stage, field: &str) -> Option<&'a str> {
    stage.inputs.get(field).and_then(Value::as_str)
}
