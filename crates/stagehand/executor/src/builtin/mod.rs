//! Built-in deployment executors

mod pack;
mod sql_migrate;

pub use pack::*;
pub use sql_migrate::*;

use serde_json::Value;
use stagehand_types::PartitionDescriptor;

use crate::ExecutionError;

fn partition_items(partition: &PartitionDescriptor) -> Result<&[Value], ExecutionError> {
    match partition.input.get("items") {
        Some(Value::Array(items)) => Ok(items.as_slice()),
        None | Some(Value::Null) => Ok(&[]),
        Some(_) => Err(ExecutionError::InvalidInput("'items' must be an array".into())),
    }
}
