use stagehand_types::{PartitionerName, StageId};
use thiserror::Error;

/// Errors from partitioning a stage's inputs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PartitionError {
    #[error("stage {stage_id}: invalid inputs: {reason}")]
    InvalidInput { stage_id: StageId, reason: String },

    #[error("stage {stage_id}: item {index} has no numeric '{field}'")]
    MissingSize {
        stage_id: StageId,
        index: usize,
        field: String,
    },

    #[error("stage {stage_id}: item {index} has no string or integer key '{field}'")]
    MissingKey {
        stage_id: StageId,
        index: usize,
        field: String,
    },

    #[error("partitioner not registered: {0}")]
    UnknownPartitioner(PartitionerName),
}

pub type PartitionResult<T> = Result<T, PartitionError>;
