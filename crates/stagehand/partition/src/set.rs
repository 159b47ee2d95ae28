use std::collections::BTreeMap;
use std::sync::Arc;

use stagehand_types::PartitionerName;

use crate::{KeyRangePartitioner, PartitionError, PartitionResult, Partitioner, SizeBoundedPartitioner};

/// Named partitioner implementations available to the orchestrator
#[derive(Clone, Default)]
pub struct PartitionerSet {
    partitioners: BTreeMap<PartitionerName, Arc<dyn Partitioner>>,
}

impl PartitionerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// `by_filesize` and `by_key_range` with default configuration
    pub fn builtin() -> Self {
        let mut set = Self::new();
        set.register(Arc::new(SizeBoundedPartitioner::default()));
        set.register(Arc::new(KeyRangePartitioner::default()));
        set
    }

    /// Add or replace the implementation registered under its name
    pub fn register(&mut self, partitioner: Arc<dyn Partitioner>) {
        self.partitioners.insert(partitioner.name(), partitioner);
    }

    pub fn get(&self, name: &PartitionerName) -> PartitionResult<Arc<dyn Partitioner>> {
        self.partitioners
            .get(name)
            .cloned()
            .ok_or_else(|| PartitionError::UnknownPartitioner(name.clone()))
    }

    pub fn names(&self) -> impl Iterator<Item = &PartitionerName> {
        self.partitioners.keys()
    }

    pub fn len(&self) -> usize {
        self.partitioners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitioners.is_empty()
    }
}
