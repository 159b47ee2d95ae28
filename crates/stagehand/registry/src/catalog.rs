use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use stagehand_types::{ExecutorName, PartitionerName};

/// The closed set of partitioner and executor implementations available
/// to the orchestrator.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImplementationCatalog {
    partitioners: BTreeSet<PartitionerName>,
    executors: BTreeSet<ExecutorName>,
}

impl ImplementationCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_partitioner(mut self, name: impl Into<String>) -> Self {
        self.partitioners.insert(PartitionerName::new(name));
        self
    }

    pub fn with_executor(mut self, name: impl Into<String>) -> Self {
        self.executors.insert(ExecutorName::new(name));
        self
    }

    pub fn add_partitioner(&mut self, name: PartitionerName) {
        self.partitioners.insert(name);
    }

    pub fn add_executor(&mut self, name: ExecutorName) {
        self.executors.insert(name);
    }

    pub fn has_partitioner(&self, name: &PartitionerName) -> bool {
        self.partitioners.contains(name)
    }

    pub fn has_executor(&self, name: &ExecutorName) -> bool {
        self.executors.contains(name)
    }

    pub fn partitioners(&self) -> impl Iterator<Item = &PartitionerName> {
        self.partitioners.iter()
    }

    pub fn executors(&self) -> impl Iterator<Item = &ExecutorName> {
        self.executors.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn membership() {
        let catalog = ImplementationCatalog::new()
            .with_partitioner("by_filesize")
            .with_executor("pack_backend");

        assert!(catalog.has_partitioner(&PartitionerName::new("by_filesize")));
        assert!(!catalog.has_partitioner(&PartitionerName::new("by_module")));
        assert!(catalog.has_executor(&ExecutorName::new("pack_backend")));
        assert_eq!(catalog.executors().count(), 1);
    }
}
