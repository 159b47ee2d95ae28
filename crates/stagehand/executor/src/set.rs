use std::collections::BTreeMap;
use std::sync::Arc;

use stagehand_types::ExecutorName;

use crate::{ExecutionError, Executor, MigrationJournal, PackExecutor, SqlMigrateExecutor};

/// Named executor implementations available to the orchestrator
#[derive(Clone, Default)]
pub struct ExecutorSet {
    executors: BTreeMap<ExecutorName, Arc<dyn Executor>>,
}

impl ExecutorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// `pack_backend`, plus `sql_migrate` writing to `journal`
    pub fn builtin(journal: MigrationJournal) -> Self {
        let mut set = Self::new();
        set.register(Arc::new(PackExecutor::new()));
        set.register(Arc::new(SqlMigrateExecutor::new(journal)));
        set
    }

    pub fn register(&mut self, executor: Arc<dyn Executor>) {
        self.executors.insert(executor.name(), executor);
    }

    pub fn get(&self, name: &ExecutorName) -> Result<Arc<dyn Executor>, ExecutionError> {
        self.executors
            .get(name)
            .cloned()
            .ok_or_else(|| ExecutionError::UnknownExecutor(name.clone()))
    }

    pub fn names(&self) -> impl Iterator<Item = &ExecutorName> {
        self.executors.keys()
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}
