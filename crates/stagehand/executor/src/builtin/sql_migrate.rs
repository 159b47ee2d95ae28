use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use stagehand_types::{ExecutorName, PartitionDescriptor, PlanId};

use super::partition_items;
use crate::{ExecutionContext, ExecutionError, ExecutionOutcome, Executor};

pub const SQL_MIGRATE: &str = "sql_migrate";

/// A statement committed to the journal
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AppliedStatement {
    pub statement_id: String,
    pub sql: String,
    pub plan_id: PlanId,
    pub applied_at: DateTime<Utc>,
}

/// Shared record of applied migration statements, keyed by statement id.
///
/// Stands in for the target database. Entries are never removed.
#[derive(Clone, Debug, Default)]
pub struct MigrationJournal {
    applied: Arc<Mutex<BTreeMap<String, AppliedStatement>>>,
}

impl MigrationJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_applied(&self, statement_id: &str) -> bool {
        self.applied
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(statement_id)
    }

    /// Record a statement; returns false if it was already applied
    fn apply(&self, statement: AppliedStatement) -> bool {
        let mut applied = self.applied.lock().unwrap_or_else(PoisonError::into_inner);
        if applied.contains_key(&statement.statement_id) {
            return false;
        }
        applied.insert(statement.statement_id.clone(), statement);
        true
    }

    pub fn entries(&self) -> Vec<AppliedStatement> {
        self.applied
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.applied.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Applies migration statements to a [`MigrationJournal`].
///
/// Dry runs report what would be applied without touching the journal.
/// Partition items are `{ "id" | "key": string, "sql": string }`.
#[derive(Clone, Debug, Default)]
pub struct SqlMigrateExecutor {
    journal: MigrationJournal,
}

impl SqlMigrateExecutor {
    pub fn new(journal: MigrationJournal) -> Self {
        Self { journal }
    }

    pub fn journal(&self) -> &MigrationJournal {
        &self.journal
    }
}

fn statement_parts(item: &Value) -> Result<(String, String), ExecutionError> {
    let id = item
        .get("id")
        .or_else(|| item.get("key"))
        .and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .ok_or_else(|| ExecutionError::InvalidInput("statement without 'id' or 'key'".into()))?;
    let sql = item
        .get("sql")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ExecutionError::fatal(format!("statement {id} has no sql")))?;
    Ok((id, sql.to_string()))
}

#[async_trait]
impl Executor for SqlMigrateExecutor {
    fn name(&self) -> ExecutorName {
        ExecutorName::new(SQL_MIGRATE)
    }

    fn is_idempotent(&self) -> bool {
        false
    }

    async fn execute(&self, partition: &PartitionDescriptor, ctx: &ExecutionContext) -> ExecutionOutcome<Value> {
        ctx.checkpoint()?;
        let items = partition_items(partition)?;

        let mut pending = Vec::new();
        let mut applied = Vec::new();
        let mut skipped = 0u64;

        for item in items {
            ctx.checkpoint()?;
            let (statement_id, sql) = statement_parts(item)?;

            if self.journal.is_applied(&statement_id) {
                skipped += 1;
                continue;
            }
            if ctx.dry_run {
                pending.push(statement_id);
                continue;
            }

            let committed = self.journal.apply(AppliedStatement {
                statement_id: statement_id.clone(),
                sql,
                plan_id: ctx.plan_id.clone(),
                applied_at: Utc::now(),
            });
            if committed {
                tracing::info!(
                    plan_id = %ctx.plan_id,
                    partition_id = %partition.partition_id,
                    statement_id = %statement_id,
                    "Migration statement applied"
                );
                applied.push(statement_id);
            } else {
                skipped += 1;
            }
        }

        Ok(json!({
            "statements": items.len(),
            "applied": applied.len(),
            "skipped": skipped,
            "would_apply": pending,
            "applied_ids": applied,
            "dry_run": ctx.dry_run,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stagehand_types::StageId;

    fn partition() -> PartitionDescriptor {
        PartitionDescriptor::new(
            &StageId::new("migrate"),
            &ExecutorName::new(SQL_MIGRATE),
            0,
            json!({"items": [
                {"id": "001_users", "sql": "create table users(id int)"},
                {"id": "002_orders", "sql": "create table orders(id int)"},
            ]}),
        )
    }

    fn ctx(dry_run: bool) -> ExecutionContext {
        ExecutionContext::new(PlanId::new("m"), StageId::new("migrate"))
            .with_dry_run(dry_run)
            .with_non_idempotent(true)
    }

    #[tokio::test]
    async fn dry_run_leaves_journal_untouched() {
        let exec = SqlMigrateExecutor::new(MigrationJournal::new());
        let out = exec.execute(&partition(), &ctx(true)).await.unwrap();

        assert_eq!(out["applied"], 0);
        assert_eq!(out["would_apply"], json!(["001_users", "002_orders"]));
        assert!(exec.journal().is_empty());
    }

    #[tokio::test]
    async fn real_run_commits_once() {
        let journal = MigrationJournal::new();
        let exec = SqlMigrateExecutor::new(journal.clone());

        let first = exec.execute(&partition(), &ctx(false)).await.unwrap();
        assert_eq!(first["applied"], 2);
        assert_eq!(journal.len(), 2);

        let second = exec.execute(&partition(), &ctx(false)).await.unwrap();
        assert_eq!(second["applied"], 0);
        assert_eq!(second["skipped"], 2);
        assert_eq!(journal.len(), 2);
    }

    #[tokio::test]
    async fn empty_sql_is_fatal() {
        let exec = SqlMigrateExecutor::new(MigrationJournal::new());
        let p = PartitionDescriptor::new(
            &StageId::new("migrate"),
            &ExecutorName::new(SQL_MIGRATE),
            0,
            json!({"items": [{"id": "003", "sql": "  "}]}),
        );
        let err = exec.execute(&p, &ctx(false)).await.unwrap_err();
        assert!(matches!(err, ExecutionError::Fatal(_)));
    }

    #[test]
    fn declares_non_idempotent() {
        assert!(!SqlMigrateExecutor::default().is_idempotent());
    }
}
