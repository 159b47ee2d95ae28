use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use stagehand_types::{ErrorCode, JobKind, JobKindId, Stage, Violation};

use crate::{ImplementationCatalog, RegistryError, RegistryResult};

#[derive(Default)]
struct RegistryState {
    current: HashMap<JobKindId, Arc<JobKind>>,
    /// Superseded versions, oldest first
    history: HashMap<JobKindId, Vec<Arc<JobKind>>>,
}

/// Read-mostly store of job kind contracts.
pub struct JobKindRegistry {
    catalog: ImplementationCatalog,
    state: RwLock<RegistryState>,
}

impl JobKindRegistry {
    pub fn new(catalog: ImplementationCatalog) -> Self {
        Self {
            catalog,
            state: RwLock::new(RegistryState::default()),
        }
    }

    pub fn catalog(&self) -> &ImplementationCatalog {
        &self.catalog
    }

    /// Register a job kind.
    ///
    /// An id that is already registered is accepted only with a strictly
    /// higher `version`; the replaced contract moves to history.
    pub fn register(&self, kind: JobKind) -> RegistryResult<()> {
        self.check_contract(&kind)?;

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = state.current.get(&kind.id) {
            if kind.version <= existing.version {
                return Err(RegistryError::DuplicateKind {
                    kind_id: kind.id.clone(),
                    current: existing.version,
                    attempted: kind.version,
                });
            }
        }

        let id = kind.id.clone();
        let version = kind.version;
        if let Some(previous) = state.current.insert(id.clone(), Arc::new(kind)) {
            state.history.entry(id.clone()).or_default().push(previous);
        }

        tracing::info!(kind_id = %id, version, "Job kind registered");
        Ok(())
    }

    fn check_contract(&self, kind: &JobKind) -> RegistryResult<()> {
        if kind.id.as_str().trim().is_empty() {
            return Err(RegistryError::EmptyKindId);
        }
        if kind.allowed_partitioners.is_empty() {
            return Err(RegistryError::EmptyPartitioners(kind.id.clone()));
        }
        if kind.allowed_executors.is_empty() {
            return Err(RegistryError::EmptyExecutors(kind.id.clone()));
        }
        if kind.default_sla_ms == 0 {
            return Err(RegistryError::ZeroSla(kind.id.clone()));
        }
        if let Some(name) = kind
            .allowed_partitioners
            .iter()
            .find(|p| !self.catalog.has_partitioner(p))
        {
            return Err(RegistryError::UnknownImplementation {
                kind_id: kind.id.clone(),
                role: "partitioner",
                name: name.to_string(),
            });
        }
        if let Some(name) = kind
            .allowed_executors
            .iter()
            .find(|e| !self.catalog.has_executor(e))
        {
            return Err(RegistryError::UnknownImplementation {
                kind_id: kind.id.clone(),
                role: "executor",
                name: name.to_string(),
            });
        }
        Ok(())
    }

    pub fn get(&self, kind_id: &JobKindId) -> RegistryResult<Arc<JobKind>> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .current
            .get(kind_id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(kind_id.clone()))
    }

    pub fn contains(&self, kind_id: &JobKindId) -> bool {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .current
            .contains_key(kind_id)
    }

    /// All current kinds, sorted by id
    pub fn list(&self) -> Vec<Arc<JobKind>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let mut kinds: Vec<_> = state.current.values().cloned().collect();
        kinds.sort_by(|a, b| a.id.cmp(&b.id));
        kinds
    }

    /// Every registered version of a kind, oldest first, current last
    pub fn versions(&self, kind_id: &JobKindId) -> Vec<Arc<JobKind>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let mut versions = state.history.get(kind_id).cloned().unwrap_or_default();
        if let Some(current) = state.current.get(kind_id) {
            versions.push(current.clone());
        }
        versions
    }

    pub fn len(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .current
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check a stage's bindings against its kind, returning every
    /// violation found.
    pub fn validate_stage(&self, stage: &Stage) -> Vec<Violation> {
        let kind = match self.get(&stage.kind_id) {
            Ok(kind) => kind,
            Err(_) => {
                return vec![Violation::new(
                    stage.id.clone(),
                    ErrorCode::UnknownKind,
                    format!("unknown job kind '{}'", stage.kind_id),
                )];
            }
        };

        let mut violations = Vec::new();
        if !kind.allows_partitioner(&stage.partitioner) {
            violations.push(Violation::new(
                stage.id.clone(),
                ErrorCode::DisallowedPartitioner,
                format!(
                    "partitioner '{}' not allowed for job kind '{}'",
                    stage.partitioner, kind.id
                ),
            ));
        }
        if !kind.allows_executor(&stage.executor) {
            violations.push(Violation::new(
                stage.id.clone(),
                ErrorCode::DisallowedExecutor,
                format!(
                    "executor '{}' not allowed for job kind '{}'",
                    stage.executor, kind.id
                ),
            ));
        }
        if stage.non_idempotent && !kind.safety_policy.allow_non_idempotent {
            violations.push(Violation::new(
                stage.id.clone(),
                ErrorCode::IllegalNonIdempotent,
                format!("job kind '{}' does not allow non-idempotent stages", kind.id),
            ));
        }
        violations
    }

    /// Check a stage's inputs against its kind's input schema.
    ///
    /// Unknown kinds yield nothing here; [`validate_stage`](Self::validate_stage)
    /// already reports them.
    pub fn check_inputs(&self, stage: &Stage) -> Vec<Violation> {
        let Ok(kind) = self.get(&stage.kind_id) else {
            return Vec::new();
        };
        kind.input_schema
            .check(&stage.inputs)
            .into_iter()
            .map(|problem| {
                Violation::new(
                    stage.id.clone(),
                    ErrorCode::SchemaViolation,
                    format!("inputs: {problem}"),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stagehand_types::SafetyPolicy;

    fn catalog() -> ImplementationCatalog {
        ImplementationCatalog::new()
            .with_partitioner("by_filesize")
            .with_partitioner("by_key_range")
            .with_executor("pack_backend")
            .with_executor("sql_migrate")
    }

    fn pack_kind() -> JobKind {
        JobKind::new("deploy.pack", 60_000)
            .allow_partitioner("by_filesize")
            .allow_executor("pack_backend")
    }

    #[test]
    fn register_and_get() {
        let registry = JobKindRegistry::new(catalog());
        registry.register(pack_kind()).unwrap();

        let kind = registry.get(&JobKindId::new("deploy.pack")).unwrap();
        assert_eq!(kind.default_sla_ms, 60_000);
        assert_eq!(registry.len(), 1);
        assert!(matches!(
            registry.get(&JobKindId::new("deploy.nope")),
            Err(RegistryError::NotFound(_))
        ));
    }

    #[test]
    fn rejects_empty_sets() {
        let registry = JobKindRegistry::new(catalog());
        let no_partitioners = JobKind::new("a", 1).allow_executor("pack_backend");
        let no_executors = JobKind::new("b", 1).allow_partitioner("by_filesize");

        assert!(matches!(
            registry.register(no_partitioners),
            Err(RegistryError::EmptyPartitioners(_))
        ));
        assert!(matches!(
            registry.register(no_executors),
            Err(RegistryError::EmptyExecutors(_))
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn rejects_names_outside_catalog() {
        let registry = JobKindRegistry::new(catalog());
        let kind = pack_kind().allow_executor("warm_registry");

        let err = registry.register(kind).unwrap_err();
        assert!(matches!(
            err,
            RegistryError::UnknownImplementation { role: "executor", .. }
        ));
        assert_eq!(err.code(), ErrorCode::ValidationError);
    }

    #[test]
    fn duplicate_requires_version_bump() {
        let registry = JobKindRegistry::new(catalog());
        registry.register(pack_kind()).unwrap();

        assert!(matches!(
            registry.register(pack_kind()),
            Err(RegistryError::DuplicateKind { current: 1, attempted: 1, .. })
        ));

        registry
            .register(pack_kind().with_version(2).with_description("v2"))
            .unwrap();
        let id = JobKindId::new("deploy.pack");
        assert_eq!(registry.get(&id).unwrap().version, 2);

        let versions: Vec<u32> = registry.versions(&id).iter().map(|k| k.version).collect();
        assert_eq!(versions, vec![1, 2]);

        assert!(registry.register(pack_kind().with_version(2)).is_err());
    }

    #[test]
    fn validate_stage_reports_every_violation() {
        let registry = JobKindRegistry::new(catalog());
        registry.register(pack_kind()).unwrap();

        let stage = Stage::new("bad", "deploy.pack", "by_key_range", "sql_migrate").non_idempotent();
        let codes: Vec<ErrorCode> = registry
            .validate_stage(&stage)
            .into_iter()
            .map(|v| v.code)
            .collect();

        assert_eq!(
            codes,
            vec![
                ErrorCode::DisallowedPartitioner,
                ErrorCode::DisallowedExecutor,
                ErrorCode::IllegalNonIdempotent,
            ]
        );
    }

    #[test]
    fn validate_stage_unknown_kind() {
        let registry = JobKindRegistry::new(catalog());
        let stage = Stage::new("s", "deploy.ghost", "by_filesize", "pack_backend");

        let violations = registry.validate_stage(&stage);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].code, ErrorCode::UnknownKind);
    }

    #[test]
    fn non_idempotent_permitted_by_policy() {
        let registry = JobKindRegistry::new(catalog());
        registry
            .register(
                JobKind::new("deploy.migrate", 1_000)
                    .allow_partitioner("by_key_range")
                    .allow_executor("sql_migrate")
                    .with_safety_policy(SafetyPolicy::guarded()),
            )
            .unwrap();

        let stage = Stage::new("m", "deploy.migrate", "by_key_range", "sql_migrate").non_idempotent();
        assert!(registry.validate_stage(&stage).is_empty());
    }

    #[test]
    fn concurrent_readers() {
        let registry = Arc::new(JobKindRegistry::new(catalog()));
        registry.register(pack_kind()).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.get(&JobKindId::new("deploy.pack")).is_ok())
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }
    }
}
