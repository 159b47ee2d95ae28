//! Orchestrator control plane
//!
//! The public entry points: submit, query, cancel, wait. Submission runs
//! validation and certification inline; dispatch happens on a spawned
//! task (see [`crate::runner`]) once the plan is `Certified`.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::json;
use stagehand_executor::{CancellationToken, Executor, ExecutorSet, MigrationJournal, SqlMigrateExecutor};
use stagehand_gate::{CertificationLog, CorrectnessValidator, GateConfig, SafetyGate, SafetyValidator, Validator};
use stagehand_health::{HealthConfig, HealthMonitor};
use stagehand_partition::{Partitioner, PartitionerSet};
use stagehand_registry::{ImplementationCatalog, JobKindRegistry};
use stagehand_types::{
    Certification, ErrorCode, JobKind, LifecycleEvent, Plan, PlanId, PlanStatus, Topic, Violation,
};
use tokio::sync::{watch, Mutex, Semaphore};
use tracing::{error, info, instrument, warn};

use crate::{
    runner, EngineError, EngineResult, EventBus, InMemoryEventBus, InMemoryPlanStore, OrchestratorConfig,
    PlanRecord, PlanStatusReport, PlanStore,
};

// ── Plan handle ──────────────────────────────────────────────────────

/// Live state of a plan owned by this process
pub(crate) struct PlanHandle {
    pub(crate) record: Mutex<PlanRecord>,
    pub(crate) cancel: CancellationToken,
    /// Flips to `true` once no task will touch the plan's stages again
    settled: watch::Sender<bool>,
    /// Set while the last save of `record` failed
    unsaved: AtomicBool,
}

impl PlanHandle {
    fn new(record: PlanRecord) -> Self {
        let (settled, _) = watch::channel(false);
        Self {
            record: Mutex::new(record),
            cancel: CancellationToken::new(),
            settled,
            unsaved: AtomicBool::new(false),
        }
    }
}

// ── Shared state ─────────────────────────────────────────────────────

pub(crate) struct Inner {
    pub(crate) config: OrchestratorConfig,
    pub(crate) registry: Arc<JobKindRegistry>,
    pub(crate) partitioners: PartitionerSet,
    pub(crate) executors: ExecutorSet,
    pub(crate) gate: SafetyGate,
    pub(crate) health: Arc<HealthMonitor>,
    pub(crate) store: Arc<dyn PlanStore>,
    pub(crate) bus: Arc<dyn EventBus>,
    /// Bounds partitions in flight across all plans
    pub(crate) pool: Arc<Semaphore>,
    plans: DashMap<PlanId, Arc<PlanHandle>>,
}

impl Inner {
    /// Apply `f` to the plan record under its lock and persist the result.
    ///
    /// Nothing is saved when `f` fails.
    pub(crate) async fn commit<R>(
        &self,
        handle: &PlanHandle,
        f: impl FnOnce(&mut PlanRecord) -> EngineResult<R>,
    ) -> EngineResult<R> {
        let mut record = handle.record.lock().await;
        let out = f(&mut record)?;
        record.updated_at = Utc::now();
        let saved = self.store.save_plan(&record).await;
        handle.unsaved.store(saved.is_err(), Ordering::Release);
        saved?;
        Ok(out)
    }

    /// Mark the plan settled and drop its live handle.
    ///
    /// Later reads go to the store. A handle whose record failed to save
    /// stays live so its state is not lost.
    pub(crate) fn release(&self, plan_id: &PlanId, handle: &PlanHandle) {
        if handle.unsaved.load(Ordering::Acquire) {
            warn!(plan_id = %plan_id, "Keeping plan in memory, last save failed");
        } else {
            self.plans.remove(plan_id);
        }
        handle.settled.send_replace(true);
    }

    pub(crate) async fn publish(&self, event: LifecycleEvent) {
        let topic = event.topic;
        if let Err(e) = self.bus.publish(event).await {
            error!(topic = %topic, error = %e, "Failed to publish lifecycle event");
        }
    }
}

// ── Builder ──────────────────────────────────────────────────────────

/// Assembles an [`Orchestrator`] from its collaborators.
///
/// Starts with the built-in partitioners and executors. The registry is
/// empty unless kinds are added with [`with_job_kind`](Self::with_job_kind).
pub struct OrchestratorBuilder {
    config: OrchestratorConfig,
    gate_config: GateConfig,
    health_config: HealthConfig,
    partitioners: PartitionerSet,
    executors: ExecutorSet,
    validators: Vec<Arc<dyn Validator>>,
    kinds: Vec<JobKind>,
    certifications: Vec<Certification>,
    health: Option<Arc<HealthMonitor>>,
    store: Option<Arc<dyn PlanStore>>,
    bus: Option<Arc<dyn EventBus>>,
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            config: OrchestratorConfig::default(),
            gate_config: GateConfig::default(),
            health_config: HealthConfig::default(),
            partitioners: PartitionerSet::builtin(),
            executors: ExecutorSet::builtin(MigrationJournal::new()),
            validators: Vec::new(),
            kinds: Vec::new(),
            certifications: Vec::new(),
            health: None,
            store: None,
            bus: None,
        }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_gate_config(mut self, config: GateConfig) -> Self {
        self.gate_config = config;
        self
    }

    /// Used only when no monitor is supplied
    pub fn with_health_config(mut self, config: HealthConfig) -> Self {
        self.health_config = config;
        self
    }

    pub fn with_partitioner(mut self, partitioner: Arc<dyn Partitioner>) -> Self {
        self.partitioners.register(partitioner);
        self
    }

    pub fn with_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executors.register(executor);
        self
    }

    /// Back the built-in `sql_migrate` executor with `journal`
    pub fn with_migration_journal(self, journal: MigrationJournal) -> Self {
        self.with_executor(Arc::new(SqlMigrateExecutor::new(journal)))
    }

    /// Extra validator, run alongside the built-in correctness and safety
    /// validators
    pub fn with_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validators.push(validator);
        self
    }

    pub fn with_job_kind(mut self, kind: JobKind) -> Self {
        self.kinds.push(kind);
        self
    }

    pub fn with_job_kinds(mut self, kinds: impl IntoIterator<Item = JobKind>) -> Self {
        self.kinds.extend(kinds);
        self
    }

    /// Certification records from an earlier run, e.g. loaded from the store
    pub fn with_certification_history(mut self, records: Vec<Certification>) -> Self {
        self.certifications = records;
        self
    }

    pub fn with_health_monitor(mut self, monitor: Arc<HealthMonitor>) -> Self {
        self.health = Some(monitor);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn PlanStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_bus(mut self, bus: Arc<dyn EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn build(self) -> EngineResult<Orchestrator> {
        if self.config.max_concurrency == 0 {
            return Err(EngineError::Config("max_concurrency must be at least 1".into()));
        }

        let mut catalog = ImplementationCatalog::new();
        for name in self.partitioners.names() {
            catalog.add_partitioner(name.clone());
        }
        for name in self.executors.names() {
            catalog.add_executor(name.clone());
        }

        let registry = Arc::new(JobKindRegistry::new(catalog));
        for kind in self.kinds {
            registry.register(kind)?;
        }

        let non_idempotent: Vec<_> = self
            .executors
            .names()
            .filter(|name| self.executors.get(name).map_or(false, |e| !e.is_idempotent()))
            .cloned()
            .collect();

        let log = Arc::new(CertificationLog::restore(self.certifications)?);
        let gate = SafetyGate::with_log(self.gate_config, log);
        gate.register_validator(Arc::new(CorrectnessValidator::new(registry.clone())))?;
        gate.register_validator(Arc::new(
            SafetyValidator::new(registry.clone()).with_non_idempotent_executors(non_idempotent),
        ))?;
        for validator in self.validators {
            gate.register_validator(validator)?;
        }

        let health = self
            .health
            .unwrap_or_else(|| Arc::new(HealthMonitor::new(self.health_config)));
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryPlanStore::new()) as Arc<dyn PlanStore>);
        let bus = self
            .bus
            .unwrap_or_else(|| Arc::new(InMemoryEventBus::new()) as Arc<dyn EventBus>);

        info!(
            kinds = registry.len(),
            partitioners = self.partitioners.len(),
            executors = self.executors.len(),
            validators = ?gate.validator_names(),
            max_concurrency = self.config.max_concurrency,
            "Orchestrator ready"
        );

        Ok(Orchestrator {
            inner: Arc::new(Inner {
                pool: Arc::new(Semaphore::new(self.config.max_concurrency)),
                config: self.config,
                registry,
                partitioners: self.partitioners,
                executors: self.executors,
                gate,
                health,
                store,
                bus,
                plans: DashMap::new(),
            }),
        })
    }
}

// ── Orchestrator ─────────────────────────────────────────────────────

/// Plan lifecycle controller. Cheap to clone.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &Arc<JobKindRegistry> {
        &self.inner.registry
    }

    pub fn health(&self) -> &Arc<HealthMonitor> {
        &self.inner.health
    }

    pub fn gate(&self) -> &SafetyGate {
        &self.inner.gate
    }

    pub fn store(&self) -> &Arc<dyn PlanStore> {
        &self.inner.store
    }

    /// Register or upgrade a job kind
    pub fn register_job_kind(&self, kind: JobKind) -> EngineResult<()> {
        let id = kind.id.clone();
        let version = kind.version;
        self.inner.registry.register(kind)?;
        info!(kind_id = %id, version, "Job kind registered");
        Ok(())
    }

    pub fn list_job_kinds(&self) -> Vec<Arc<JobKind>> {
        self.inner.registry.list()
    }

    pub async fn list_plans(&self) -> EngineResult<Vec<PlanId>> {
        Ok(self.inner.store.list_plans().await?)
    }

    /// Every problem that would stop `plan` at submission, in stage order
    pub fn validate_plan(&self, plan: &Plan) -> Vec<Violation> {
        let registry = &self.inner.registry;
        let health = &self.inner.health;
        let mut violations = Vec::new();

        if plan.stages.is_empty() {
            violations.push(Violation::plan_level(ErrorCode::ValidationError, "plan has no stages"));
        }
        if plan.fingerprint != plan.compute_fingerprint() {
            violations.push(Violation::plan_level(
                ErrorCode::ValidationError,
                "fingerprint does not match plan contents",
            ));
        }
        if plan.max_partitions == Some(0) {
            violations.push(Violation::plan_level(
                ErrorCode::ValidationError,
                "max_partitions must be at least 1",
            ));
        }
        for channel in &plan.channels {
            if !health.is_declared(channel) {
                violations.push(Violation::plan_level(
                    ErrorCode::ValidationError,
                    format!("channel '{channel}' is not declared"),
                ));
            }
        }

        let mut seen = HashSet::new();
        for stage in &plan.stages {
            if !seen.insert(&stage.id) {
                violations.push(Violation::new(
                    stage.id.clone(),
                    ErrorCode::ValidationError,
                    format!("duplicate stage id '{}'", stage.id),
                ));
            }
            violations.extend(registry.validate_stage(stage));
            violations.extend(registry.check_inputs(stage));

            if let Ok(kind) = registry.get(&stage.kind_id) {
                for channel in &kind.required_channels {
                    if !health.is_declared(channel) {
                        violations.push(Violation::new(
                            stage.id.clone(),
                            ErrorCode::ValidationError,
                            format!("job kind '{}' requires undeclared channel '{channel}'", kind.id),
                        ));
                    }
                }
            }
        }
        violations
    }

    /// Validate, certify and, once certified, dispatch `plan`.
    ///
    /// An empty plan id is replaced with a generated one and an empty
    /// fingerprint is computed. Returns once the plan is `Certified`;
    /// execution continues in the background.
    #[instrument(skip(self, plan), fields(plan_id = %plan.id))]
    pub async fn submit_plan(&self, mut plan: Plan) -> EngineResult<PlanId> {
        if plan.id.as_str().is_empty() {
            plan.id = PlanId::generate();
        }
        if plan.fingerprint.is_empty() {
            plan.fingerprint = plan.compute_fingerprint();
        }
        plan.status = PlanStatus::Submitted;
        let plan_id = plan.id.clone();

        let violations = self.validate_plan(&plan);
        if !violations.is_empty() {
            warn!(plan_id = %plan_id, violations = violations.len(), "Plan failed validation");
            return Err(EngineError::Validation { plan_id, violations });
        }

        if self.inner.store.load_plan(&plan_id).await?.is_some() {
            return Err(EngineError::DuplicatePlan(plan_id));
        }
        let handle = Arc::new(PlanHandle::new(PlanRecord::new(plan.clone())));
        match self.inner.plans.entry(plan_id.clone()) {
            Entry::Occupied(_) => return Err(EngineError::DuplicatePlan(plan_id)),
            Entry::Vacant(slot) => {
                slot.insert(handle.clone());
            }
        }

        let outcome = self.certify_and_dispatch(&handle, plan).await;
        if !matches!(outcome, Ok(true)) {
            self.inner.release(&plan_id, &handle);
        }
        outcome.map(|_| plan_id)
    }

    /// `Ok(true)` when a runner was spawned
    async fn certify_and_dispatch(&self, handle: &Arc<PlanHandle>, plan: Plan) -> EngineResult<bool> {
        let inner = &self.inner;
        let plan_id = plan.id.clone();

        inner.commit(handle, |_| Ok(())).await?;
        inner
            .publish(
                LifecycleEvent::new(Topic::PLAN_SUBMITTED, plan_id.clone(), PlanStatus::Submitted.as_str())
                    .with_detail(json!({"stages": plan.stages.len(), "dry_run": plan.dry_run})),
            )
            .await;

        inner.commit(handle, |r| r.transition(PlanStatus::Certifying)).await?;
        inner
            .publish(LifecycleEvent::new(
                Topic::PLAN_CERTIFYING,
                plan_id.clone(),
                PlanStatus::Certifying.as_str(),
            ))
            .await;

        let certification = match inner.gate.certify(&plan).await {
            Ok(certification) => certification,
            Err(e) => {
                error!(plan_id = %plan_id, error = %e, "Certification could not run");
                self.reject_unrecorded(handle, &plan_id).await;
                return Err(e.into());
            }
        };
        if let Err(e) = inner.store.append_certification(&certification).await {
            error!(plan_id = %plan_id, attempt = certification.attempt, error = %e, "Failed to persist certification");
            self.reject_unrecorded(handle, &plan_id).await;
            return Err(e.into());
        }

        let summary = certification.summary();
        if !certification.certified {
            let rejected = inner
                .commit(handle, |r| {
                    r.certification = Some(summary.clone());
                    r.transition(PlanStatus::Rejected)
                })
                .await;
            if rejected.is_ok() {
                inner
                    .publish(
                        LifecycleEvent::new(Topic::PLAN_REJECTED, plan_id.clone(), PlanStatus::Rejected.as_str())
                            .with_detail(json!({
                                "attempt": summary.attempt,
                                "rejected_by": summary.rejected_by,
                                "reasons": summary.reasons,
                            })),
                    )
                    .await;
            }
            return Err(EngineError::CertificationRejected {
                certification: Box::new(certification),
            });
        }

        let certified = inner
            .commit(handle, |r| {
                r.certification = Some(summary.clone());
                r.transition(PlanStatus::Certified)
            })
            .await;
        if let Err(e) = certified {
            // Cancelled while certifying.
            info!(plan_id = %plan_id, reason = %e, "Certified plan not dispatched");
            return Ok(false);
        }
        inner
            .publish(
                LifecycleEvent::new(Topic::PLAN_CERTIFIED, plan_id.clone(), PlanStatus::Certified.as_str())
                    .with_detail(json!({"attempt": summary.attempt, "approvals": summary.approvals})),
            )
            .await;

        tokio::spawn(runner::run_plan(inner.clone(), handle.clone(), plan));
        Ok(true)
    }

    /// Reject a plan whose certification was not recorded
    async fn reject_unrecorded(&self, handle: &PlanHandle, plan_id: &PlanId) {
        let rejected = self
            .inner
            .commit(handle, |r| r.transition(PlanStatus::Rejected))
            .await;
        match rejected {
            Ok(()) => {
                self.inner
                    .publish(
                        LifecycleEvent::new(Topic::PLAN_REJECTED, plan_id.clone(), PlanStatus::Rejected.as_str())
                            .with_detail(json!({"reason": "certification not recorded"})),
                    )
                    .await
            }
            Err(e) => error!(plan_id = %plan_id, error = %e, "Failed to record rejected plan"),
        }
    }

    /// Current status, stage results and certification summary
    pub async fn get_plan_status(&self, plan_id: &PlanId) -> EngineResult<PlanStatusReport> {
        if let Some(handle) = self.handle(plan_id) {
            return Ok(handle.record.lock().await.report());
        }
        match self.inner.store.load_plan(plan_id).await? {
            Some(record) => Ok(record.report()),
            None => Err(EngineError::NotFound(plan_id.clone())),
        }
    }

    /// Cancel a non-terminal plan.
    ///
    /// In-flight partitions observe the cancellation at their next
    /// checkpoint. Effects already committed by non-idempotent executors
    /// are not compensated.
    #[instrument(skip(self))]
    pub async fn cancel_plan(&self, plan_id: &PlanId) -> EngineResult<()> {
        let inner = &self.inner;
        let from = match self.handle(plan_id) {
            Some(handle) => {
                inner
                    .commit(&handle, |r| {
                        let from = r.status();
                        r.transition(PlanStatus::Cancelled)?;
                        handle.cancel.cancel();
                        Ok(from)
                    })
                    .await?
            }
            None => {
                let mut record = inner
                    .store
                    .load_plan(plan_id)
                    .await?
                    .ok_or_else(|| EngineError::NotFound(plan_id.clone()))?;
                let from = record.status();
                record.transition(PlanStatus::Cancelled)?;
                inner.store.save_plan(&record).await?;
                from
            }
        };

        info!(plan_id = %plan_id, from = %from, "Plan cancelled");
        inner
            .publish(
                LifecycleEvent::new(Topic::PLAN_CANCELLED, plan_id.clone(), PlanStatus::Cancelled.as_str())
                    .with_detail(json!({"from": from.as_str()})),
            )
            .await;
        Ok(())
    }

    /// Wait until the plan is terminal and its runner has returned.
    ///
    /// Late results may still be appended afterwards.
    pub async fn wait_for_plan(&self, plan_id: &PlanId) -> EngineResult<PlanStatusReport> {
        if let Some(handle) = self.handle(plan_id) {
            let mut settled = handle.settled.subscribe();
            // The sender lives in the handle we hold.
            let _ = settled.wait_for(|done| *done).await;
        }
        self.get_plan_status(plan_id).await
    }

    fn handle(&self, plan_id: &PlanId) -> Option<Arc<PlanHandle>> {
        self.inner.plans.get(plan_id).map(|h| h.value().clone())
    }
}
