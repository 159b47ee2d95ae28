//! File-backed store: persistence across reopen and immutability

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use stagehand_engine::{
    CertificationStorage, FilePlanStore, InMemoryEventBus, Orchestrator, PlanRecord, PlanStorage, PlanStore,
    StoreError,
};
use stagehand_registry::builtin_kinds;
use stagehand_types::{Certification, Plan, PlanId, PlanStatus, Stage};

fn certification(plan: &str, attempt: u32) -> Certification {
    Certification {
        plan_id: PlanId::new(plan),
        attempt,
        fingerprint: "fp".into(),
        dry_run: false,
        validator_results: Default::default(),
        certified: false,
        rejection_reasons: Vec::new(),
        timestamp: Utc::now(),
        valid_until: None,
    }
}

#[tokio::test]
async fn records_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = FilePlanStore::open(dir.path()).await.unwrap();
        let mut record = PlanRecord::new(Plan::new("p-1"));
        record.transition(PlanStatus::Certifying).unwrap();
        store.save_plan(&record).await.unwrap();
        store.append_certification(&certification("p-1", 1)).await.unwrap();
        store.append_certification(&certification("p-1", 2)).await.unwrap();
    }

    let store = FilePlanStore::open(dir.path()).await.unwrap();
    let loaded = store.load_plan(&PlanId::new("p-1")).await.unwrap().unwrap();
    assert_eq!(loaded.status(), PlanStatus::Certifying);
    assert_eq!(store.list_plans().await.unwrap(), vec![PlanId::new("p-1")]);

    let attempts: Vec<_> = store
        .certifications(&PlanId::new("p-1"))
        .await
        .unwrap()
        .iter()
        .map(|c| c.attempt)
        .collect();
    assert_eq!(attempts, vec![1, 2]);
}

#[tokio::test]
async fn certification_lines_are_never_rewritten() {
    let dir = tempfile::tempdir().unwrap();
    let store = FilePlanStore::open(dir.path()).await.unwrap();

    store.append_certification(&certification("p/2", 1)).await.unwrap();
    let err = store.append_certification(&certification("p/2", 1)).await.unwrap_err();
    assert!(matches!(err, StoreError::Immutable { attempt: 1, .. }));

    let all = store.all_certifications().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].plan_id, PlanId::new("p/2"));
}

#[tokio::test]
async fn orchestrator_restores_dry_run_authorization() {
    let dir = tempfile::tempdir().unwrap();
    let migrate = Stage::new("migrate", "deploy.migrate", "by_key_range", "sql_migrate")
        .with_inputs(json!({"items": [{"key": "001", "sql": "create table t(id int)"}]}))
        .non_idempotent();
    let dry = Plan::new("dry").with_stage(migrate).as_dry_run();
    let real = dry.promote("real");

    {
        let store: Arc<dyn PlanStore> = Arc::new(FilePlanStore::open(dir.path()).await.unwrap());
        let orch = Orchestrator::builder()
            .with_job_kinds(builtin_kinds())
            .with_store(store)
            .build()
            .unwrap();
        let id = orch.submit_plan(dry).await.unwrap();
        assert_eq!(orch.wait_for_plan(&id).await.unwrap().status, PlanStatus::Completed);
    }

    // A fresh process sees the dry run through the restored log.
    let store = Arc::new(FilePlanStore::open(dir.path()).await.unwrap());
    let history = store.all_certifications().await.unwrap();
    let orch = Orchestrator::builder()
        .with_job_kinds(builtin_kinds())
        .with_certification_history(history)
        .with_store(store.clone())
        .with_bus(Arc::new(InMemoryEventBus::new()))
        .build()
        .unwrap();

    let dry_report = orch.get_plan_status(&PlanId::new("dry")).await.unwrap();
    assert_eq!(dry_report.status, PlanStatus::Completed);

    let id = orch.submit_plan(real).await.unwrap();
    let report = orch.wait_for_plan(&id).await.unwrap();
    assert_eq!(report.status, PlanStatus::Completed);
    assert_eq!(report.stages[0].aggregated["applied"], json!(1));
}
