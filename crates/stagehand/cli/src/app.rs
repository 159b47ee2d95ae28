//! Orchestrator assembly from configuration

use std::sync::Arc;

use anyhow::Context;
use stagehand_engine::{
    CertificationStorage, FilePlanStore, InMemoryEventBus, InMemoryPlanStore, Orchestrator, PlanStore,
};
use stagehand_health::HealthMonitor;
use stagehand_registry::builtin_kinds;

use crate::config::{StagehandConfig, StorageConfig};

/// A ready orchestrator plus the bus it publishes on
pub struct App {
    pub orchestrator: Orchestrator,
    pub bus: Arc<InMemoryEventBus>,
}

impl App {
    pub async fn build(config: &StagehandConfig) -> anyhow::Result<Self> {
        let health = Arc::new(HealthMonitor::new(config.health.clone()));
        for channel in &config.channels {
            health
                .declare_channel(&channel.name, channel.fallback)
                .with_context(|| format!("failed to declare channel {}", channel.name))?;
            if let Some(initial) = channel.health {
                health.report(&channel.name, initial)?;
            }
        }

        let (store, history): (Arc<dyn PlanStore>, _) = match &config.storage {
            StorageConfig::Memory => (Arc::new(InMemoryPlanStore::new()), Vec::new()),
            StorageConfig::File { dir } => {
                let store = FilePlanStore::open(dir)
                    .await
                    .with_context(|| format!("failed to open plan store at {}", dir.display()))?;
                let history = store.all_certifications().await?;
                (Arc::new(store), history)
            }
        };
        tracing::debug!(certifications = history.len(), "Loaded certification history");

        let bus = Arc::new(InMemoryEventBus::new());
        let mut builder = Orchestrator::builder()
            .with_config(config.orchestrator.clone())
            .with_gate_config(config.gate.clone())
            .with_health_monitor(health)
            .with_store(store)
            .with_bus(bus.clone())
            .with_certification_history(history);
        if config.builtin_kinds {
            builder = builder.with_job_kinds(builtin_kinds());
        }
        let orchestrator = builder.with_job_kinds(config.job_kinds.clone()).build()?;

        Ok(Self { orchestrator, bus })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChannelConfig;
    use stagehand_types::{ChannelHealth, FallbackAction, Plan, PlanStatus, Stage};

    fn pack_plan(id: &str) -> Plan {
        Plan::new(id).with_stage(
            Stage::new("pack", "deploy.pack", "by_filesize", "pack_backend").with_inputs(serde_json::json!({
                "items": [{"path": "a.bin", "size_bytes": 10}, {"path": "b.bin", "size_bytes": 20}]
            })),
        )
    }

    #[tokio::test]
    async fn default_config_runs_builtin_kinds() {
        let app = App::build(&StagehandConfig::default()).await.unwrap();
        assert_eq!(app.orchestrator.list_job_kinds().len(), 2);

        let id = app.orchestrator.submit_plan(pack_plan("p1")).await.unwrap();
        let report = app.orchestrator.wait_for_plan(&id).await.unwrap();
        assert_eq!(report.status, PlanStatus::Completed);
        assert!(!app.bus.events_for(&id).is_empty());
    }

    #[tokio::test]
    async fn declared_channels_start_with_reported_health() {
        let mut config = StagehandConfig::default();
        config.channels.push(ChannelConfig {
            name: "federation".into(),
            fallback: FallbackAction::LocalOnly,
            health: Some(ChannelHealth::Degraded),
        });

        let app = App::build(&config).await.unwrap();
        let health = app.orchestrator.health();
        assert!(health.is_declared("federation"));
        assert_eq!(health.health("federation"), Some(ChannelHealth::Degraded));
    }

    #[tokio::test]
    async fn file_storage_survives_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = StagehandConfig::default();
        config.storage = StorageConfig::File {
            dir: dir.path().to_path_buf(),
        };

        let first = App::build(&config).await.unwrap();
        let id = first.orchestrator.submit_plan(pack_plan("p1")).await.unwrap();
        first.orchestrator.wait_for_plan(&id).await.unwrap();
        drop(first);

        let second = App::build(&config).await.unwrap();
        let report = second.orchestrator.get_plan_status(&id).await.unwrap();
        assert_eq!(report.status, PlanStatus::Completed);
        assert_eq!(second.orchestrator.gate().log().attempts(&id), 1);
    }
}
