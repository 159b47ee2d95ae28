//! In-memory storage implementation

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use stagehand_types::{Certification, PlanId};
use tokio::sync::RwLock;

use super::traits::*;
use crate::{PlanRecord, StoreError, StoreResult};

/// In-memory storage for development and testing
#[derive(Debug)]
pub struct InMemoryPlanStore {
    plans: Arc<RwLock<HashMap<PlanId, PlanRecord>>>,
    certifications: Arc<RwLock<BTreeMap<(PlanId, u32), Certification>>>,
}

impl Default for InMemoryPlanStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryPlanStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self {
            plans: Arc::new(RwLock::new(HashMap::new())),
            certifications: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }
}

#[async_trait]
impl PlanStorage for InMemoryPlanStore {
    async fn save_plan(&self, record: &PlanRecord) -> StoreResult<()> {
        let mut plans = self.plans.write().await;
        plans.insert(record.id().clone(), record.clone());
        Ok(())
    }

    async fn load_plan(&self, plan_id: &PlanId) -> StoreResult<Option<PlanRecord>> {
        let plans = self.plans.read().await;
        Ok(plans.get(plan_id).cloned())
    }

    async fn list_plans(&self) -> StoreResult<Vec<PlanId>> {
        let plans = self.plans.read().await;
        let mut ids: Vec<_> = plans.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

#[async_trait]
impl CertificationStorage for InMemoryPlanStore {
    async fn append_certification(&self, certification: &Certification) -> StoreResult<()> {
        let mut certifications = self.certifications.write().await;
        let key = (certification.plan_id.clone(), certification.attempt);
        if certifications.contains_key(&key) {
            return Err(StoreError::Immutable {
                plan_id: key.0,
                attempt: key.1,
            });
        }
        certifications.insert(key, certification.clone());
        Ok(())
    }

    async fn certifications(&self, plan_id: &PlanId) -> StoreResult<Vec<Certification>> {
        let certifications = self.certifications.read().await;
        Ok(certifications
            .range((plan_id.clone(), 0)..=(plan_id.clone(), u32::MAX))
            .map(|(_, c)| c.clone())
            .collect())
    }

    async fn all_certifications(&self) -> StoreResult<Vec<Certification>> {
        let certifications = self.certifications.read().await;
        Ok(certifications.values().cloned().collect())
    }
}

impl PlanStore for InMemoryPlanStore {}
