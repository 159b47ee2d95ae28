//! Storage trait definitions

use async_trait::async_trait;
use stagehand_types::{Certification, PlanId};

use crate::{PlanRecord, StoreResult};

/// Combined storage trait
#[async_trait]
pub trait PlanStore: PlanStorage + CertificationStorage + Send + Sync {}

/// Storage for plan records
#[async_trait]
pub trait PlanStorage: Send + Sync {
    /// Create or update a plan record
    async fn save_plan(&self, record: &PlanRecord) -> StoreResult<()>;

    /// Get a plan record by ID
    async fn load_plan(&self, plan_id: &PlanId) -> StoreResult<Option<PlanRecord>>;

    /// List stored plan IDs, sorted
    async fn list_plans(&self) -> StoreResult<Vec<PlanId>>;
}

/// Append-only storage for certification records
#[async_trait]
pub trait CertificationStorage: Send + Sync {
    /// Append a record; fails if the attempt is already stored
    async fn append_certification(&self, certification: &Certification) -> StoreResult<()>;

    /// Records for one plan, by attempt
    async fn certifications(&self, plan_id: &PlanId) -> StoreResult<Vec<Certification>>;

    /// Every stored record
    async fn all_certifications(&self) -> StoreResult<Vec<Certification>>;
}
