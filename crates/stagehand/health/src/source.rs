use async_trait::async_trait;
use stagehand_types::ChannelHealth;

use crate::HealthResult;

/// External collaborator that reports channel status on demand
#[async_trait]
pub trait HeartbeatSource: Send + Sync {
    /// Current status of every channel the source knows about
    async fn poll(&self) -> HealthResult<Vec<(String, ChannelHealth)>>;
}
