//! Lifecycle event bus

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use stagehand_types::{LifecycleEvent, PlanId, Topic};
use tokio::sync::broadcast;

/// Sink for lifecycle events.
///
/// Publishing is fire-and-forget from the orchestrator's point of view: a
/// failed publish is logged and never changes a plan's outcome.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, event: LifecycleEvent) -> Result<(), BusError>;
}

#[derive(Debug, thiserror::Error)]
#[error("event bus error: {0}")]
pub struct BusError(pub String);

/// Records every event and fans it out to subscribers.
pub struct InMemoryEventBus {
    events: Mutex<Vec<LifecycleEvent>>,
    tx: broadcast::Sender<LifecycleEvent>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1024);
        Self {
            events: Mutex::new(Vec::new()),
            tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.tx.subscribe()
    }

    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn events_for(&self, plan_id: &PlanId) -> Vec<LifecycleEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.plan_id() == plan_id)
            .cloned()
            .collect()
    }

    /// Topic names published for `plan_id`, in publish order
    pub fn topics_for(&self, plan_id: &PlanId) -> Vec<String> {
        self.events_for(plan_id).iter().map(|e| e.topic.name()).collect()
    }

    pub fn count(&self, plan_id: &PlanId, topic: Topic) -> usize {
        self.events_for(plan_id).iter().filter(|e| e.topic == topic).count()
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, event: LifecycleEvent) -> Result<(), BusError> {
        tracing::debug!(topic = %event.topic, plan_id = %event.plan_id(), "Event published");
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
        // No subscribers is fine.
        let _ = self.tx.send(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_and_broadcasts() {
        let bus = InMemoryEventBus::new();
        let mut rx = bus.subscribe();
        let plan = PlanId::new("p1");

        bus.publish(LifecycleEvent::new(Topic::PLAN_SUBMITTED, plan.clone(), "submitted"))
            .await
            .unwrap();
        bus.publish(LifecycleEvent::new(Topic::PLAN_CERTIFYING, plan.clone(), "certifying"))
            .await
            .unwrap();
        bus.publish(LifecycleEvent::new(Topic::PLAN_SUBMITTED, PlanId::new("p2"), "submitted"))
            .await
            .unwrap();

        assert_eq!(bus.topics_for(&plan), vec!["job.plan.submitted", "job.plan.certifying"]);
        assert_eq!(bus.count(&plan, Topic::PLAN_SUBMITTED), 1);
        assert_eq!(bus.events().len(), 3);
        assert_eq!(rx.recv().await.unwrap().topic, Topic::PLAN_SUBMITTED);
    }
}
