//! External link channels and their declared fallbacks

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Liveness of an external collaborator channel
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelHealth {
    Healthy,
    Degraded,
    Down,
    /// No heartbeat received yet
    Unknown,
}

impl ChannelHealth {
    pub fn is_healthy(&self) -> bool {
        matches!(self, ChannelHealth::Healthy)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelHealth::Healthy => "healthy",
            ChannelHealth::Degraded => "degraded",
            ChannelHealth::Down => "down",
            ChannelHealth::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ChannelHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Behavior a channel declares for when it is not healthy
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackAction {
    /// Carry on without the feature the channel provides
    ContinueWithoutFeature,
    /// Use the last known cached state
    UseCachedState,
    /// Queue outbound work for later replay
    QueueForReplay,
    /// Switch to synchronous, local-only execution
    LocalOnly,
    /// Accept only input that was validated ahead of time
    PreValidatedOnly,
    /// Disable predictive or optimization features
    DisablePrediction,
    /// Assume a stable baseline for values the channel would supply
    AssumeStableBaseline,
    /// Critical path: failure is fatal for dependent plans
    CriticalNoFallback,
}

impl FallbackAction {
    pub fn is_critical(&self) -> bool {
        matches!(self, FallbackAction::CriticalNoFallback)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackAction::ContinueWithoutFeature => "continue_without_feature",
            FallbackAction::UseCachedState => "use_cached_state",
            FallbackAction::QueueForReplay => "queue_for_replay",
            FallbackAction::LocalOnly => "local_only",
            FallbackAction::PreValidatedOnly => "pre_validated_only",
            FallbackAction::DisablePrediction => "disable_prediction",
            FallbackAction::AssumeStableBaseline => "assume_stable_baseline",
            FallbackAction::CriticalNoFallback => "critical_no_fallback",
        }
    }
}

impl std::fmt::Display for FallbackAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A monitored external dependency
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinkChannel {
    pub name: String,
    pub health: ChannelHealth,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub fallback: FallbackAction,
}

impl LinkChannel {
    pub fn new(name: impl Into<String>, fallback: FallbackAction) -> Self {
        Self {
            name: name.into(),
            health: ChannelHealth::Unknown,
            last_heartbeat: None,
            fallback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_channel_is_unknown() {
        let channel = LinkChannel::new("federation", FallbackAction::LocalOnly);
        assert_eq!(channel.health, ChannelHealth::Unknown);
        assert!(channel.last_heartbeat.is_none());
    }

    #[test]
    fn fallback_wire_names() {
        let encoded = serde_json::to_string(&FallbackAction::LocalOnly).unwrap();
        assert_eq!(encoded, "\"local_only\"");
        let decoded: FallbackAction = serde_json::from_str("\"critical_no_fallback\"").unwrap();
        assert!(decoded.is_critical());
    }
}
