use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for channel health tracking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Expected interval between heartbeats.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// Missed intervals before a channel is considered degraded.
    #[serde(default = "default_degraded_after_missed")]
    pub degraded_after_missed: u32,

    /// Missed intervals before a channel is considered down.
    #[serde(default = "default_down_after_missed")]
    pub down_after_missed: u32,
}

fn default_heartbeat_interval_ms() -> u64 {
    10_000
}

fn default_degraded_after_missed() -> u32 {
    1
}

fn default_down_after_missed() -> u32 {
    3
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            degraded_after_missed: default_degraded_after_missed(),
            down_after_missed: default_down_after_missed(),
        }
    }
}

impl HealthConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms.max(1))
    }
}
