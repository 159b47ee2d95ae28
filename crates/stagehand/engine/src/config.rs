use serde::{Deserialize, Serialize};
use stagehand_executor::RetryPolicy;

/// Orchestrator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Partitions executing at once, across all plans
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    #[serde(default)]
    pub retry: RetryPolicy,

    /// Upper bound applied to every stage SLA, if set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sla_cap_ms: Option<u64>,

    /// Capacity of the per-stage result channel
    #[serde(default = "default_result_buffer")]
    pub result_buffer: usize,
}

fn default_max_concurrency() -> usize {
    8
}

fn default_result_buffer() -> usize {
    256
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            retry: RetryPolicy::default(),
            sla_cap_ms: None,
            result_buffer: default_result_buffer(),
        }
    }
}

impl OrchestratorConfig {
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_sla_cap_ms(mut self, cap: u64) -> Self {
        self.sla_cap_ms = Some(cap);
        self
    }

    /// Effective SLA for a stage, given its override and its kind's default
    pub fn effective_sla_ms(&self, stage_override: Option<u64>, kind_default: u64) -> u64 {
        let sla = stage_override.unwrap_or(kind_default);
        match self.sla_cap_ms {
            Some(cap) => sla.min(cap),
            None => sla,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_override_wins_then_cap_applies() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.effective_sla_ms(None, 120_000), 120_000);
        assert_eq!(config.effective_sla_ms(Some(500), 120_000), 500);

        let capped = config.with_sla_cap_ms(1_000);
        assert_eq!(capped.effective_sla_ms(None, 120_000), 1_000);
        assert_eq!(capped.effective_sla_ms(Some(500), 120_000), 500);
    }

    #[test]
    fn deserializes_partial_config() {
        let config: OrchestratorConfig = serde_json::from_str(r#"{"max_concurrency": 2}"#).unwrap();
        assert_eq!(config.max_concurrency, 2);
        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(config.result_buffer, 256);
    }
}
