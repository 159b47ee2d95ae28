//! Runner configuration

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use stagehand_engine::OrchestratorConfig;
use stagehand_gate::GateConfig;
use stagehand_health::HealthConfig;
use stagehand_types::{ChannelHealth, FallbackAction, JobKind};

/// Top-level configuration for the `stagehand` binary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagehandConfig {
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    #[serde(default)]
    pub gate: GateConfig,

    #[serde(default)]
    pub health: HealthConfig,

    /// Register `deploy.pack` and `deploy.migrate`
    #[serde(default = "default_true")]
    pub builtin_kinds: bool,

    /// Additional job kinds registered at startup
    #[serde(default)]
    pub job_kinds: Vec<JobKind>,

    /// External channels plans may depend on
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for StagehandConfig {
    fn default() -> Self {
        Self {
            orchestrator: OrchestratorConfig::default(),
            gate: GateConfig::default(),
            health: HealthConfig::default(),
            builtin_kinds: true,
            job_kinds: Vec::new(),
            channels: Vec::new(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl StagehandConfig {
    /// Load configuration from defaults, an optional file, then the environment.
    ///
    /// Environment keys use the `STAGEHAND_` prefix and `__` between
    /// sections, e.g. `STAGEHAND_ORCHESTRATOR__MAX_CONCURRENCY=4`.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&StagehandConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("STAGEHAND")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}

fn default_true() -> bool {
    true
}

/// A declared external channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub name: String,
    pub fallback: FallbackAction,
    /// Health reported at startup; unset leaves the channel unknown
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<ChannelHealth>,
}

/// Where plan records and certifications are kept
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Lost when the process exits
    #[default]
    Memory,
    File { dir: PathBuf },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
