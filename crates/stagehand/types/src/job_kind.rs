//! Job kinds: the registered contract for a category of work

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{ExecutorName, JobKindId, PartitionerName, SchemaDescriptor};

/// Safety rules that apply to every stage of a job kind
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyPolicy {
    /// Stages of this kind may be flagged `non_idempotent`
    #[serde(default)]
    pub allow_non_idempotent: bool,
    /// A real run must be preceded by a certified dry run of the same plan
    #[serde(default)]
    pub require_dry_run: bool,
}

impl SafetyPolicy {
    pub fn idempotent() -> Self {
        Self::default()
    }

    pub fn guarded() -> Self {
        Self {
            allow_non_idempotent: true,
            require_dry_run: true,
        }
    }
}

/// Registered contract for a category of work.
///
/// Immutable once registered; changes go through a re-registration with
/// a higher `version`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobKind {
    pub id: JobKindId,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub description: String,
    pub allowed_partitioners: BTreeSet<PartitionerName>,
    pub allowed_executors: BTreeSet<ExecutorName>,
    #[serde(default)]
    pub safety_policy: SafetyPolicy,
    pub default_sla_ms: u64,
    #[serde(default)]
    pub input_schema: SchemaDescriptor,
    #[serde(default)]
    pub output_schema: SchemaDescriptor,
    /// External channels every stage of this kind depends on
    #[serde(default)]
    pub required_channels: Vec<String>,
}

fn default_version() -> u32 {
    1
}

impl JobKind {
    pub fn new(id: impl Into<String>, default_sla_ms: u64) -> Self {
        Self {
            id: JobKindId::new(id),
            version: 1,
            description: String::new(),
            allowed_partitioners: BTreeSet::new(),
            allowed_executors: BTreeSet::new(),
            safety_policy: SafetyPolicy::default(),
            default_sla_ms,
            input_schema: SchemaDescriptor::any(),
            output_schema: SchemaDescriptor::any(),
            required_channels: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn allow_partitioner(mut self, name: impl Into<String>) -> Self {
        self.allowed_partitioners.insert(PartitionerName::new(name));
        self
    }

    pub fn allow_executor(mut self, name: impl Into<String>) -> Self {
        self.allowed_executors.insert(ExecutorName::new(name));
        self
    }

    pub fn with_safety_policy(mut self, policy: SafetyPolicy) -> Self {
        self.safety_policy = policy;
        self
    }

    pub fn with_input_schema(mut self, schema: SchemaDescriptor) -> Self {
        self.input_schema = schema;
        self
    }

    pub fn with_output_schema(mut self, schema: SchemaDescriptor) -> Self {
        self.output_schema = schema;
        self
    }

    pub fn requires_channel(mut self, channel: impl Into<String>) -> Self {
        self.required_channels.push(channel.into());
        self
    }

    pub fn allows_partitioner(&self, name: &PartitionerName) -> bool {
        self.allowed_partitioners.contains(name)
    }

    pub fn allows_executor(&self, name: &ExecutorName) -> bool {
        self.allowed_executors.contains(name)
    }
}
