//! Lifecycle events published to the external bus.
//!
//! Topics are `<domain>.<subject>.<verb>` built from typed parts. Only the
//! combinations in [`Topic::ALL`] exist; [`Topic::new`] rejects the rest.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{PartitionId, PlanId, StageId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicDomain {
    Job,
    Link,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicSubject {
    Plan,
    Stage,
    Partition,
    Channel,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicVerb {
    Submitted,
    Certifying,
    Certified,
    Rejected,
    Running,
    Started,
    Completed,
    Failed,
    TimedOut,
    Cancelled,
    Degraded,
    Down,
    Recovered,
}

impl TopicDomain {
    pub fn as_str(&self) -> &'static str {
        match self {
            TopicDomain::Job => "job",
            TopicDomain::Link => "link",
        }
    }
}

impl TopicSubject {
    pub fn as_str(&self) -> &'static str {
        match self {
            TopicSubject::Plan => "plan",
            TopicSubject::Stage => "stage",
            TopicSubject::Partition => "partition",
            TopicSubject::Channel => "channel",
        }
    }
}

impl TopicVerb {
    pub fn as_str(&self) -> &'static str {
        match self {
            TopicVerb::Submitted => "submitted",
            TopicVerb::Certifying => "certifying",
            TopicVerb::Certified => "certified",
            TopicVerb::Rejected => "rejected",
            TopicVerb::Running => "running",
            TopicVerb::Started => "started",
            TopicVerb::Completed => "completed",
            TopicVerb::Failed => "failed",
            TopicVerb::TimedOut => "timed_out",
            TopicVerb::Cancelled => "cancelled",
            TopicVerb::Degraded => "degraded",
            TopicVerb::Down => "down",
            TopicVerb::Recovered => "recovered",
        }
    }
}

/// Rejected `(domain, subject, verb)` combination
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid topic: {0}")]
pub struct InvalidTopic(pub String);

/// A validated event topic
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Topic {
    domain: TopicDomain,
    subject: TopicSubject,
    verb: TopicVerb,
}

const fn topic(domain: TopicDomain, subject: TopicSubject, verb: TopicVerb) -> Topic {
    Topic {
        domain,
        subject,
        verb,
    }
}

impl Topic {
    pub const PLAN_SUBMITTED: Topic = topic(TopicDomain::Job, TopicSubject::Plan, TopicVerb::Submitted);
    pub const PLAN_CERTIFYING: Topic = topic(TopicDomain::Job, TopicSubject::Plan, TopicVerb::Certifying);
    pub const PLAN_CERTIFIED: Topic = topic(TopicDomain::Job, TopicSubject::Plan, TopicVerb::Certified);
    pub const PLAN_REJECTED: Topic = topic(TopicDomain::Job, TopicSubject::Plan, TopicVerb::Rejected);
    pub const PLAN_RUNNING: Topic = topic(TopicDomain::Job, TopicSubject::Plan, TopicVerb::Running);
    pub const PLAN_COMPLETED: Topic = topic(TopicDomain::Job, TopicSubject::Plan, TopicVerb::Completed);
    pub const PLAN_FAILED: Topic = topic(TopicDomain::Job, TopicSubject::Plan, TopicVerb::Failed);
    pub const PLAN_CANCELLED: Topic = topic(TopicDomain::Job, TopicSubject::Plan, TopicVerb::Cancelled);

    pub const STAGE_STARTED: Topic = topic(TopicDomain::Job, TopicSubject::Stage, TopicVerb::Started);
    pub const STAGE_COMPLETED: Topic = topic(TopicDomain::Job, TopicSubject::Stage, TopicVerb::Completed);
    pub const STAGE_FAILED: Topic = topic(TopicDomain::Job, TopicSubject::Stage, TopicVerb::Failed);
    pub const STAGE_TIMED_OUT: Topic = topic(TopicDomain::Job, TopicSubject::Stage, TopicVerb::TimedOut);
    pub const STAGE_CANCELLED: Topic = topic(TopicDomain::Job, TopicSubject::Stage, TopicVerb::Cancelled);

    pub const PARTITION_COMPLETED: Topic =
        topic(TopicDomain::Job, TopicSubject::Partition, TopicVerb::Completed);
    pub const PARTITION_FAILED: Topic = topic(TopicDomain::Job, TopicSubject::Partition, TopicVerb::Failed);

    pub const CHANNEL_DEGRADED: Topic = topic(TopicDomain::Link, TopicSubject::Channel, TopicVerb::Degraded);
    pub const CHANNEL_DOWN: Topic = topic(TopicDomain::Link, TopicSubject::Channel, TopicVerb::Down);
    pub const CHANNEL_RECOVERED: Topic = topic(TopicDomain::Link, TopicSubject::Channel, TopicVerb::Recovered);

    /// Every valid topic
    pub const ALL: [Topic; 18] = [
        Self::PLAN_SUBMITTED,
        Self::PLAN_CERTIFYING,
        Self::PLAN_CERTIFIED,
        Self::PLAN_REJECTED,
        Self::PLAN_RUNNING,
        Self::PLAN_COMPLETED,
        Self::PLAN_FAILED,
        Self::PLAN_CANCELLED,
        Self::STAGE_STARTED,
        Self::STAGE_COMPLETED,
        Self::STAGE_FAILED,
        Self::STAGE_TIMED_OUT,
        Self::STAGE_CANCELLED,
        Self::PARTITION_COMPLETED,
        Self::PARTITION_FAILED,
        Self::CHANNEL_DEGRADED,
        Self::CHANNEL_DOWN,
        Self::CHANNEL_RECOVERED,
    ];

    pub fn new(domain: TopicDomain, subject: TopicSubject, verb: TopicVerb) -> Result<Self, InvalidTopic> {
        let candidate = topic(domain, subject, verb);
        if Self::ALL.contains(&candidate) {
            Ok(candidate)
        } else {
            Err(InvalidTopic(candidate.name()))
        }
    }

    pub fn domain(&self) -> TopicDomain {
        self.domain
    }

    pub fn subject(&self) -> TopicSubject {
        self.subject
    }

    pub fn verb(&self) -> TopicVerb {
        self.verb
    }

    pub fn name(&self) -> String {
        format!(
            "{}.{}.{}",
            self.domain.as_str(),
            self.subject.as_str(),
            self.verb.as_str()
        )
    }

    pub fn parse(name: &str) -> Result<Self, InvalidTopic> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.name() == name)
            .ok_or_else(|| InvalidTopic(name.to_string()))
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl TryFrom<String> for Topic {
    type Error = InvalidTopic;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Topic::parse(&value)
    }
}

impl From<Topic> for String {
    fn from(topic: Topic) -> Self {
        topic.name()
    }
}

/// Body of a lifecycle event
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    pub plan_id: PlanId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_id: Option<StageId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_id: Option<PartitionId>,
    pub status: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub detail: Value,
}

/// A typed event published on a lifecycle transition
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub id: String,
    pub topic: Topic,
    pub payload: EventPayload,
}

impl LifecycleEvent {
    pub fn new(topic: Topic, plan_id: PlanId, status: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            topic,
            payload: EventPayload {
                plan_id,
                stage_id: None,
                partition_id: None,
                status: status.into(),
                timestamp: Utc::now(),
                detail: Value::Null,
            },
        }
    }

    pub fn with_stage(mut self, stage_id: StageId) -> Self {
        self.payload.stage_id = Some(stage_id);
        self
    }

    pub fn with_partition(mut self, partition_id: PartitionId) -> Self {
        self.payload.partition_id = Some(partition_id);
        self
    }

    pub fn with_detail(mut self, detail: Value) -> Self {
        self.payload.detail = detail;
        self
    }

    pub fn plan_id(&self) -> &PlanId {
        &self.payload.plan_id
    }
}
