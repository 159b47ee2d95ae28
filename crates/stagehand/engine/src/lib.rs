//! Stagehand Orchestrator
//!
//! Drives a plan through its lifecycle:
//!
//! ```text
//! submit ─▶ validate ─▶ certify ─▶ dispatch ─▶ aggregate
//!              │            │          │
//!              ▼            ▼          ▼
//!       ValidationError  Rejected   Completed | Failed | Cancelled
//! ```
//!
//! Validation fails fast with every violation found and leaves no trace.
//! Certification goes through the [`SafetyGate`](stagehand_gate::SafetyGate)
//! and its record is persisted whatever the verdict. Only certified plans
//! are dispatched: stages run in order, each stage's partitions run
//! concurrently on a bounded worker pool, and a stage's results are
//! aggregated in partition-id order, never completion order.
//!
//! Every lifecycle transition publishes a [`LifecycleEvent`] on the
//! configured [`EventBus`].
//!
//! [`LifecycleEvent`]: stagehand_types::LifecycleEvent

#![deny(unsafe_code)]

pub mod aggregate;
mod bus;
mod config;
mod error;
mod orchestrator;
mod record;
mod runner;
mod store;

pub use bus::*;
pub use config::*;
pub use error::*;
pub use orchestrator::{Orchestrator, OrchestratorBuilder};
pub use record::*;
pub use store::*;
