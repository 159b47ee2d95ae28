//! Stagehand Domain Types
//!
//! Stagehand orchestrates **plans**: ordered lists of job-kind-typed
//! stages. Each stage is split into independent partitions by a
//! partitioner, the partitions are run by an executor, and no plan is
//! dispatched until a quorum of validators has certified it.
//!
//! # Key Concepts
//!
//! - **JobKind**: The registered contract for a category of work. Names
//!   the partitioners and executors a stage may bind to, and the safety
//!   policy (non-idempotent operations, mandatory dry runs).
//! - **Plan / Stage**: A submitted unit of work and its ordered steps.
//! - **PartitionDescriptor**: An independently executable slice of a
//!   stage's input, content-addressed for replay.
//! - **ExecutionResult**: The classified outcome of running a partition.
//! - **Certification**: An append-only record of one certification
//!   attempt, with a verdict per validator.
//! - **LinkChannel**: An external dependency with a declared fallback.
//! - **LifecycleEvent**: A typed bus event; topics form a closed set.
//!
//! # Design Principles
//!
//! 1. Certification strictly precedes dispatch.
//! 2. Partitioning is deterministic; aggregation is ordered by
//!    partition id, never by completion order.
//! 3. Every externally visible error carries a stable reason code.

#![deny(unsafe_code)]

mod certification;
mod channel;
mod errors;
mod event;
mod ids;
mod job_kind;
mod partition;
mod plan;
mod schema;

pub use certification::*;
pub use channel::*;
pub use errors::*;
pub use event::*;
pub use ids::*;
pub use job_kind::*;
pub use partition::*;
pub use plan::*;
pub use schema::*;

/// Hex-encoded BLAKE3 digest of the canonical JSON form of `value`.
///
/// `serde_json` maps are ordered, so equal values always serialize to the
/// same bytes.
pub fn canonical_digest(domain: &str, value: &serde_json::Value) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(domain.as_bytes());
    hasher.update(b":");
    hasher.update(value.to_string().as_bytes());
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_digest_ignores_key_insertion_order() {
        let a = json!({"b": 1, "a": [1, 2, 3]});
        let mut map = serde_json::Map::new();
        map.insert("a".into(), json!([1, 2, 3]));
        map.insert("b".into(), json!(1));
        let b = serde_json::Value::Object(map);

        assert_eq!(canonical_digest("test", &a), canonical_digest("test", &b));
    }

    #[test]
    fn canonical_digest_is_domain_separated() {
        let v = json!({"x": 1});
        assert_ne!(canonical_digest("plan", &v), canonical_digest("partition", &v));
    }
}
