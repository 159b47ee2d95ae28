//! Property tests: partitioning is deterministic and covers every item.

use proptest::prelude::*;
use serde_json::{json, Value};
use stagehand_partition::*;
use stagehand_types::Stage;

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

fn arb_file() -> impl Strategy<Value = Value> {
    ("[a-z]{1,8}", 1u64..5_000).prop_map(|(path, size)| json!({"path": path, "size_bytes": size}))
}

fn arb_keyed_item() -> impl Strategy<Value = Value> {
    ("[a-e]{1,2}", 0u32..100).prop_map(|(key, n)| json!({"key": key, "n": n}))
}

fn size_stage(items: Vec<Value>, chunk: u64) -> Stage {
    Stage::new("pack", "deploy.pack", BY_FILESIZE, "pack_backend")
        .with_inputs(json!({"items": items, "chunk_size_bytes": chunk}))
}

fn key_stage(items: Vec<Value>, partitions: u64) -> Stage {
    Stage::new("idx", "deploy.migrate", BY_KEY_RANGE, "sql_migrate")
        .with_inputs(json!({"items": items, "partitions": partitions}))
}

fn item_count(parts: &[stagehand_types::PartitionDescriptor]) -> usize {
    parts
        .iter()
        .map(|p| p.input["items"].as_array().map_or(0, Vec::len))
        .sum()
}

// ---------------------------------------------------------------------------
// Property Tests
// ---------------------------------------------------------------------------

proptest! {
    /// Partitioning the same stage twice gives identical partitions.
    #[test]
    fn size_bounded_is_deterministic(
        items in prop::collection::vec(arb_file(), 0..40),
        chunk in 1_000u64..20_000,
    ) {
        let partitioner = SizeBoundedPartitioner::default();
        let stage = size_stage(items, chunk);
        prop_assert_eq!(partitioner.partition(&stage).unwrap(), partitioner.partition(&stage).unwrap());
    }

    /// Every partition fits the budget unless it holds a single oversized item.
    #[test]
    fn size_bounded_respects_budget(
        items in prop::collection::vec(arb_file(), 1..40),
        chunk in 1_000u64..20_000,
    ) {
        let total = items.len();
        let parts = SizeBoundedPartitioner::default().partition(&size_stage(items, chunk)).unwrap();

        prop_assert_eq!(item_count(&parts), total);
        for p in &parts {
            let bytes = p.input["bytes"].as_u64().unwrap();
            let len = p.input["items"].as_array().unwrap().len();
            prop_assert!(bytes <= chunk || len == 1);
        }
    }

    /// Key-range partitions are independent of input order.
    #[test]
    fn key_range_ignores_input_order(
        items in prop::collection::vec(arb_keyed_item(), 0..40),
        partitions in 1u64..8,
    ) {
        let partitioner = KeyRangePartitioner::default();
        let mut reversed = items.clone();
        reversed.reverse();

        let forward = partitioner.partition(&key_stage(items, partitions)).unwrap();
        let backward = partitioner.partition(&key_stage(reversed, partitions)).unwrap();
        prop_assert_eq!(forward, backward);
    }

    /// Key ranges are ordered, disjoint, and cover every item.
    #[test]
    fn key_ranges_are_disjoint(
        items in prop::collection::vec(arb_keyed_item(), 1..40),
        partitions in 1u64..8,
    ) {
        let total = items.len();
        let parts = KeyRangePartitioner::default().partition(&key_stage(items, partitions)).unwrap();

        prop_assert_eq!(item_count(&parts), total);
        prop_assert!(parts.len() as u64 <= partitions);
        for pair in parts.windows(2) {
            let prev_end = pair[0].input["key_range"]["end"].as_str().unwrap().to_string();
            let next_start = pair[1].input["key_range"]["start"].as_str().unwrap().to_string();
            prop_assert!(prev_end < next_start);
        }
    }
}
