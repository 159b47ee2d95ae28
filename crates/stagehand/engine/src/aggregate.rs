//! Stage result aggregation
//!
//! Results are ordered by partition id before anything is derived from
//! them, so the merkle root and the merged output never depend on the
//! order in which partitions finished.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use stagehand_types::{ExecutionResult, PartitionId};

/// Ordered results of one stage with their derived summaries
#[derive(Clone, Debug, PartialEq)]
pub struct StageAggregate {
    pub results: Vec<ExecutionResult>,
    pub merkle_root: String,
    pub output: Value,
}

impl StageAggregate {
    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(|r| r.status.is_success())
    }

    pub fn first_failure(&self) -> Option<&ExecutionResult> {
        self.results.iter().find(|r| !r.status.is_success())
    }
}

/// Sort `results` by partition id and derive the merkle root and merged
/// output.
pub fn aggregate(mut results: Vec<ExecutionResult>) -> StageAggregate {
    results.sort_by(|a, b| a.partition_id.cmp(&b.partition_id));
    let merkle_root = merkle_root(&results);
    let output = merge_outputs(&results);
    StageAggregate {
        results,
        merkle_root,
        output,
    }
}

// ── Merkle root ──────────────────────────────────────────────────────

fn leaf_hash(result: &ExecutionResult) -> blake3::Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"stagehand-leaf-v1:");
    hasher.update(result.partition_id.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(result.content_id.as_bytes());
    hasher.update(b"|");
    hasher.update(result.status.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(result.output_digest().as_bytes());
    hasher.finalize()
}

fn node_hash(left: &blake3::Hash, right: &blake3::Hash) -> blake3::Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"stagehand-node-v1:");
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    hasher.finalize()
}

fn empty_root() -> blake3::Hash {
    blake3::hash(b"stagehand-merkle-empty")
}

/// Merkle root over `results` in the order given. An odd node is paired
/// with itself.
pub fn merkle_root(results: &[ExecutionResult]) -> String {
    if results.is_empty() {
        return empty_root().to_hex().to_string();
    }

    let mut level: Vec<blake3::Hash> = results.iter().map(leaf_hash).collect();
    while level.len() > 1 {
        level = next_level(&level);
    }
    level[0].to_hex().to_string()
}

fn next_level(level: &[blake3::Hash]) -> Vec<blake3::Hash> {
    level
        .chunks(2)
        .map(|pair| {
            let left = &pair[0];
            node_hash(left, pair.get(1).unwrap_or(left))
        })
        .collect()
}

// ── Merkle proofs ────────────────────────────────────────────────────

/// Which side of the running hash a sibling sits on
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofSide {
    Left,
    Right,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    pub side: ProofSide,
    pub hash: String,
}

/// Inclusion proof of one partition result under a stage's merkle root
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub partition_id: PartitionId,
    pub leaf_hash: String,
    pub path: Vec<ProofStep>,
    pub root: String,
}

impl MerkleProof {
    /// Whether the path leads from the leaf hash to the root
    pub fn verify(&self) -> bool {
        let Ok(mut current) = blake3::Hash::from_hex(&self.leaf_hash) else {
            return false;
        };
        for step in &self.path {
            let Ok(sibling) = blake3::Hash::from_hex(&step.hash) else {
                return false;
            };
            current = match step.side {
                ProofSide::Left => node_hash(&sibling, &current),
                ProofSide::Right => node_hash(&current, &sibling),
            };
        }
        current.to_hex().as_str() == self.root
    }

    /// Whether `result` is the leaf this proof covers and the proof holds
    pub fn verifies(&self, result: &ExecutionResult) -> bool {
        result.partition_id == self.partition_id
            && leaf_hash(result).to_hex().as_str() == self.leaf_hash
            && self.verify()
    }
}

/// Inclusion proof for `partition_id` over `results`, which must be in
/// the order the root was computed over (sorted by partition id).
pub fn merkle_proof(results: &[ExecutionResult], partition_id: &PartitionId) -> Option<MerkleProof> {
    let mut index = results.iter().position(|r| &r.partition_id == partition_id)?;
    let mut level: Vec<blake3::Hash> = results.iter().map(leaf_hash).collect();
    let leaf = level[index];
    let mut path = Vec::new();

    while level.len() > 1 {
        let (side, sibling) = if index % 2 == 0 {
            (ProofSide::Right, level.get(index + 1).unwrap_or(&level[index]))
        } else {
            (ProofSide::Left, &level[index - 1])
        };
        path.push(ProofStep {
            side,
            hash: sibling.to_hex().to_string(),
        });
        level = next_level(&level);
        index /= 2;
    }

    Some(MerkleProof {
        partition_id: partition_id.clone(),
        leaf_hash: leaf.to_hex().to_string(),
        path,
        root: level[0].to_hex().to_string(),
    })
}

/// Proofs for up to `count` results spread evenly across the stage
pub fn sample_proofs(results: &[ExecutionResult], count: usize) -> Vec<MerkleProof> {
    let total = results.len();
    let count = count.min(total);
    (0..count)
        .map(|i| &results[i * total / count])
        .filter_map(|r| merkle_proof(results, &r.partition_id))
        .collect()
}

// ── Output merge ─────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug)]
enum Total {
    Int(i128),
    Float(f64),
}

impl Total {
    fn of(value: &Value) -> Option<Self> {
        let Value::Number(n) = value else {
            return None;
        };
        if let Some(u) = n.as_u64() {
            Some(Total::Int(u as i128))
        } else if let Some(i) = n.as_i64() {
            Some(Total::Int(i as i128))
        } else {
            n.as_f64().map(Total::Float)
        }
    }

    fn add(self, other: Total) -> Total {
        match (self, other) {
            (Total::Int(a), Total::Int(b)) => Total::Int(a.saturating_add(b)),
            (a, b) => Total::Float(a.as_f64() + b.as_f64()),
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Total::Int(i) => i as f64,
            Total::Float(f) => f,
        }
    }

    fn into_value(self) -> Value {
        match self {
            Total::Int(i) => {
                if let Ok(u) = u64::try_from(i) {
                    Value::from(u)
                } else if let Ok(s) = i64::try_from(i) {
                    Value::from(s)
                } else {
                    Value::from(i as f64)
                }
            }
            Total::Float(f) => Value::from(f),
        }
    }
}

/// Sum every numeric top-level field across the successful outputs.
///
/// Integers stay integers. `partitions` and `succeeded` count the inputs.
pub fn merge_outputs(results: &[ExecutionResult]) -> Value {
    let mut totals: Vec<(String, Total)> = Vec::new();
    let mut succeeded = 0usize;

    for result in results.iter().filter(|r| r.status.is_success()) {
        succeeded += 1;
        let Some(fields) = result.output.as_object() else {
            continue;
        };
        for (key, value) in fields {
            let Some(total) = Total::of(value) else {
                continue;
            };
            match totals.iter_mut().find(|(k, _)| k == key) {
                Some((_, acc)) => *acc = acc.add(total),
                None => totals.push((key.clone(), total)),
            }
        }
    }

    let mut merged = Map::new();
    for (key, total) in totals {
        merged.insert(key, total.into_value());
    }
    merged.insert("partitions".into(), Value::from(results.len()));
    merged.insert("succeeded".into(), Value::from(succeeded));
    Value::Object(merged)
}
