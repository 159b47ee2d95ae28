use serde::{Deserialize, Serialize};

/// How many validator approvals certify a plan
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuorumPolicy {
    /// Every registered validator must approve (N-of-N)
    #[default]
    All,
    /// At least this many validators must approve (N-of-M)
    AtLeast(usize),
}

impl QuorumPolicy {
    /// Whether `approvals` out of `total` validators meet the quorum.
    ///
    /// Never met when no validators are registered.
    pub fn is_met(&self, approvals: usize, total: usize) -> bool {
        if total == 0 {
            return false;
        }
        match self {
            QuorumPolicy::All => approvals == total,
            QuorumPolicy::AtLeast(n) => approvals >= (*n).max(1),
        }
    }

    pub fn required(&self, total: usize) -> usize {
        match self {
            QuorumPolicy::All => total,
            QuorumPolicy::AtLeast(n) => (*n).max(1),
        }
    }
}

impl std::fmt::Display for QuorumPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuorumPolicy::All => write!(f, "all"),
            QuorumPolicy::AtLeast(n) => write!(f, "at_least({n})"),
        }
    }
}
