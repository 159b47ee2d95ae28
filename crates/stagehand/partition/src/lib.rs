//! Partitioners
//!
//! A partitioner turns one stage's `inputs` into an ordered list of
//! [`PartitionDescriptor`]s. Partitioning is a pure function of the
//! stage: identical inputs always give identical partitions, with
//! identical content ids.
//!
//! Stage inputs carry the work items under `items`. A `null` payload or
//! an empty `items` array partitions to nothing.
//!
//! [`PartitionDescriptor`]: stagehand_types::PartitionDescriptor

#![deny(unsafe_code)]

mod error;
mod key_range;
mod set;
mod size_bounded;
mod traits;

pub use error::*;
pub use key_range::*;
pub use set::*;
pub use size_bounded::*;
pub use traits::*;
