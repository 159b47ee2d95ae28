//! Plan storage
//!
//! Plan records are upserted as the plan advances. Certification records
//! are append-only; storing the same `(plan_id, attempt)` twice fails.

mod file;
mod memory;
mod traits;

pub use file::FilePlanStore;
pub use memory::InMemoryPlanStore;
pub use traits::*;
