//! Safety Gate (Quorum Authority)
//!
//! No plan is dispatched until the gate certifies it. The gate runs every
//! registered [`Validator`] independently over the plan, counts approvals
//! against the [`QuorumPolicy`], and appends exactly one [`Certification`]
//! per attempt to the [`CertificationLog`].
//!
//! By default certification is unanimous: any single rejection rejects the
//! whole plan.
//!
//! [`Certification`]: stagehand_types::Certification

#![deny(unsafe_code)]

mod error;
mod gate;
mod log;
mod quorum;
mod traits;
pub mod validators;

pub use error::*;
pub use gate::*;
pub use log::*;
pub use quorum::*;
pub use traits::*;
pub use validators::{CorrectnessValidator, SafetyValidator};
