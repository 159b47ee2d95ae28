//! Partition Executors
//!
//! An [`Executor`] runs one partition and either returns an output
//! payload or a classified [`ExecutionError`]. [`run_with_retry`] wraps an
//! executor with the retry policy: retryable failures are re-attempted
//! with exponential backoff, fatal ones end the partition at once.
//!
//! Cancellation is cooperative. Every call receives an
//! [`ExecutionContext`] carrying a [`CancellationToken`], which executors
//! poll at safe checkpoints.

#![deny(unsafe_code)]

mod builtin;
mod context;
mod error;
mod retry;
mod set;
mod traits;

pub use builtin::*;
pub use context::*;
pub use error::*;
pub use retry::*;
pub use set::*;
pub use traits::*;
