//! Link/Channel Health Monitor
//!
//! Tracks the liveness of external collaborator channels from heartbeats
//! and resolves each unhealthy channel to the fallback it declared. A
//! channel declared `CriticalNoFallback` escalates instead, which is fatal
//! for any plan depending on it.

#![deny(unsafe_code)]

mod config;
mod error;
mod monitor;
mod source;

pub use config::*;
pub use error::*;
pub use monitor::*;
pub use source::*;
