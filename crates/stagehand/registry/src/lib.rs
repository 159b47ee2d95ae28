//! Job Kind Registry
//!
//! Static contract store for job kinds. A kind names the partitioners and
//! executors its stages may bind to; those names must come from the
//! [`ImplementationCatalog`], so a kind referring to an implementation
//! that does not exist is refused at registration time.
//!
//! Reads are concurrent. Registration is serialized behind a single
//! writer lock.

#![deny(unsafe_code)]

mod builtin;
mod catalog;
mod error;
mod registry;

pub use builtin::*;
pub use catalog::*;
pub use error::*;
pub use registry::*;
