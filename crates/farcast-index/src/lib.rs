//! Source discovery for farcast.
//!
//! The indexer turns configured source roots (optionally scoped to
//! explicit build targets) into the full set of translation units a build
//! needs, validating spec declarations as it goes.

pub mod error;
pub mod indexer;

pub use error::*;
pub use indexer::*;
