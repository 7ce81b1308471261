//! Core data model for farcast.
//!
//! This crate defines the types shared by every stage of the build pipeline:
//! spec references, spec declarations, translation units, the configuration
//! boundary, and the per-run build report.

pub mod config;
pub mod hash;
pub mod paths;
pub mod report;
pub mod spec;
pub mod spec_ref;

pub use config::*;
pub use report::*;
pub use spec::*;
pub use spec_ref::*;
