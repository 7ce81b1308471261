//! Dependency analysis for farcast.
//!
//! Builds the spec dependency graph from explicit declarations plus
//! best-effort inferred references, validates acyclicity, and produces the
//! deterministic order the scheduler walks.

pub mod cycles;
pub mod dist;
pub mod error;
pub mod graph;
pub mod order;
pub mod resolve;

pub use cycles::*;
pub use dist::*;
pub use error::*;
pub use graph::*;
pub use order::*;
pub use resolve::*;
