//! Build errors.
//!
//! Fatal-class errors (discovery, graph, digest-store) stop the whole run
//! before any side effect; per-unit generation failures never appear here,
//! they live in the build report.

use thiserror::Error;

pub type BuildResult<T> = Result<T, BuildError>;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Discovery(#[from] farcast_index::IndexError),

    #[error(transparent)]
    Graph(#[from] farcast_graph::GraphError),

    #[error(transparent)]
    Digest(#[from] farcast_digest::DigestError),
}
