//! Digest-engine errors.

use std::path::PathBuf;
use thiserror::Error;

pub type DigestResult<T> = Result<T, DigestError>;

#[derive(Debug, Error)]
pub enum DigestError {
    #[error("failed to persist fingerprint store at {path}: {source}")]
    StoreWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize fingerprint store: {0}")]
    Serialization(#[from] serde_json::Error),
}
