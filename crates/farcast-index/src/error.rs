//! Discovery errors. All fatal: the build aborts before any generation.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("source root {0} does not exist or is not a directory")]
    InvalidRoot(PathBuf),

    #[error("target {0:?} does not resolve to any unit under the configured roots")]
    MissingTarget(String),

    #[error("invalid spec declaration in {unit} (line {line}): {message}")]
    Validation {
        unit: String,
        line: usize,
        message: String,
    },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid discovery pattern: {0}")]
    Pattern(#[from] glob::PatternError),
}
