//! The configuration boundary consumed by the core.
//!
//! Values here are opaque inputs supplied by an external configuration
//! loader; the core never reads argv or config files itself.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::spec_ref::RefParseError;

/// Restriction of a build to one unit or one spec within it.
///
/// Parsed from `module[:qualname]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSelector {
    pub unit: String,
    pub qualname: Option<String>,
}

impl FromStr for TargetSelector {
    type Err = RefParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(RefParseError::EmptyComponent(s.to_string()));
        }
        match s.split_once(':') {
            Some((unit, qualname)) => {
                let unit = unit.trim();
                let qualname = qualname.trim();
                if unit.is_empty() || qualname.is_empty() {
                    return Err(RefParseError::EmptyComponent(s.to_string()));
                }
                Ok(Self {
                    unit: unit.to_string(),
                    qualname: Some(qualname.to_string()),
                })
            }
            None => Ok(Self {
                unit: s.to_string(),
                qualname: None,
            }),
        }
    }
}

/// All inputs the build core consumes.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Roots under which implementation units are discovered.
    pub source_roots: Vec<PathBuf>,
    /// Roots under which test units are discovered.
    pub test_roots: Vec<PathBuf>,
    /// Name of the generated directory, e.g. `__generated__`.
    pub generated_dir: String,
    /// Maximum number of units generating concurrently.
    pub max_concurrency: usize,
    /// Regenerate everything regardless of staleness.
    pub force: bool,
    /// Restrict the build to these targets (empty = whole tree).
    pub targets: Vec<TargetSelector>,
    /// Global dependency-inference switch.
    pub infer_deps: bool,
    /// Backend attempts per unit before it is marked failed.
    pub retry_attempts: u32,
    /// Base delay for exponential retry backoff.
    pub retry_base_delay: Duration,
    /// Directory for farcast's own state (fingerprints, caches).
    pub state_dir: PathBuf,
    /// Whether the backend-response cache is consulted.
    pub response_cache: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            source_roots: vec![PathBuf::from("src")],
            test_roots: vec![PathBuf::from("tests")],
            generated_dir: crate::paths::DEFAULT_GENERATED_DIR.to_string(),
            max_concurrency: 4,
            force: false,
            targets: Vec::new(),
            infer_deps: true,
            retry_attempts: 2,
            retry_base_delay: Duration::from_millis(500),
            state_dir: PathBuf::from(".farcast"),
            response_cache: true,
        }
    }
}

impl BuildConfig {
    /// All roots, implementation first, in configured order.
    pub fn all_roots(&self) -> impl Iterator<Item = &PathBuf> {
        self.source_roots.iter().chain(self.test_roots.iter())
    }
}
