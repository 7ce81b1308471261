//! External-distribution resolution cache.
//!
//! Maps an imported top-level package name to the installed distribution
//! providing it. The lookup itself is an external collaborator behind
//! [`DistResolver`]; this cache memoizes it because the same reference is
//! consulted once per distinct import across potentially many specs.

use std::collections::HashMap;

/// An installed distribution backing an external import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistInfo {
    pub name: String,
    pub version: String,
}

/// The external lookup contract. Implementations may consult installed
/// package metadata; failures are expressed as `None`, never as errors.
pub trait DistResolver {
    fn resolve(&self, import_name: &str) -> Option<DistInfo>;
}

/// A resolver that knows nothing; every lookup is `None`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDistResolver;

impl DistResolver for NullDistResolver {
    fn resolve(&self, _import_name: &str) -> Option<DistInfo> {
        None
    }
}

/// Memoizing wrapper around a [`DistResolver`]. Negative results are
/// cached too: an import that resolves to nothing stays nothing for the
/// rest of the build.
pub struct DistCache {
    resolver: Box<dyn DistResolver + Send + Sync>,
    memo: HashMap<String, Option<DistInfo>>,
    lookups: u64,
    hits: u64,
}

impl DistCache {
    pub fn new(resolver: Box<dyn DistResolver + Send + Sync>) -> Self {
        Self {
            resolver,
            memo: HashMap::new(),
            lookups: 0,
            hits: 0,
        }
    }

    pub fn resolve(&mut self, import_name: &str) -> Option<DistInfo> {
        self.lookups += 1;
        if let Some(cached) = self.memo.get(import_name) {
            self.hits += 1;
            return cached.clone();
        }
        let result = self.resolver.resolve(import_name);
        self.memo.insert(import_name.to_string(), result.clone());
        result
    }

    pub fn lookups(&self) -> u64 {
        self.lookups
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }
}

impl std::fmt::Debug for DistCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistCache")
            .field("entries", &self.memo.len())
            .field("lookups", &self.lookups)
            .field("hits", &self.hits)
            .finish()
    }
}
