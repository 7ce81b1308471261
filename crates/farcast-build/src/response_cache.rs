//! Backend-response cache.
//!
//! Caches raw backend responses on disk keyed by a SHA-256 hash of the
//! full generation request (plus provider and model), so identical
//! requests across runs skip the backend call entirely. Entries live as
//! JSON files under a sharded directory with an in-process memo in front.
//! Explicitly clearable; corrupt entries are misses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use farcast_core::hash::FieldHasher;

use crate::backend::GenerateRequest;

/// A single cached backend response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub source: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub model: String,
    pub provider: String,
    pub cached_at: DateTime<Utc>,
}

/// Deterministic cache key over the full request. Error context is
/// excluded: retry annotations must not fragment the cache.
pub fn cache_key(request: &GenerateRequest, provider: &str, model: &str) -> String {
    let mut hasher = FieldHasher::new();
    hasher
        .field(provider)
        .field(model)
        .field(format!("{:?}", request.kind))
        .field(&request.unit)
        .field(&request.generated_unit)
        .field(request.expected_names.join("\n"));
    for (key, value) in &request.spec_sources {
        hasher.field(key).field(value);
    }
    for (key, value) in &request.extra_directives {
        hasher.field(key).field(value);
    }
    for (key, value) in &request.dependency_apis {
        hasher.field(key).field(value);
    }
    for (key, value) in &request.dependency_sources {
        hasher.field(key).field(value);
    }
    hasher.finish()
}

/// File-backed response cache with an in-process memo.
#[derive(Debug)]
pub struct ResponseCache {
    cache_dir: PathBuf,
    memo: HashMap<String, CacheEntry>,
    hits: u64,
    misses: u64,
}

impl ResponseCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            memo: HashMap::new(),
            hits: 0,
            misses: 0,
        }
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(&key[..2]).join(format!("{key}.json"))
    }

    pub fn get(&mut self, key: &str) -> Option<CacheEntry> {
        if let Some(entry) = self.memo.get(key) {
            self.hits += 1;
            return Some(entry.clone());
        }
        let path = self.entry_path(key);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(_) => {
                self.misses += 1;
                return None;
            }
        };
        match serde_json::from_str::<CacheEntry>(&raw) {
            Ok(entry) => {
                self.memo.insert(key.to_string(), entry.clone());
                self.hits += 1;
                Some(entry)
            }
            Err(err) => {
                tracing::debug!("response cache read failed for key {}: {err}", &key[..12]);
                self.misses += 1;
                None
            }
        }
    }

    /// Store an entry. Failures are logged and swallowed: the cache is an
    /// optimization.
    pub fn put(&mut self, key: &str, entry: CacheEntry) {
        self.memo.insert(key.to_string(), entry.clone());
        let path = self.entry_path(key);
        let result = (|| -> std::io::Result<()> {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let raw = serde_json::to_string(&entry)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            fs::write(&path, raw)
        })();
        if let Err(err) = result {
            tracing::debug!("response cache write failed for key {}: {err}", &key[..12]);
        }
    }

    /// Remove every entry. Returns the number removed.
    pub fn clear_all(&mut self) -> usize {
        self.memo.clear();
        if !self.cache_dir.exists() {
            return 0;
        }
        let mut count = 0;
        if let Ok(shards) = fs::read_dir(&self.cache_dir) {
            for shard in shards.flatten() {
                if let Ok(files) = fs::read_dir(shard.path()) {
                    count += files.flatten().count();
                }
            }
        }
        let _ = fs::remove_dir_all(&self.cache_dir);
        count
    }
}
