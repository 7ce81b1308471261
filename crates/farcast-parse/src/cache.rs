//! On-disk parse cache.
//!
//! Keyed by `(unit path, mtime, size, FORMAT_VERSION)`; stores the
//! structural representation plus the raw source so repeated graph builds
//! skip re-scanning unchanged files. Any key mismatch or unreadable entry
//! is a miss; the entry is then recomputed and overwritten. Eviction of
//! one key never touches unrelated entries.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use farcast_core::hash::sha256_hex;
use farcast_core::UnitStamp;

use crate::scanner::ParsedUnit;

/// Bumped whenever the serialized structural representation changes shape.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct CacheRecord {
    path: String,
    mtime_nanos: u128,
    size: u64,
    format_version: u32,
    source: String,
    unit: ParsedUnit,
}

/// A cached scan: the structural representation and the source it came from.
#[derive(Debug, Clone)]
pub struct CachedScan {
    pub unit: ParsedUnit,
    pub source: String,
}

/// File-backed parse cache with hit/miss counters.
#[derive(Debug)]
pub struct ParseCache {
    dir: PathBuf,
    hits: u64,
    misses: u64,
}

impl ParseCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
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

    fn entry_path(&self, path: &Path) -> PathBuf {
        let key = sha256_hex(path.to_string_lossy().as_bytes());
        self.dir.join(&key[..2]).join(format!("{key}.json"))
    }

    /// Look up a scan by path and stamp. Corrupt or mismatched entries are
    /// misses.
    pub fn get(&mut self, path: &Path, stamp: UnitStamp) -> Option<CachedScan> {
        let entry = self.entry_path(path);
        let raw = match fs::read_to_string(&entry) {
            Ok(raw) => raw,
            Err(_) => {
                self.misses += 1;
                return None;
            }
        };
        let record: CacheRecord = match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(err) => {
                tracing::debug!("parse cache entry unreadable for {}: {err}", path.display());
                self.misses += 1;
                return None;
            }
        };
        if record.format_version != FORMAT_VERSION
            || record.mtime_nanos != stamp.mtime_nanos
            || record.size != stamp.size
        {
            self.misses += 1;
            return None;
        }
        self.hits += 1;
        Some(CachedScan {
            unit: record.unit,
            source: record.source,
        })
    }

    /// Store a scan. Write failures are logged and ignored: the cache is
    /// an optimization, never a correctness dependency.
    pub fn put(&self, path: &Path, stamp: UnitStamp, unit: &ParsedUnit, source: &str) {
        let record = CacheRecord {
            path: path.to_string_lossy().into_owned(),
            mtime_nanos: stamp.mtime_nanos,
            size: stamp.size,
            format_version: FORMAT_VERSION,
            source: source.to_string(),
            unit: unit.clone(),
        };
        let entry = self.entry_path(path);
        let result = (|| -> std::io::Result<()> {
            if let Some(parent) = entry.parent() {
                fs::create_dir_all(parent)?;
            }
            let raw = serde_json::to_string(&record)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            fs::write(&entry, raw)
        })();
        if let Err(err) = result {
            tracing::debug!("parse cache write failed for {}: {err}", path.display());
        }
    }

    /// Drop the entry for one path, leaving the rest of the cache intact.
    pub fn evict(&self, path: &Path) {
        let _ = fs::remove_file(self.entry_path(path));
    }

    /// Remove every entry. Returns the number removed.
    pub fn clear_all(&self) -> usize {
        if !self.dir.exists() {
            return 0;
        }
        let mut count = 0;
        if let Ok(entries) = fs::read_dir(&self.dir) {
            for shard in entries.flatten() {
                if let Ok(files) = fs::read_dir(shard.path()) {
                    count += files.flatten().count();
                }
            }
        }
        let _ = fs::remove_dir_all(&self.dir);
        count
    }
}
