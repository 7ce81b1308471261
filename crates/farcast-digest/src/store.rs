//! The persisted fingerprint store.
//!
//! One JSON file mapping unit name to its last-successful-build digest.
//! Created on first successful build, updated on every successful
//! regeneration, never mutated on failure. A corrupt or unreadable file is
//! treated as an empty store, not a fatal error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{DigestError, DigestResult};

/// One unit's last-successful-build record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintEntry {
    pub digest: String,
    pub last_success: DateTime<Utc>,
    pub tool_version: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    units: BTreeMap<String, FingerprintEntry>,
}

/// Durable key-value store of unit fingerprints. Point lookup, atomic
/// upsert, full clear.
#[derive(Debug)]
pub struct FingerprintStore {
    path: PathBuf,
    units: BTreeMap<String, FingerprintEntry>,
    writes: u64,
}

impl FingerprintStore {
    /// Load the store, or start empty when the file is missing or corrupt.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let units = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<StoreFile>(&raw) {
                Ok(file) => file.units,
                Err(err) => {
                    tracing::warn!(
                        "fingerprint store at {} is unreadable ({err}); starting empty",
                        path.display()
                    );
                    BTreeMap::new()
                }
            },
            Err(_) => BTreeMap::new(),
        };
        Self {
            path,
            units,
            writes: 0,
        }
    }

    pub fn get(&self, unit: &str) -> Option<&FingerprintEntry> {
        self.units.get(unit)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Writes performed since load; the idempotence property checks this
    /// stays zero on a no-op run.
    pub fn writes(&self) -> u64 {
        self.writes
    }

    /// Record a successful build and persist atomically. Callers must only
    /// invoke this after the generated artifact is durably on disk, so a
    /// crash between the two can never record a false "fresh".
    pub fn upsert(
        &mut self,
        unit: &str,
        digest: impl Into<String>,
        tool_version: impl Into<String>,
    ) -> DigestResult<()> {
        self.units.insert(
            unit.to_string(),
            FingerprintEntry {
                digest: digest.into(),
                last_success: Utc::now(),
                tool_version: tool_version.into(),
            },
        );
        self.persist()?;
        self.writes += 1;
        Ok(())
    }

    /// Drop every entry and remove the backing file.
    pub fn clear(&mut self) -> DigestResult<()> {
        self.units.clear();
        if self.path.exists() {
            fs::remove_file(&self.path).map_err(|source| DigestError::StoreWrite {
                path: self.path.clone(),
                source,
            })?;
        }
        Ok(())
    }

    fn persist(&self) -> DigestResult<()> {
        let raw = serde_json::to_string_pretty(&StoreFile {
            units: self.units.clone(),
        })?;
        write_atomic(&self.path, raw.as_bytes()).map_err(|source| DigestError::StoreWrite {
            path: self.path.clone(),
            source,
        })
    }
}

/// Write via a temp file in the same directory, then rename, so readers
/// never observe a partial store.
fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    use std::io::Write;

    let parent = path.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(parent)?;
    let temp = parent.join(format!(
        ".{}.tmp",
        path.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("fingerprints")
    ));
    {
        let mut file = fs::File::create(&temp)?;
        file.write_all(contents)?;
        file.sync_all()?;
    }
    match fs::rename(&temp, path) {
        Ok(()) => Ok(()),
        Err(err) => {
            let _ = fs::remove_file(&temp);
            Err(err)
        }
    }
}
