//! Staleness classification.
//!
//! A unit is stale when its computed digest differs from the store, the
//! store has no record, its generated artifact is missing, or a force
//! rebuild is requested. Staleness then expands downstream: a stale
//! dependency makes every transitive dependent stale too.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use farcast_core::TranslationUnit;

use crate::digest::DigestEngine;
use crate::store::FingerprintStore;

/// Classify spec units. `artifact_path` maps a unit to its generated
/// counterpart's location on disk.
pub fn detect_stale_units<'u>(
    units: impl IntoIterator<Item = &'u TranslationUnit>,
    engine: &mut DigestEngine<'_>,
    store: &FingerprintStore,
    artifact_path: impl Fn(&TranslationUnit) -> std::path::PathBuf,
    force: bool,
) -> BTreeSet<String> {
    let mut stale = BTreeSet::new();
    for unit in units {
        if force {
            stale.insert(unit.name.clone());
            continue;
        }
        let reason = stale_reason(unit, engine, store, &artifact_path(unit));
        if let Some(reason) = reason {
            tracing::debug!(unit = %unit.name, reason, "unit is stale");
            stale.insert(unit.name.clone());
        }
    }
    stale
}

fn stale_reason(
    unit: &TranslationUnit,
    engine: &mut DigestEngine<'_>,
    store: &FingerprintStore,
    artifact: &Path,
) -> Option<&'static str> {
    let Some(entry) = store.get(&unit.name) else {
        return Some("no prior record");
    };
    if !artifact.exists() {
        return Some("generated artifact missing");
    }
    if entry.digest != engine.unit_digest(unit) {
        return Some("digest changed");
    }
    None
}

/// Expand a stale set over the unit DAG: every transitive dependent of a
/// stale unit is stale.
pub fn expand_stale(
    dag: &BTreeMap<String, BTreeSet<String>>,
    stale: &BTreeSet<String>,
) -> BTreeSet<String> {
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (unit, deps) in dag {
        for dep in deps {
            dependents.entry(dep.as_str()).or_default().push(unit.as_str());
        }
    }

    let mut expanded: BTreeSet<String> = stale.clone();
    let mut queue: Vec<&str> = stale.iter().map(String::as_str).collect();
    while let Some(unit) = queue.pop() {
        for dependent in dependents.get(unit).into_iter().flatten() {
            if expanded.insert(dependent.to_string()) {
                queue.push(dependent);
            }
        }
    }
    expanded
}
