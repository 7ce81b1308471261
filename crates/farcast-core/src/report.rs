//! The per-run build report: the reporting boundary exposed by the core.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Terminal classification of one translation unit in one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum UnitOutcome {
    Generated,
    Skipped,
    Failed { detail: String },
}

/// Aggregate result of one build invocation. Produced fresh every run;
/// never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildReport {
    pub generated: BTreeSet<String>,
    pub skipped: BTreeSet<String>,
    /// Failed units with their last error detail.
    pub failed: BTreeMap<String, String>,
}

impl BuildReport {
    pub fn record_generated(&mut self, unit: impl Into<String>) {
        self.generated.insert(unit.into());
    }

    pub fn record_skipped(&mut self, unit: impl Into<String>) {
        self.skipped.insert(unit.into());
    }

    pub fn record_failed(&mut self, unit: impl Into<String>, detail: impl Into<String>) {
        self.failed.insert(unit.into(), detail.into());
    }

    pub fn outcome_for(&self, unit: &str) -> Option<UnitOutcome> {
        if self.generated.contains(unit) {
            Some(UnitOutcome::Generated)
        } else if self.skipped.contains(unit) {
            Some(UnitOutcome::Skipped)
        } else {
            self.failed.get(unit).map(|detail| UnitOutcome::Failed {
                detail: detail.clone(),
            })
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// `(generated, skipped, failed)` counts.
    pub fn counts(&self) -> (usize, usize, usize) {
        (self.generated.len(), self.skipped.len(), self.failed.len())
    }
}
