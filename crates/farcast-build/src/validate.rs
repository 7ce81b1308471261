//! Validation of backend responses before they are accepted.

use regex::Regex;

/// Check a generated source candidate. Returns human-readable problems;
/// empty means the candidate is accepted.
///
/// Two classes of check: every expected top-level name must be defined,
/// and the output must not import from its own unit (neither the
/// generated counterpart nor the spec unit that produced it).
pub fn validate_generated_source(
    source: &str,
    expected_names: &[String],
    spec_unit: &str,
    generated_unit: &str,
) -> Vec<String> {
    let mut problems = Vec::new();
    if source.trim().is_empty() {
        problems.push("generated source is empty".to_string());
        return problems;
    }

    for name in expected_names {
        let pattern = format!(r"(?m)^(?:async\s+def|def|class)\s+{}\b", regex::escape(name));
        let defined = Regex::new(&pattern)
            .map(|re| re.is_match(source))
            .unwrap_or(false);
        if !defined {
            problems.push(format!("expected top-level definition {name:?} is missing"));
        }
    }

    for (unit, label) in [
        (generated_unit, "its own generated unit"),
        (spec_unit, "its spec unit"),
    ] {
        let pattern = format!(
            r"(?m)^\s*(?:import\s+{0}\b|from\s+{0}\b)",
            regex::escape(unit)
        );
        let found = Regex::new(&pattern)
            .map(|re| re.is_match(source))
            .unwrap_or(false);
        if found {
            problems.push(format!("generated source must not import {label} ({unit})"));
        }
    }
    problems
}
