//! Generated-artifact headers.
//!
//! Every generated file starts with a comment header naming the tool
//! version, the spec unit it came from, its digest, and the specs it
//! implements, so humans and tools can tell generated output apart.

use regex::Regex;
use std::sync::OnceLock;

/// Render the header for a generated unit.
pub fn format_header(
    tool_version: &str,
    source_unit: &str,
    unit_digest: &str,
    spec_refs: &[String],
) -> String {
    let mut header = String::new();
    header.push_str(&format!(
        "# Generated by farcast {tool_version} -- do not edit.\n"
    ));
    header.push_str(&format!("# source-unit: {source_unit}\n"));
    header.push_str(&format!("# digest: sha256:{unit_digest}\n"));
    header.push_str(&format!("# specs: {}\n", spec_refs.join(", ")));
    header
}

fn digest_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^# digest: sha256:([0-9a-f]{64})\s*$").unwrap())
}

/// Read the digest back out of a generated file, if present.
pub fn extract_unit_digest(source: &str) -> Option<String> {
    digest_regex()
        .captures(source)
        .map(|caps| caps[1].to_string())
}
