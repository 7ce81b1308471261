//! Spec decorator recognition and argument parsing.
//!
//! A declaration is a spec when it carries `@farcast.spec(...)` or
//! `@farcast.test(...)` (or the bare `@spec(...)` / `@test(...)` after a
//! direct import). Only keyword arguments are accepted: `deps=[...]`,
//! `prompt="..."`, `infer_deps=True|False`.

use farcast_core::{DepRef, SpecKind};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// One decorator line, structurally split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decorator {
    /// Dotted decorator name, e.g. `farcast.spec` or `staticmethod`.
    pub name: String,
    /// Raw argument text between the outer parentheses, if called.
    pub args: Option<String>,
}

/// The spec-relevant content of a declaration's decorator stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecMarker {
    pub kind: SpecKind,
    pub deps: Vec<DepRef>,
    pub prompt: Option<String>,
    pub infer_deps: Option<bool>,
}

fn decorator_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^@\s*([A-Za-z_][\w.]*)\s*(?:\((?s)(.*)\))?\s*$").unwrap()
    })
}

/// Split a logical `@...` line into name and argument text.
pub fn parse_decorator(logical_line: &str) -> Option<Decorator> {
    let caps = decorator_regex().captures(logical_line.trim())?;
    Some(Decorator {
        name: caps[1].to_string(),
        args: caps.get(2).map(|m| m.as_str().trim().to_string()),
    })
}

/// Decide whether a decorator stack marks a spec, and parse its arguments.
///
/// Returns the marker (if any) and human-readable argument problems; a
/// problem makes the declaration malformed, which discovery treats as
/// fatal.
pub fn spec_marker(decorators: &[Decorator]) -> (Option<SpecMarker>, Vec<String>) {
    for dec in decorators {
        let kind = match dec.name.rsplit('.').next() {
            Some("spec") => SpecKind::Implementation,
            Some("test") => SpecKind::Test,
            _ => continue,
        };
        let mut problems = Vec::new();
        let marker = parse_marker_args(kind, dec.args.as_deref().unwrap_or(""), &mut problems);
        return (Some(marker), problems);
    }
    (None, Vec::new())
}

fn parse_marker_args(kind: SpecKind, args: &str, problems: &mut Vec<String>) -> SpecMarker {
    let mut marker = SpecMarker {
        kind,
        deps: Vec::new(),
        prompt: None,
        infer_deps: None,
    };
    for part in split_top_level(args, ',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let Some((key, value)) = part.split_once('=') else {
            problems.push(format!(
                "positional decorator argument {part:?}; only deps=, prompt=, infer_deps= are accepted"
            ));
            continue;
        };
        let (key, value) = (key.trim(), value.trim());
        match key {
            "deps" => match parse_deps_list(value) {
                Some(deps) => marker.deps = deps,
                None => problems.push(format!("deps must be a list, got {value:?}")),
            },
            "prompt" => match unquote(value) {
                Some(text) => marker.prompt = Some(text),
                None => problems.push(format!("prompt must be a string literal, got {value:?}")),
            },
            "infer_deps" => match value {
                "True" => marker.infer_deps = Some(true),
                "False" => marker.infer_deps = Some(false),
                _ => problems.push(format!("infer_deps must be True or False, got {value:?}")),
            },
            other => problems.push(format!("unknown decorator argument {other:?}")),
        }
    }
    marker
}

fn parse_deps_list(value: &str) -> Option<Vec<DepRef>> {
    let inner = value.strip_prefix('[')?.strip_suffix(']')?;
    let mut deps = Vec::new();
    for item in split_top_level(inner, ',') {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        match unquote(item) {
            Some(text) => deps.push(DepRef::Dotted(text)),
            None => deps.push(DepRef::Direct(item.to_string())),
        }
    }
    Some(deps)
}

/// Strip a matching pair of quotes (single, double, or triple) from a
/// literal. Returns `None` when the value is not a plain string literal.
fn unquote(value: &str) -> Option<String> {
    for delim in ["\"\"\"", "'''", "\"", "'"] {
        if value.len() >= delim.len() * 2
            && value.starts_with(delim)
            && value.ends_with(delim)
        {
            return Some(value[delim.len()..value.len() - delim.len()].to_string());
        }
    }
    None
}

/// Split on a separator at bracket depth zero, outside string literals.
pub fn split_top_level(text: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            current.push(c);
            if c == '\\' {
                if let Some(&next) = chars.peek() {
                    current.push(next);
                    chars.next();
                }
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => {
                quote = Some(c);
                current.push(c);
            }
            '(' | '[' | '{' => {
                depth += 1;
                current.push(c);
            }
            ')' | ']' | '}' => {
                depth -= 1;
                current.push(c);
            }
            c if c == sep && depth == 0 => {
                parts.push(std::mem::take(&mut current));
            }
            c => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current);
    }
    parts
}
