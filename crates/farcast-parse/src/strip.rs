//! String/comment stripping and reference-token extraction.

use regex::Regex;
use std::sync::OnceLock;

/// Python keywords plus a handful of constants that can never name a spec.
const KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class", "continue",
    "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if", "import",
    "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try", "while",
    "with", "yield",
];

/// Replace string-literal contents and comments with spaces, preserving
/// layout so that downstream token positions stay meaningful.
///
/// Handles single/double quotes, triple quotes, and backslash escapes.
/// Deliberately coarse: a pathological literal degrades the token stream,
/// never the scan itself.
pub fn strip_strings_and_comments(source: &str) -> String {
    let bytes: Vec<char> = source.chars().collect();
    let mut out = String::with_capacity(source.len());
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        // Comment: blank out to end of line.
        if c == '#' {
            while i < bytes.len() && bytes[i] != '\n' {
                out.push(' ');
                i += 1;
            }
            continue;
        }
        if c == '"' || c == '\'' {
            let quote = c;
            let triple = i + 2 < bytes.len() && bytes[i + 1] == quote && bytes[i + 2] == quote;
            let delim_len = if triple { 3 } else { 1 };
            for _ in 0..delim_len {
                out.push(' ');
            }
            i += delim_len;
            loop {
                if i >= bytes.len() {
                    break;
                }
                if bytes[i] == '\\' && i + 1 < bytes.len() {
                    out.push(' ');
                    out.push(if bytes[i + 1] == '\n' { '\n' } else { ' ' });
                    i += 2;
                    continue;
                }
                let closed = if triple {
                    bytes[i] == quote
                        && i + 2 < bytes.len()
                        && bytes[i + 1] == quote
                        && bytes[i + 2] == quote
                } else {
                    bytes[i] == quote || bytes[i] == '\n'
                };
                if closed {
                    let end_len = if triple { 3 } else { 1 };
                    for _ in 0..end_len {
                        if i < bytes.len() {
                            out.push(if bytes[i] == '\n' { '\n' } else { ' ' });
                            i += 1;
                        }
                    }
                    break;
                }
                out.push(if bytes[i] == '\n' { '\n' } else { ' ' });
                i += 1;
            }
            continue;
        }
        out.push(c);
        i += 1;
    }
    out
}

fn chain_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[A-Za-z_][A-Za-z0-9_]*(?:\s*\.\s*[A-Za-z_][A-Za-z0-9_]*)*").unwrap()
    })
}

/// Extract identifier and attribute-chain tokens from a body span.
///
/// Strings and comments are stripped first; keywords are dropped; order is
/// preserved and duplicates removed. `a . b` normalizes to `a.b`.
pub fn reference_chains(body: &str) -> Vec<String> {
    let stripped = strip_strings_and_comments(body);
    let mut seen = Vec::new();
    for m in chain_regex().find_iter(&stripped) {
        let chain: String = m.as_str().chars().filter(|c| !c.is_whitespace()).collect();
        let head = chain.split('.').next().unwrap_or("");
        if KEYWORDS.contains(&head) {
            continue;
        }
        if !seen.contains(&chain) {
            seen.push(chain);
        }
    }
    seen
}
