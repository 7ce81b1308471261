//! Line-wise structural scanner for spec source files.
//!
//! Produces the structural representation the resolver and indexer work
//! from: import bindings, declarations (with decorator stacks, docstrings,
//! and body spans), and validation violations. Scanning never fails; at
//! worst an unrecognized construct contributes nothing.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::decorator::{parse_decorator, spec_marker, Decorator, SpecMarker};
use crate::strip::strip_strings_and_comments;

/// What kind of statement declared a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclKind {
    Function,
    AsyncFunction,
    Class,
}

/// One import binding visible at module scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "import", rename_all = "lowercase")]
pub enum ImportBinding {
    /// `import a.b as x` binds `x` to module `a.b`; plain `import a.b`
    /// binds `a` to module `a`.
    Module { binding: String, module: String },
    /// `from m import n as k` binds `k` to name `n` of module `m`.
    /// Relative modules keep their leading dots.
    Name {
        binding: String,
        module: String,
        name: String,
    },
}

impl ImportBinding {
    pub fn binding(&self) -> &str {
        match self {
            ImportBinding::Module { binding, .. } | ImportBinding::Name { binding, .. } => binding,
        }
    }
}

/// One declaration found in a unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Declaration {
    pub name: String,
    /// Dotted for class members: `Board.add`.
    pub qualname: String,
    /// Owning class for a member declaration.
    pub class_name: Option<String>,
    pub kind: DeclKind,
    /// Present when the declaration carries a spec/test decorator.
    pub marker: Option<SpecMarker>,
    pub docstring: String,
    /// Body text (statements below the header), used for reference
    /// inference.
    pub body: String,
    /// Verbatim source span. For a class member this is the entire class
    /// source, decorators included.
    pub span: String,
    /// 1-indexed header line.
    pub line: usize,
}

/// A discovery-time validation problem. The indexer treats these as fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanViolation {
    pub line: usize,
    pub message: String,
}

/// The structural representation of one translation unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedUnit {
    pub unit: String,
    pub imports: Vec<ImportBinding>,
    pub declarations: Vec<Declaration>,
    pub violations: Vec<ScanViolation>,
}

impl ParsedUnit {
    /// Find the import binding for a bare name, if any.
    pub fn binding_for(&self, name: &str) -> Option<&ImportBinding> {
        self.imports.iter().find(|b| b.binding() == name)
    }

    /// Declarations carrying a spec marker, in declaration order.
    pub fn spec_declarations(&self) -> impl Iterator<Item = &Declaration> {
        self.declarations.iter().filter(|d| d.marker.is_some())
    }
}

fn def_header_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(async\s+def|def|class)\s+([A-Za-z_]\w*)").unwrap())
}

fn nested_marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^\s*@\s*(?:[A-Za-z_][\w.]*\.)?(?:spec|test)\s*\(").unwrap()
    })
}

/// The structural scanner. Stateless; one instance can scan many units.
#[derive(Debug, Default)]
pub struct Scanner {
    _priv: (),
}

impl Scanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan one unit's source into its structural representation.
    pub fn scan(&self, unit: &str, source: &str) -> ParsedUnit {
        let lines: Vec<&str> = source.lines().collect();
        let mut out = ParsedUnit {
            unit: unit.to_string(),
            imports: Vec::new(),
            declarations: Vec::new(),
            violations: Vec::new(),
        };

        let mut pending: Vec<Decorator> = Vec::new();
        let mut dec_start: Option<usize> = None;
        let mut i = 0;

        while i < lines.len() {
            let raw = lines[i];
            let trimmed = raw.trim_start();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                i += 1;
                continue;
            }
            if indent_width(raw) > 0 {
                // Stray indented line at module level; nothing to record.
                i += 1;
                continue;
            }
            if let Some(next) = string_statement_end(&lines, i) {
                // Module docstring or other bare string statement; its
                // prose must not confuse bracket-based line joining.
                pending.clear();
                dec_start = None;
                i = next;
                continue;
            }
            if trimmed.starts_with("import ") || trimmed.starts_with("from ") {
                let (logical, next) = join_logical(&lines, i);
                parse_import_line(&logical, &mut out.imports);
                pending.clear();
                dec_start = None;
                i = next;
                continue;
            }
            if trimmed.starts_with('@') {
                let (logical, next) = join_logical(&lines, i);
                if dec_start.is_none() {
                    dec_start = Some(i);
                }
                if let Some(dec) = parse_decorator(&logical) {
                    pending.push(dec);
                }
                i = next;
                continue;
            }
            if let Some((kind, name)) = parse_def_header(trimmed) {
                let (_, header_end) = join_logical(&lines, i);
                let end = block_end(&lines, header_end, 0);
                let span_start = dec_start.unwrap_or(i);
                let span = lines[span_start..end].join("\n");
                let decorators = std::mem::take(&mut pending);
                dec_start = None;

                if kind == DeclKind::Class {
                    self.scan_class(&lines, i, header_end, end, &name, &decorators, &span, &mut out);
                } else {
                    let (marker, problems) = spec_marker(&decorators);
                    for message in problems {
                        out.violations.push(ScanViolation {
                            line: i + 1,
                            message,
                        });
                    }
                    let body = lines[header_end..end].join("\n");
                    if marker.is_some() {
                        check_nested_markers(
                            &body,
                            i + 1,
                            "spec declarations must not be nested inside functions",
                            &mut out.violations,
                        );
                    }
                    out.declarations.push(Declaration {
                        name: name.clone(),
                        qualname: name,
                        class_name: None,
                        kind,
                        marker,
                        docstring: extract_docstring(&lines[header_end..end]),
                        body,
                        span,
                        line: i + 1,
                    });
                }
                i = end;
                continue;
            }
            // Any other top-level statement discards pending decorators.
            pending.clear();
            dec_start = None;
            let (_, next) = join_logical(&lines, i);
            i = next;
        }
        out
    }

    #[allow(clippy::too_many_arguments)]
    fn scan_class(
        &self,
        lines: &[&str],
        header_line: usize,
        header_end: usize,
        class_end: usize,
        class_name: &str,
        class_decorators: &[Decorator],
        span: &str,
        out: &mut ParsedUnit,
    ) {
        let (class_marker, problems) = spec_marker(class_decorators);
        for message in problems {
            out.violations.push(ScanViolation {
                line: header_line + 1,
                message,
            });
        }
        let body_lines = &lines[header_end..class_end];
        out.declarations.push(Declaration {
            name: class_name.to_string(),
            qualname: class_name.to_string(),
            class_name: None,
            kind: DeclKind::Class,
            marker: class_marker,
            docstring: extract_docstring(body_lines),
            body: body_lines.join("\n"),
            span: span.to_string(),
            line: header_line + 1,
        });

        let Some(member_indent) = body_lines
            .iter()
            .find(|l| !l.trim().is_empty())
            .map(|l| indent_width(l))
        else {
            return;
        };

        let mut pending: Vec<Decorator> = Vec::new();
        let mut j = 0;
        while j < body_lines.len() {
            let raw = body_lines[j];
            let trimmed = raw.trim_start();
            let abs_line = header_end + j + 1;
            if trimmed.is_empty() || trimmed.starts_with('#') {
                j += 1;
                continue;
            }
            if indent_width(raw) != member_indent {
                j += 1;
                continue;
            }
            if let Some(next) = string_statement_end(body_lines, j) {
                pending.clear();
                j = next;
                continue;
            }
            if trimmed.starts_with('@') {
                let (logical, next) = join_logical(body_lines, j);
                if let Some(dec) = parse_decorator(&logical) {
                    pending.push(dec);
                }
                j = next;
                continue;
            }
            if let Some((kind, name)) = parse_def_header(trimmed) {
                let (_, member_header_end) = join_logical(body_lines, j);
                let end = block_end(body_lines, member_header_end, member_indent);
                let decorators = std::mem::take(&mut pending);
                let (marker, problems) = spec_marker(&decorators);
                for message in problems {
                    out.violations.push(ScanViolation {
                        line: abs_line,
                        message,
                    });
                }
                if kind == DeclKind::Class {
                    if marker.is_some() {
                        out.violations.push(ScanViolation {
                            line: abs_line,
                            message:
                                "spec declarations support at most one level of nesting (class methods)"
                                    .to_string(),
                        });
                    }
                } else {
                    let body = body_lines[member_header_end..end].join("\n");
                    if marker.is_some() {
                        check_nested_markers(
                            &body,
                            abs_line,
                            "spec declarations support at most one level of nesting (class methods)",
                            &mut out.violations,
                        );
                    }
                    out.declarations.push(Declaration {
                        name: name.clone(),
                        qualname: format!("{class_name}.{name}"),
                        class_name: Some(class_name.to_string()),
                        kind,
                        marker,
                        docstring: extract_docstring(&body_lines[member_header_end..end]),
                        body,
                        // Entire class source: a sibling edit invalidates
                        // every member spec.
                        span: span.to_string(),
                        line: abs_line,
                    });
                }
                j = end;
                continue;
            }
            pending.clear();
            let (_, next) = join_logical(body_lines, j);
            j = next;
        }
    }
}

fn check_nested_markers(
    body: &str,
    line: usize,
    message: &str,
    violations: &mut Vec<ScanViolation>,
) {
    let stripped = strip_strings_and_comments(body);
    if nested_marker_regex().is_match(&stripped) {
        violations.push(ScanViolation {
            line,
            message: message.to_string(),
        });
    }
}

fn parse_def_header(trimmed: &str) -> Option<(DeclKind, String)> {
    let caps = def_header_regex().captures(trimmed)?;
    let kind = match &caps[1] {
        "class" => DeclKind::Class,
        "def" => DeclKind::Function,
        _ => DeclKind::AsyncFunction,
    };
    Some((kind, caps[2].to_string()))
}

fn indent_width(line: &str) -> usize {
    line.chars().take_while(|c| *c == ' ' || *c == '\t').count()
}

/// End (exclusive) of the block that starts after a header: lines more
/// indented than `outer_indent`, with interior blank lines allowed.
fn block_end(lines: &[&str], start: usize, outer_indent: usize) -> usize {
    let mut end = start;
    let mut i = start;
    while i < lines.len() {
        if lines[i].trim().is_empty() {
            i += 1;
            continue;
        }
        if indent_width(lines[i]) <= outer_indent {
            break;
        }
        i += 1;
        end = i;
    }
    end
}

/// Join one logical statement: trailing-backslash continuations and open
/// brackets pull in following lines. Line comments are dropped.
fn join_logical(lines: &[&str], start: usize) -> (String, usize) {
    let mut logical = String::new();
    let mut i = start;
    loop {
        let line = lines.get(i).copied().unwrap_or("");
        let mut segment = strip_line_comment(line);
        let continued = segment.trim_end().ends_with('\\');
        if continued {
            segment = segment.trim_end().trim_end_matches('\\').to_string();
        }
        if !logical.is_empty() {
            logical.push(' ');
        }
        logical.push_str(segment.trim());
        i += 1;
        if i >= lines.len() {
            break;
        }
        if continued || bracket_depth(&logical) > 0 {
            continue;
        }
        break;
    }
    (logical, i)
}

/// If the line starts a bare string statement (a docstring), return the
/// index just past it; triple-quoted strings may span lines.
fn string_statement_end(lines: &[&str], start: usize) -> Option<usize> {
    let trimmed = lines.get(start)?.trim_start();
    let quote_pos = trimmed.find(['"', '\''])?;
    if quote_pos > 2 || !trimmed[..quote_pos].chars().all(|c| "rRbBuUfF".contains(c)) {
        return None;
    }
    let text = &trimmed[quote_pos..];
    for delim in ["\"\"\"", "'''"] {
        let Some(rest) = text.strip_prefix(delim) else {
            continue;
        };
        if rest.contains(delim) {
            return Some(start + 1);
        }
        for (offset, line) in lines[start + 1..].iter().enumerate() {
            if line.contains(delim) {
                return Some(start + offset + 2);
            }
        }
        return Some(lines.len());
    }
    // Single-quoted strings end on their own line.
    Some(start + 1)
}

fn strip_line_comment(line: &str) -> String {
    let mut quote: Option<char> = None;
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            out.push(c);
            if c == '\\' {
                if let Some(&next) = chars.peek() {
                    out.push(next);
                    chars.next();
                }
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '#' => break,
            '"' | '\'' => {
                quote = Some(c);
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out
}

fn bracket_depth(text: &str) -> i32 {
    let mut depth = 0;
    let mut quote: Option<char> = None;
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            if c == '\\' {
                chars.next();
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            _ => {}
        }
    }
    depth
}

fn parse_import_line(logical: &str, imports: &mut Vec<ImportBinding>) {
    let logical = logical.trim();
    if let Some(rest) = logical.strip_prefix("from ") {
        let Some((module, names)) = rest.split_once(" import ") else {
            return;
        };
        let module = module.trim();
        let names = names
            .trim()
            .trim_start_matches('(')
            .trim_end_matches(')')
            .trim();
        for item in names.split(',') {
            let item = item.trim();
            if item.is_empty() || item == "*" {
                continue;
            }
            let (name, binding) = match item.split_once(" as ") {
                Some((n, b)) => (n.trim(), b.trim()),
                None => (item, item),
            };
            imports.push(ImportBinding::Name {
                binding: binding.to_string(),
                module: module.to_string(),
                name: name.to_string(),
            });
        }
    } else if let Some(rest) = logical.strip_prefix("import ") {
        for item in rest.split(',') {
            let item = item.trim();
            if item.is_empty() {
                continue;
            }
            match item.split_once(" as ") {
                Some((module, alias)) => imports.push(ImportBinding::Module {
                    binding: alias.trim().to_string(),
                    module: module.trim().to_string(),
                }),
                None => {
                    // `import a.b` binds the top package name only.
                    let first = item.split('.').next().unwrap_or(item);
                    imports.push(ImportBinding::Module {
                        binding: first.to_string(),
                        module: first.to_string(),
                    });
                }
            }
        }
    }
}

/// Extract a block's leading docstring, dedented and trimmed.
fn extract_docstring(block: &[&str]) -> String {
    let Some(first_idx) = block.iter().position(|l| !l.trim().is_empty()) else {
        return String::new();
    };
    let first = block[first_idx].trim();
    let Some(quote_pos) = first.find(['"', '\'']) else {
        return String::new();
    };
    if quote_pos > 2 || !first[..quote_pos].chars().all(|c| "rRbBuUfF".contains(c)) {
        return String::new();
    }
    let text = &first[quote_pos..];
    for delim in ["\"\"\"", "'''"] {
        let Some(rest) = text.strip_prefix(delim) else {
            continue;
        };
        if let Some(end) = rest.find(delim) {
            return rest[..end].trim().to_string();
        }
        let mut parts = vec![rest.trim().to_string()];
        for line in &block[first_idx + 1..] {
            if let Some(pos) = line.find(delim) {
                parts.push(line[..pos].trim().to_string());
                return join_docstring(parts);
            }
            parts.push(line.trim().to_string());
        }
        return join_docstring(parts);
    }
    for delim in ["\"", "'"] {
        if let Some(rest) = text.strip_prefix(delim) {
            if let Some(end) = rest.find(delim) {
                return rest[..end].to_string();
            }
        }
    }
    String::new()
}

fn join_docstring(parts: Vec<String>) -> String {
    parts.join("\n").trim().to_string()
}
