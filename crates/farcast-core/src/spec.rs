//! Spec declarations and translation units.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::spec_ref::SpecRef;

/// What a spec declares: an implementation stub or a test stub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecKind {
    /// An implementation stub (`@farcast.spec`).
    Implementation,
    /// A test stub (`@farcast.test`); its name must start with `test_`.
    Test,
}

/// An explicitly declared dependency, before resolution.
///
/// Declarations carry deps either as in-scope identifiers / attribute
/// chains (`deps=[TaskBoard]`, `deps=[util.fold]`) or as canonical string
/// forms (`deps=["pkg.util:fold"]`). Both are resolved once, early, into
/// [`SpecRef`]s; graph code never re-parses string forms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "form", content = "value", rename_all = "lowercase")]
pub enum DepRef {
    /// A bare identifier or attribute chain as it appeared in source.
    Direct(String),
    /// A `unit:qualname` string literal.
    Dotted(String),
}

/// One annotated stub declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Spec {
    pub spec_ref: SpecRef,
    pub kind: SpecKind,
    /// Declared dependencies, in declaration order.
    pub explicit_deps: Vec<DepRef>,
    /// The authoring contract: the stub's docstring.
    pub intent_text: String,
    /// Verbatim source of the declaration. For a class member this is the
    /// entire enclosing class body, so sibling edits invalidate the spec.
    pub source_span: String,
    /// Free-form backend guidance from `prompt="..."`.
    pub extra_directive: Option<String>,
    /// Per-spec override of the global dependency-inference switch.
    pub infer_deps: Option<bool>,
    /// Owning class name for a method spec.
    pub class_name: Option<String>,
    /// Position in stable discovery order; the deterministic tie-break for
    /// scheduling and topological ordering.
    pub discovery_index: usize,
}

impl Spec {
    /// Whether inference runs for this spec given the global switch.
    pub fn inference_enabled(&self, global: bool) -> bool {
        self.infer_deps.unwrap_or(global)
    }
}

/// Cache-invalidation stamp for a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitStamp {
    pub mtime_nanos: u128,
    pub size: u64,
}

/// A named grouping of specs: one source file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationUnit {
    /// Dotted module name relative to its source root, e.g. `pkg.billing`.
    pub name: String,
    /// Absolute path of the source file.
    pub path: PathBuf,
    /// Specs in declaration order.
    pub specs: Vec<Spec>,
    /// SHA-256 of the raw file contents, lowercase hex.
    pub content_hash: String,
    pub stamp: UnitStamp,
}

impl TranslationUnit {
    /// Qualified names the generated counterpart must define, in
    /// declaration order, deduplicated (method specs share a class).
    pub fn expected_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for spec in &self.specs {
            let name = spec
                .class_name
                .clone()
                .unwrap_or_else(|| spec.spec_ref.top_level_name().to_string());
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    /// Iterate this unit's spec refs.
    pub fn spec_refs(&self) -> impl Iterator<Item = &SpecRef> {
        self.specs.iter().map(|s| &s.spec_ref)
    }
}

/// Where a dependency edge came from. Diagnostics only: multiple edges
/// between the same pair collapse to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeOrigin {
    Explicit,
    Inferred,
}

/// A resolved dependency edge between two specs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEdge {
    pub from: SpecRef,
    pub to: SpecRef,
    pub origin: EdgeOrigin,
}
