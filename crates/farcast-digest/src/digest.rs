//! Spec and unit digests.
//!
//! A spec's local digest covers its declaration (source span, intent text,
//! extra directive, declared deps) plus tool and format version inputs.
//! Its graph digest folds in the *sorted* graph digests of its direct
//! dependencies, so any upstream change propagates to every downstream
//! spec even when the downstream source is untouched. Unit digests
//! aggregate over sorted spec refs and are order independent.

use std::collections::{BTreeSet, HashMap};

use farcast_core::hash::FieldHasher;
use farcast_core::{DepRef, Spec, SpecRef, TranslationUnit};
use farcast_graph::SpecGraph;

/// Bumped whenever digest composition changes, invalidating every store.
pub const DIGEST_FORMAT_VERSION: u32 = 1;

/// Computes digests over one build's graph state. Memoizes acyclic
/// subgraphs; recomputation of unchanged inputs is bit-for-bit identical.
pub struct DigestEngine<'a> {
    specs: &'a HashMap<SpecRef, &'a Spec>,
    graph: &'a SpecGraph,
    tool_version: String,
    memo: HashMap<SpecRef, String>,
}

impl<'a> DigestEngine<'a> {
    pub fn new(
        specs: &'a HashMap<SpecRef, &'a Spec>,
        graph: &'a SpecGraph,
        tool_version: impl Into<String>,
    ) -> Self {
        Self {
            specs,
            graph,
            tool_version: tool_version.into(),
            memo: HashMap::new(),
        }
    }

    /// Digest of one spec's own declaration, dependencies excluded.
    pub fn local_digest(&self, spec: &Spec) -> String {
        let mut hasher = FieldHasher::new();
        hasher
            .field("local")
            .field(DIGEST_FORMAT_VERSION.to_string())
            .field(&self.tool_version)
            .field(spec.spec_ref.to_string())
            .field(format!("{:?}", spec.kind))
            .field(&spec.source_span)
            .field(&spec.intent_text)
            .field(spec.extra_directive.as_deref().unwrap_or(""));
        for dep in &spec.explicit_deps {
            match dep {
                DepRef::Direct(text) => hasher.field(format!("direct:{text}")),
                DepRef::Dotted(text) => hasher.field(format!("dotted:{text}")),
            };
        }
        hasher.finish()
    }

    /// Transitive digest of one spec: local digest plus sorted dependency
    /// digests. Intra-unit reference cycles contribute a stable marker.
    pub fn graph_digest(&mut self, spec_ref: &SpecRef) -> String {
        let mut path = BTreeSet::new();
        let (digest, _) = self.graph_digest_inner(spec_ref, &mut path);
        digest
    }

    /// Digest of a whole unit: its raw content hash plus the graph digests
    /// of its specs, folded in sorted-ref order.
    pub fn unit_digest(&mut self, unit: &TranslationUnit) -> String {
        let mut refs: Vec<&SpecRef> = unit.specs.iter().map(|s| &s.spec_ref).collect();
        refs.sort();
        let mut hasher = FieldHasher::new();
        hasher
            .field("unit")
            .field(DIGEST_FORMAT_VERSION.to_string())
            .field(&self.tool_version)
            .field(&unit.name)
            .field(&unit.content_hash);
        for spec_ref in refs {
            let digest = self.graph_digest(spec_ref);
            hasher.field(spec_ref.to_string()).field(digest);
        }
        hasher.finish()
    }

    /// Returns the digest and whether a cycle was observed beneath this
    /// node; cyclic results are not memoized so that recomputation stays
    /// entry-point independent.
    fn graph_digest_inner(
        &mut self,
        spec_ref: &SpecRef,
        path: &mut BTreeSet<SpecRef>,
    ) -> (String, bool) {
        if let Some(memoized) = self.memo.get(spec_ref) {
            return (memoized.clone(), false);
        }
        if path.contains(spec_ref) {
            let mut hasher = FieldHasher::new();
            hasher.field("cycle").field(spec_ref.to_string());
            return (hasher.finish(), true);
        }
        let Some(spec) = self.specs.get(spec_ref) else {
            let mut hasher = FieldHasher::new();
            hasher.field("missing").field(spec_ref.to_string());
            return (hasher.finish(), false);
        };

        path.insert(spec_ref.clone());
        let mut saw_cycle = false;
        let mut dep_digests: Vec<String> = Vec::new();
        if let Some(deps) = self.graph.deps_of(spec_ref) {
            for dep in deps {
                let (digest, cyclic) = self.graph_digest_inner(dep, path);
                saw_cycle |= cyclic;
                dep_digests.push(digest);
            }
        }
        path.remove(spec_ref);
        dep_digests.sort();

        let mut hasher = FieldHasher::new();
        hasher.field("graph").field(self.local_digest(spec));
        for digest in &dep_digests {
            hasher.field(digest);
        }
        let digest = hasher.finish();
        if !saw_cycle {
            self.memo.insert(spec_ref.clone(), digest.clone());
        }
        (digest, saw_cycle)
    }
}
