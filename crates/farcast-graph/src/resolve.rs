//! Reference resolution: explicit dep forms and best-effort inference.
//!
//! Inference walks a spec body's reference tokens looking for (a) direct
//! references to names bound to other specs in scope, (b) attribute chains
//! resolved by progressively testing longer import-path candidates,
//! (c) nested declarations (dotted qualnames), and (d) one level of
//! re-export indirection through a package aggregation unit. Every outcome
//! is an `Option`: a failed resolution is "no edge", never an abort. A
//! candidate must exist in the known spec set before an edge is added; an
//! ambiguous match resolves to nothing.

use farcast_core::paths::resolve_relative_module;
use farcast_core::{DepRef, Spec, SpecRef};
use farcast_index::{IndexedUnit, SourceIndex};
use farcast_parse::{reference_chains, ImportBinding};

/// Resolves references against one discovered source tree.
pub struct Resolver<'i> {
    index: &'i SourceIndex,
}

impl<'i> Resolver<'i> {
    pub fn new(index: &'i SourceIndex) -> Self {
        Self { index }
    }

    /// Resolve one explicitly declared dependency. `None` means the form
    /// does not name any known spec; the graph builder treats that as a
    /// declaration error.
    pub fn resolve_explicit(
        &self,
        iu: &IndexedUnit,
        spec: &Spec,
        dep: &DepRef,
    ) -> Option<SpecRef> {
        match dep {
            DepRef::Dotted(text) => {
                let spec_ref: SpecRef = text.parse().ok()?;
                self.known(&spec_ref).then_some(spec_ref)
            }
            DepRef::Direct(chain) => self.resolve_chain(iu, spec, chain),
        }
    }

    /// Infer additional dependencies from the spec's body. Best-effort:
    /// false negatives are acceptable; self-references are never produced.
    pub fn infer(&self, iu: &IndexedUnit, spec: &Spec) -> Vec<SpecRef> {
        let Some(decl) = iu
            .parsed
            .declarations
            .iter()
            .find(|d| d.qualname == spec.spec_ref.qualname)
        else {
            return Vec::new();
        };
        let mut inferred = Vec::new();
        for chain in reference_chains(&decl.body) {
            if let Some(spec_ref) = self.resolve_chain(iu, spec, &chain) {
                if spec_ref != spec.spec_ref && !inferred.contains(&spec_ref) {
                    inferred.push(spec_ref);
                }
            }
        }
        inferred
    }

    fn known(&self, spec_ref: &SpecRef) -> bool {
        self.index.contains_spec(spec_ref)
    }

    fn push_known(&self, candidates: &mut Vec<SpecRef>, spec_ref: SpecRef) {
        if self.known(&spec_ref) && !candidates.contains(&spec_ref) {
            candidates.push(spec_ref);
        }
    }

    /// Resolve one identifier or attribute chain against a unit's scope.
    fn resolve_chain(&self, iu: &IndexedUnit, spec: &Spec, chain: &str) -> Option<SpecRef> {
        let segments: Vec<&str> = chain.split('.').collect();
        let package = iu.containing_package();
        let mut candidates: Vec<SpecRef> = Vec::new();

        // `self.other` / `cls.other` inside a method: a sibling member of
        // the owning class.
        if segments.len() == 2 && (segments[0] == "self" || segments[0] == "cls") {
            if let Some(class) = &spec.class_name {
                self.push_known(
                    &mut candidates,
                    SpecRef::new(iu.unit.name.clone(), format!("{class}.{}", segments[1])),
                );
            }
            return single(candidates);
        }

        if segments.len() == 1 {
            let name = segments[0];
            // Module-local declaration.
            self.push_known(&mut candidates, SpecRef::new(iu.unit.name.clone(), name));
            // Import-bound name, with one level of re-export indirection.
            if let Some(ImportBinding::Name {
                module,
                name: original,
                ..
            }) = iu.parsed.binding_for(name)
            {
                if let Some(module) = resolve_relative_module(&package, module) {
                    let direct = SpecRef::new(module.clone(), original.clone());
                    if self.known(&direct) {
                        self.push_known(&mut candidates, direct);
                    } else if let Some(reexported) = self.reexport(&module, original) {
                        self.push_known(&mut candidates, reexported);
                    }
                }
            }
            return single(candidates);
        }

        // Nested declaration in the same unit: `Board.add`.
        if segments.len() == 2 {
            self.push_known(
                &mut candidates,
                SpecRef::new(iu.unit.name.clone(), chain.to_string()),
            );
        }

        match iu.parsed.binding_for(segments[0]) {
            Some(ImportBinding::Module { module, .. }) => {
                if let Some(base) = resolve_relative_module(&package, module) {
                    // Progressively longer import-path candidates:
                    // `alias.sub.Name` with alias -> a.b tries
                    // `a.b.sub:Name` before `a.b:sub.Name`.
                    let rest = &segments[1..];
                    for cut in (0..rest.len()).rev() {
                        let qualname = rest[cut..].join(".");
                        if qualname.matches('.').count() > 1 {
                            break;
                        }
                        let module_path = if cut == 0 {
                            base.clone()
                        } else {
                            format!("{base}.{}", rest[..cut].join("."))
                        };
                        self.push_known(&mut candidates, SpecRef::new(module_path, qualname));
                    }
                }
            }
            Some(ImportBinding::Name {
                module,
                name: original,
                ..
            }) => {
                // Attribute of an imported object: a member of an imported
                // class, `Board.add` after `from m import Board`.
                if segments.len() == 2 {
                    if let Some(module) = resolve_relative_module(&package, module) {
                        self.push_known(
                            &mut candidates,
                            SpecRef::new(module, format!("{original}.{}", segments[1])),
                        );
                    }
                }
            }
            None => {}
        }
        single(candidates)
    }

    /// One level of re-export indirection: `from pkg import name` where the
    /// package's aggregation unit re-exports `name` from a submodule.
    fn reexport(&self, package: &str, name: &str) -> Option<SpecRef> {
        let aggregation = self.index.get(package)?;
        if !aggregation.is_package() {
            return None;
        }
        for import in &aggregation.parsed.imports {
            let ImportBinding::Name {
                binding,
                module,
                name: original,
            } = import
            else {
                continue;
            };
            if binding != name {
                continue;
            }
            let submodule = resolve_relative_module(package, module)?;
            let spec_ref = SpecRef::new(submodule, original.clone());
            if self.known(&spec_ref) {
                return Some(spec_ref);
            }
        }
        None
    }
}

fn single(mut candidates: Vec<SpecRef>) -> Option<SpecRef> {
    match candidates.len() {
        1 => Some(candidates.remove(0)),
        0 => None,
        _ => {
            tracing::debug!(?candidates, "ambiguous reference; no edge added");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use farcast_core::BuildConfig;
    use farcast_index::Indexer;
    use farcast_parse::ParseCache;
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    fn write(path: &Path, text: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }

    fn index_tree(files: &[(&str, &str)]) -> (tempfile::TempDir, SourceIndex) {
        let dir = tempdir().unwrap();
        for (rel, text) in files {
            write(&dir.path().join("src").join(rel), text);
        }
        let config = BuildConfig {
            source_roots: vec![dir.path().join("src")],
            test_roots: vec![],
            ..BuildConfig::default()
        };
        let mut cache = ParseCache::new(dir.path().join(".farcast/parse"));
        let index = Indexer::new(&config, &mut cache).index().unwrap();
        (dir, index)
    }

    fn spec_of<'a>(index: &'a SourceIndex, unit: &str, qualname: &str) -> &'a Spec {
        index
            .get(unit)
            .unwrap()
            .unit
            .specs
            .iter()
            .find(|s| s.spec_ref.qualname == qualname)
            .unwrap()
    }

    const FOLD: &str = "@farcast.spec()\ndef fold(text):\n    \"\"\"Fold.\"\"\"\n    ...\n";

    #[test]
    fn infers_direct_import_reference() {
        let (_dir, index) = index_tree(&[
            ("pkg/util.py", FOLD),
            (
                "pkg/app.py",
                "from pkg.util import fold\n\n@farcast.spec()\ndef run(x):\n    \"\"\"Run.\"\"\"\n    return fold(x)\n",
            ),
        ]);
        let resolver = Resolver::new(&index);
        let iu = index.get("pkg.app").unwrap();
        let spec = spec_of(&index, "pkg.app", "run");
        assert_eq!(
            resolver.infer(iu, spec),
            vec![SpecRef::new("pkg.util", "fold")]
        );
    }

    #[test]
    fn infers_attribute_chain_via_module_alias() {
        let (_dir, index) = index_tree(&[
            ("pkg/util.py", FOLD),
            (
                "pkg/app.py",
                "import pkg.util as u\n\n@farcast.spec()\ndef run(x):\n    \"\"\"Run.\"\"\"\n    return u.fold(x)\n",
            ),
        ]);
        let resolver = Resolver::new(&index);
        let iu = index.get("pkg.app").unwrap();
        let spec = spec_of(&index, "pkg.app", "run");
        assert_eq!(
            resolver.infer(iu, spec),
            vec![SpecRef::new("pkg.util", "fold")]
        );
    }

    #[test]
    fn infers_multi_segment_chain_through_package_import() {
        let (_dir, index) = index_tree(&[
            ("pkg/util.py", FOLD),
            (
                "app.py",
                "import pkg\n\n@farcast.spec()\ndef run(x):\n    \"\"\"Run.\"\"\"\n    return pkg.util.fold(x)\n",
            ),
        ]);
        let resolver = Resolver::new(&index);
        let iu = index.get("app").unwrap();
        let spec = spec_of(&index, "app", "run");
        assert_eq!(
            resolver.infer(iu, spec),
            vec![SpecRef::new("pkg.util", "fold")]
        );
    }

    #[test]
    fn infers_reexported_name() {
        let (_dir, index) = index_tree(&[
            ("pkg/__init__.py", "from .util import fold\n"),
            ("pkg/util.py", FOLD),
            (
                "app.py",
                "from pkg import fold\n\n@farcast.spec()\ndef run(x):\n    \"\"\"Run.\"\"\"\n    return fold(x)\n",
            ),
        ]);
        let resolver = Resolver::new(&index);
        let iu = index.get("app").unwrap();
        let spec = spec_of(&index, "app", "run");
        assert_eq!(
            resolver.infer(iu, spec),
            vec![SpecRef::new("pkg.util", "fold")]
        );
    }

    #[test]
    fn infers_sibling_method_through_self() {
        let (_dir, index) = index_tree(&[(
            "board.py",
            concat!(
                "class Board:\n",
                "    @farcast.spec()\n",
                "    def add(self, t):\n",
                "        \"\"\"Add.\"\"\"\n",
                "        return self.validate(t)\n",
                "\n",
                "    @farcast.spec()\n",
                "    def validate(self, t):\n",
                "        \"\"\"Validate.\"\"\"\n",
                "        ...\n",
            ),
        )]);
        let resolver = Resolver::new(&index);
        let iu = index.get("board").unwrap();
        let spec = spec_of(&index, "board", "Board.add");
        assert_eq!(
            resolver.infer(iu, spec),
            vec![SpecRef::new("board", "Board.validate")]
        );
    }

    #[test]
    fn infers_nested_declaration_reference() {
        let (_dir, index) = index_tree(&[(
            "board.py",
            concat!(
                "class Board:\n",
                "    @farcast.spec()\n",
                "    def validate(self, t):\n",
                "        \"\"\"Validate.\"\"\"\n",
                "        ...\n",
                "\n",
                "@farcast.spec()\n",
                "def run(b):\n",
                "    \"\"\"Run.\"\"\"\n",
                "    return Board.validate(b)\n",
            ),
        )]);
        let resolver = Resolver::new(&index);
        let iu = index.get("board").unwrap();
        let spec = spec_of(&index, "board", "run");
        assert_eq!(
            resolver.infer(iu, spec),
            vec![SpecRef::new("board", "Board.validate")]
        );
    }

    #[test]
    fn unknown_references_yield_no_edges() {
        let (_dir, index) = index_tree(&[(
            "app.py",
            "import json\n\n@farcast.spec()\ndef run(x):\n    \"\"\"Run.\"\"\"\n    return json.dumps(undefined_helper(x))\n",
        )]);
        let resolver = Resolver::new(&index);
        let iu = index.get("app").unwrap();
        let spec = spec_of(&index, "app", "run");
        assert!(resolver.infer(iu, spec).is_empty());
    }

    #[test]
    fn explicit_forms_resolve_once() {
        let (_dir, index) = index_tree(&[
            ("pkg/util.py", FOLD),
            (
                "app.py",
                "from pkg.util import fold\n\n@farcast.spec(deps=[\"pkg.util:fold\"])\ndef a(x):\n    \"\"\"A.\"\"\"\n    ...\n\n@farcast.spec(deps=[fold])\ndef b(x):\n    \"\"\"B.\"\"\"\n    ...\n",
            ),
        ]);
        let resolver = Resolver::new(&index);
        let iu = index.get("app").unwrap();
        let expected = SpecRef::new("pkg.util", "fold");

        let a = spec_of(&index, "app", "a");
        assert_eq!(
            resolver.resolve_explicit(iu, a, &a.explicit_deps[0]),
            Some(expected.clone())
        );
        let b = spec_of(&index, "app", "b");
        assert_eq!(
            resolver.resolve_explicit(iu, b, &b.explicit_deps[0]),
            Some(expected)
        );
        assert_eq!(
            resolver.resolve_explicit(iu, a, &DepRef::Dotted("no.such:spec".to_string())),
            None
        );
    }
}
