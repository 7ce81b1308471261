//! Dependency graph assembly.
//!
//! Merges explicit and inferred edges into one spec-level graph, keeping
//! edge origins for diagnostics, and projects the unit-level DAG the
//! scheduler and staleness engine walk.

use std::collections::{BTreeMap, BTreeSet};

use farcast_core::{DepRef, DependencyEdge, EdgeOrigin, SpecRef};
use farcast_index::SourceIndex;

use crate::error::GraphError;
use crate::resolve::Resolver;

/// The merged dependency graph over all discovered specs.
#[derive(Debug, Clone, Default)]
pub struct SpecGraph {
    deps: BTreeMap<SpecRef, BTreeSet<SpecRef>>,
    edges: Vec<DependencyEdge>,
}

impl SpecGraph {
    /// Build the graph from a discovered source tree. The graph builder is
    /// the sole writer: explicit edges resolve first, inference fills in
    /// the rest, duplicates collapse to the explicit origin.
    ///
    /// An explicit dependency that names no known spec is a declaration
    /// error and fatal; inference failures are silently absent.
    pub fn build(index: &SourceIndex, infer_default: bool) -> Result<Self, GraphError> {
        let resolver = Resolver::new(index);
        let mut graph = SpecGraph::default();

        for iu in index.spec_units() {
            for spec in &iu.unit.specs {
                let mut deps: BTreeSet<SpecRef> = BTreeSet::new();
                for dep in &spec.explicit_deps {
                    let resolved = resolver.resolve_explicit(iu, spec, dep).ok_or_else(|| {
                        GraphError::UnknownDependency {
                            spec: spec.spec_ref.clone(),
                            dep: match dep {
                                DepRef::Direct(text) | DepRef::Dotted(text) => text.clone(),
                            },
                        }
                    })?;
                    if deps.insert(resolved.clone()) {
                        graph.edges.push(DependencyEdge {
                            from: spec.spec_ref.clone(),
                            to: resolved,
                            origin: EdgeOrigin::Explicit,
                        });
                    }
                }
                if spec.inference_enabled(infer_default) {
                    for resolved in resolver.infer(iu, spec) {
                        if deps.insert(resolved.clone()) {
                            graph.edges.push(DependencyEdge {
                                from: spec.spec_ref.clone(),
                                to: resolved,
                                origin: EdgeOrigin::Inferred,
                            });
                        }
                    }
                }
                graph.deps.insert(spec.spec_ref.clone(), deps);
            }
        }
        tracing::debug!(
            specs = graph.deps.len(),
            edges = graph.edges.len(),
            "dependency graph assembled"
        );
        Ok(graph)
    }

    /// Direct dependencies of one spec.
    pub fn deps_of(&self, spec_ref: &SpecRef) -> Option<&BTreeSet<SpecRef>> {
        self.deps.get(spec_ref)
    }

    /// The full adjacency map.
    pub fn deps(&self) -> &BTreeMap<SpecRef, BTreeSet<SpecRef>> {
        &self.deps
    }

    /// All collapsed edges with their origins, for diagnostics.
    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }

    /// Project the unit-level DAG: intra-unit edges drop (a unit generates
    /// as one artifact), every spec-bearing unit appears as a node.
    pub fn unit_dag(&self) -> BTreeMap<String, BTreeSet<String>> {
        let mut dag: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (from, deps) in &self.deps {
            let entry = dag.entry(from.unit.clone()).or_default();
            for to in deps {
                if to.unit != from.unit {
                    entry.insert(to.unit.clone());
                }
            }
        }
        dag
    }
}

/// Top-level packages imported by spec units that do not resolve to any
/// indexed unit: the inputs of external-distribution resolution.
/// `__future__` is a compiler directive, not a distribution.
pub fn external_import_packages(index: &SourceIndex) -> BTreeSet<String> {
    use farcast_core::paths::resolve_relative_module;
    use farcast_parse::ImportBinding;

    let mut packages = BTreeSet::new();
    for iu in index.spec_units() {
        let package = iu.containing_package();
        for import in &iu.parsed.imports {
            let module = match import {
                ImportBinding::Module { module, .. } | ImportBinding::Name { module, .. } => module,
            };
            let Some(resolved) = resolve_relative_module(&package, module) else {
                continue;
            };
            let top = resolved.split('.').next().unwrap_or(&resolved).to_string();
            if top == "__future__" {
                continue;
            }
            if index.get(&resolved).is_none() && index.get(&top).is_none() {
                packages.insert(top);
            }
        }
    }
    packages
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

    #[test]
    fn merges_explicit_and_inferred_edges() {
        let (_dir, index) = index_tree(&[
            (
                "util.py",
                "@farcast.spec()\ndef fold(x):\n    \"\"\"Fold.\"\"\"\n    ...\n\n@farcast.spec()\ndef norm(x):\n    \"\"\"Norm.\"\"\"\n    ...\n",
            ),
            (
                "app.py",
                "from util import fold, norm\n\n@farcast.spec(deps=[\"util:fold\"])\ndef run(x):\n    \"\"\"Run.\"\"\"\n    return norm(fold(x))\n",
            ),
        ]);
        let graph = SpecGraph::build(&index, true).unwrap();
        let run = SpecRef::new("app", "run");
        let deps = graph.deps_of(&run).unwrap();
        assert!(deps.contains(&SpecRef::new("util", "fold")));
        assert!(deps.contains(&SpecRef::new("util", "norm")));

        // `fold` is both declared and referenced; the edge collapses to
        // its explicit origin.
        let fold_edges: Vec<_> = graph
            .edges()
            .iter()
            .filter(|e| e.from == run && e.to == SpecRef::new("util", "fold"))
            .collect();
        assert_eq!(fold_edges.len(), 1);
        assert_eq!(fold_edges[0].origin, EdgeOrigin::Explicit);
    }

    #[test]
    fn inference_switch_disables_inferred_edges() {
        let (_dir, index) = index_tree(&[
            ("util.py", "@farcast.spec()\ndef fold(x):\n    \"\"\"Fold.\"\"\"\n    ...\n"),
            (
                "app.py",
                "from util import fold\n\n@farcast.spec(infer_deps=False)\ndef run(x):\n    \"\"\"Run.\"\"\"\n    return fold(x)\n",
            ),
        ]);
        let graph = SpecGraph::build(&index, true).unwrap();
        assert!(graph.deps_of(&SpecRef::new("app", "run")).unwrap().is_empty());
    }

    #[test]
    fn unknown_explicit_dependency_is_fatal() {
        let (_dir, index) = index_tree(&[(
            "app.py",
            "@farcast.spec(deps=[\"no.such:spec\"])\ndef run(x):\n    \"\"\"Run.\"\"\"\n    ...\n",
        )]);
        let err = SpecGraph::build(&index, true).unwrap_err();
        assert!(matches!(err, GraphError::UnknownDependency { dep, .. } if dep == "no.such:spec"));
    }

    #[test]
    fn unit_dag_drops_intra_unit_edges() {
        let (_dir, index) = index_tree(&[
            (
                "util.py",
                "@farcast.spec()\ndef fold(x):\n    \"\"\"Fold.\"\"\"\n    ...\n\n@farcast.spec(deps=[fold])\ndef norm(x):\n    \"\"\"Norm.\"\"\"\n    ...\n",
            ),
            (
                "app.py",
                "from util import norm\n\n@farcast.spec()\ndef run(x):\n    \"\"\"Run.\"\"\"\n    return norm(x)\n",
            ),
        ]);
        let graph = SpecGraph::build(&index, true).unwrap();
        let dag = graph.unit_dag();
        assert!(dag["util"].is_empty());
        assert_eq!(
            dag["app"],
            BTreeSet::from(["util".to_string()])
        );
    }

    #[test]
    fn external_imports_surface_top_level_packages() {
        let (_dir, index) = index_tree(&[(
            "app.py",
            "from __future__ import annotations\nimport requests\nfrom requests.auth import HTTPBasicAuth\n\n@farcast.spec()\ndef run(x):\n    \"\"\"Run.\"\"\"\n    ...\n",
        )]);
        let packages = external_import_packages(&index);
        assert_eq!(packages, BTreeSet::from(["requests".to_string()]));
    }
}
