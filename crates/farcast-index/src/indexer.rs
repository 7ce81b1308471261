//! Translation-unit discovery.
//!
//! Two modes. Default: recursively enumerate every `.py` file under the
//! configured roots. Scoped: resolve target names directly to candidate
//! unit paths (no full scan), then discover only the additional units the
//! targets reference as dependencies, transitively, so the graph can be
//! validated over the whole closure.

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use glob::glob;

use farcast_core::hash::sha256_hex;
use farcast_core::paths::{
    candidate_paths, parent_package, resolve_relative_module, unit_name_from_relpath,
};
use farcast_core::{BuildConfig, DepRef, Spec, SpecKind, SpecRef, TranslationUnit, UnitStamp};
use farcast_parse::{ImportBinding, ParseCache, ParsedUnit, Scanner};

use crate::error::IndexError;

/// Required prefix for the declared name of a test-kind spec.
pub const TEST_NAME_PREFIX: &str = "test_";

/// One discovered unit: the core model plus its structural representation
/// (kept for reference inference) and the root it was found under.
#[derive(Debug, Clone)]
pub struct IndexedUnit {
    pub unit: TranslationUnit,
    pub parsed: ParsedUnit,
    pub root: PathBuf,
}

impl IndexedUnit {
    /// Whether this unit is a package aggregation file (`__init__.py`).
    pub fn is_package(&self) -> bool {
        self.unit
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n == "__init__.py")
            .unwrap_or(false)
    }

    /// The package relative imports resolve against: the unit itself for a
    /// package, its parent otherwise.
    pub fn containing_package(&self) -> String {
        if self.is_package() {
            self.unit.name.clone()
        } else {
            parent_package(&self.unit.name).to_string()
        }
    }
}

/// Everything discovery produced, in stable discovery order.
#[derive(Debug, Clone, Default)]
pub struct SourceIndex {
    units: Vec<IndexedUnit>,
    by_name: HashMap<String, usize>,
}

impl SourceIndex {
    pub fn get(&self, name: &str) -> Option<&IndexedUnit> {
        self.by_name.get(name).map(|&i| &self.units[i])
    }

    pub fn units(&self) -> &[IndexedUnit] {
        &self.units
    }

    /// Units that declare at least one spec, in discovery order. Spec-less
    /// units stay in the index (re-export lookups need them) but take no
    /// part in building.
    pub fn spec_units(&self) -> impl Iterator<Item = &IndexedUnit> {
        self.units.iter().filter(|u| !u.unit.specs.is_empty())
    }

    /// All specs by reference.
    pub fn spec_map(&self) -> HashMap<SpecRef, &Spec> {
        let mut map = HashMap::new();
        for iu in &self.units {
            for spec in &iu.unit.specs {
                map.insert(spec.spec_ref.clone(), spec);
            }
        }
        map
    }

    pub fn contains_spec(&self, spec_ref: &SpecRef) -> bool {
        self.get(&spec_ref.unit)
            .map(|iu| iu.unit.specs.iter().any(|s| &s.spec_ref == spec_ref))
            .unwrap_or(false)
    }

    fn push(&mut self, iu: IndexedUnit) {
        self.by_name.insert(iu.unit.name.clone(), self.units.len());
        self.units.push(iu);
    }
}

/// The source indexer. Parse-cache access is injected so concurrent builds
/// never share hidden state.
pub struct Indexer<'a, 'c> {
    config: &'a BuildConfig,
    cache: &'c mut ParseCache,
    scanner: Scanner,
    next_discovery_index: usize,
}

impl<'a, 'c> Indexer<'a, 'c> {
    pub fn new(config: &'a BuildConfig, cache: &'c mut ParseCache) -> Self {
        Self {
            config,
            cache,
            scanner: Scanner::new(),
            next_discovery_index: 0,
        }
    }

    /// Discover the units this build needs.
    pub fn index(&mut self) -> Result<SourceIndex, IndexError> {
        for root in self.config.all_roots() {
            if !root.is_dir() {
                return Err(IndexError::InvalidRoot(root.clone()));
            }
        }
        if self.config.targets.is_empty() {
            self.index_all()
        } else {
            self.index_scoped()
        }
    }

    fn index_all(&mut self) -> Result<SourceIndex, IndexError> {
        let mut index = SourceIndex::default();
        let roots: Vec<PathBuf> = self.config.all_roots().cloned().collect();
        for root in roots {
            let pattern = format!("{}/**/*.py", root.display());
            let mut paths: Vec<PathBuf> = glob(&pattern)?.flatten().collect();
            paths.sort();
            for path in paths {
                let Ok(rel) = path.strip_prefix(&root) else {
                    continue;
                };
                let Some(name) = unit_name_from_relpath(rel, &self.config.generated_dir) else {
                    continue;
                };
                if index.by_name.contains_key(&name) {
                    continue;
                }
                let iu = self.load_unit(&root, &path, name)?;
                index.push(iu);
            }
        }
        tracing::debug!(units = index.units.len(), "full discovery complete");
        Ok(index)
    }

    fn index_scoped(&mut self) -> Result<SourceIndex, IndexError> {
        let mut index = SourceIndex::default();
        let mut pending: VecDeque<(String, bool)> = self
            .config
            .targets
            .iter()
            .map(|t| (t.unit.clone(), true))
            .collect();

        while let Some((name, required)) = pending.pop_front() {
            if index.by_name.contains_key(&name) {
                continue;
            }
            let Some((root, path)) = self.resolve_unit_path(&name) else {
                if required {
                    return Err(IndexError::MissingTarget(name));
                }
                // Not under our roots (stdlib, third-party): no unit.
                continue;
            };
            let iu = self.load_unit(&root, &path, name)?;
            for dep in dependency_unit_names(&iu) {
                if !index.by_name.contains_key(&dep) {
                    pending.push_back((dep, false));
                }
            }
            index.push(iu);
        }
        tracing::debug!(units = index.units.len(), "scoped discovery complete");
        Ok(index)
    }

    fn resolve_unit_path(&self, name: &str) -> Option<(PathBuf, PathBuf)> {
        for root in self.config.all_roots() {
            for candidate in candidate_paths(root, name) {
                if candidate.is_file() {
                    return Some((root.clone(), candidate));
                }
            }
        }
        None
    }

    fn load_unit(
        &mut self,
        root: &Path,
        path: &Path,
        name: String,
    ) -> Result<IndexedUnit, IndexError> {
        let meta = fs::metadata(path).map_err(|source| IndexError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let stamp = UnitStamp {
            mtime_nanos: meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_nanos())
                .unwrap_or_default(),
            size: meta.len(),
        };

        let (parsed, source) = match self.cache.get(path, stamp) {
            Some(cached) => (cached.unit, cached.source),
            None => {
                let source = fs::read_to_string(path).map_err(|source| IndexError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                let parsed = self.scanner.scan(&name, &source);
                self.cache.put(path, stamp, &parsed, &source);
                (parsed, source)
            }
        };

        if let Some(violation) = parsed.violations.first() {
            return Err(IndexError::Validation {
                unit: name,
                line: violation.line,
                message: violation.message.clone(),
            });
        }

        let mut specs = Vec::new();
        for decl in parsed.declarations.iter() {
            let Some(marker) = &decl.marker else {
                continue;
            };
            if marker.kind == SpecKind::Test && !decl.name.starts_with(TEST_NAME_PREFIX) {
                return Err(IndexError::Validation {
                    unit: name,
                    line: decl.line,
                    message: format!(
                        "test spec {:?} must be named with the {TEST_NAME_PREFIX:?} prefix",
                        decl.name
                    ),
                });
            }
            specs.push(Spec {
                spec_ref: SpecRef::new(name.clone(), decl.qualname.clone()),
                kind: marker.kind,
                explicit_deps: marker.deps.clone(),
                intent_text: decl.docstring.clone(),
                source_span: decl.span.clone(),
                extra_directive: marker.prompt.clone(),
                infer_deps: marker.infer_deps,
                class_name: decl.class_name.clone(),
                discovery_index: self.next_discovery_index,
            });
            self.next_discovery_index += 1;
        }

        let unit = TranslationUnit {
            name,
            path: path.to_path_buf(),
            specs,
            content_hash: sha256_hex(source.as_bytes()),
            stamp,
        };
        Ok(IndexedUnit {
            unit,
            parsed,
            root: root.to_path_buf(),
        })
    }
}

/// Unit names a unit's declared deps and imports point at; the candidate
/// set the scoped second pass walks.
fn dependency_unit_names(iu: &IndexedUnit) -> Vec<String> {
    let package = iu.containing_package();
    let mut names = Vec::new();
    let mut add = |name: String| {
        if name != iu.unit.name && !names.contains(&name) {
            names.push(name);
        }
    };

    for spec in &iu.unit.specs {
        for dep in &spec.explicit_deps {
            if let DepRef::Dotted(text) = dep {
                if let Ok(spec_ref) = text.parse::<SpecRef>() {
                    add(spec_ref.unit);
                }
            }
        }
    }
    for import in &iu.parsed.imports {
        let module = match import {
            ImportBinding::Module { module, .. } => module,
            ImportBinding::Name { module, .. } => module,
        };
        if let Some(resolved) = resolve_relative_module(&package, module) {
            add(resolved);
        }
    }
    names
}
