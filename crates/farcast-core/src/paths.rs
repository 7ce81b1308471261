//! Mapping between unit names, source paths, and generated counterparts.
//!
//! A unit's generated artifact lives in a sibling directory named after the
//! configured generated-dir: unit `a.b.c` maps to generated unit
//! `a.b.<generated_dir>.c` at `a/b/<generated_dir>/c.py`.

use std::path::{Path, PathBuf};

/// Default name of the generated directory.
pub const DEFAULT_GENERATED_DIR: &str = "__generated__";

/// Map a unit name to its generated counterpart's dotted name.
pub fn unit_to_generated_unit(unit: &str, generated_dir: &str) -> String {
    match unit.rsplit_once('.') {
        Some((parent, leaf)) => format!("{parent}.{generated_dir}.{leaf}"),
        None => format!("{generated_dir}.{unit}"),
    }
}

/// Relative path of a unit's source file under its root.
pub fn unit_relpath(unit: &str) -> PathBuf {
    let mut path: PathBuf = unit.split('.').collect();
    path.set_extension("py");
    path
}

/// Relative path of a unit's generated artifact under its root.
pub fn generated_relpath(unit: &str, generated_dir: &str) -> PathBuf {
    let mut path = PathBuf::new();
    let segments: Vec<&str> = unit.split('.').collect();
    for segment in &segments[..segments.len().saturating_sub(1)] {
        path.push(segment);
    }
    path.push(generated_dir);
    path.push(segments.last().copied().unwrap_or(unit));
    path.set_extension("py");
    path
}

/// Recover a unit name from a path relative to a source root.
///
/// `pkg/util/text.py` -> `pkg.util.text`; a package `__init__.py` names
/// the package itself: `pkg/__init__.py` -> `pkg`. Returns `None` for
/// non-`.py` paths or paths passing through the generated dir.
pub fn unit_name_from_relpath(relpath: &Path, generated_dir: &str) -> Option<String> {
    if relpath.extension().and_then(|e| e.to_str()) != Some("py") {
        return None;
    }
    let mut segments = Vec::new();
    for component in relpath.with_extension("").components() {
        let segment = component.as_os_str().to_str()?;
        if segment == generated_dir {
            return None;
        }
        segments.push(segment.to_string());
    }
    if segments.last().map(String::as_str) == Some("__init__") {
        segments.pop();
    }
    if segments.is_empty() {
        return None;
    }
    Some(segments.join("."))
}

/// Resolve a possibly-relative module string against the package that
/// contains the importing unit (`pkg` for unit `pkg.specs`; the unit
/// itself when it is a package aggregation file). One leading dot names
/// that package, each extra dot climbs one level. Returns `None` when the
/// import climbs past the root.
pub fn resolve_relative_module(package: &str, module: &str) -> Option<String> {
    let dots = module.chars().take_while(|c| *c == '.').count();
    if dots == 0 {
        return Some(module.to_string());
    }
    let rest = &module[dots..];
    let mut base: Vec<&str> = if package.is_empty() {
        Vec::new()
    } else {
        package.split('.').collect()
    };
    for _ in 1..dots {
        if base.pop().is_none() {
            return None;
        }
    }
    let mut name = base.join(".");
    if !rest.is_empty() {
        if !name.is_empty() {
            name.push('.');
        }
        name.push_str(rest);
    }
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// The package containing a plain (non-package) unit: `pkg.specs` -> `pkg`.
pub fn parent_package(unit: &str) -> &str {
    unit.rsplit_once('.').map(|(parent, _)| parent).unwrap_or("")
}

/// Candidate source paths for a unit under a root: `a/b.py` or the
/// package aggregation file `a/b/__init__.py`.
pub fn candidate_paths(root: &Path, unit: &str) -> [PathBuf; 2] {
    let module = root.join(unit_relpath(unit));
    let package: PathBuf = unit.split('.').collect();
    let package = root.join(package).join("__init__.py");
    [module, package]
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("a.b.c", "a.b.__generated__.c"; "nested unit")]
    #[test_case("m", "__generated__.m"; "top level unit")]
    fn generated_unit_names(unit: &str, expected: &str) {
        assert_eq!(unit_to_generated_unit(unit, DEFAULT_GENERATED_DIR), expected);
    }

    #[test_case("a.b.c", "a/b/__generated__/c.py"; "nested")]
    #[test_case("m", "__generated__/m.py"; "top level")]
    fn generated_relpaths(unit: &str, expected: &str) {
        assert_eq!(
            generated_relpath(unit, DEFAULT_GENERATED_DIR),
            PathBuf::from(expected)
        );
    }

    #[test]
    fn unit_names_from_paths() {
        let gen = DEFAULT_GENERATED_DIR;
        assert_eq!(
            unit_name_from_relpath(Path::new("pkg/util/text.py"), gen),
            Some("pkg.util.text".to_string())
        );
        assert_eq!(
            unit_name_from_relpath(Path::new("pkg/__init__.py"), gen),
            Some("pkg".to_string())
        );
        assert_eq!(unit_name_from_relpath(Path::new("pkg/data.json"), gen), None);
        assert_eq!(
            unit_name_from_relpath(Path::new("pkg/__generated__/text.py"), gen),
            None
        );
    }

    #[test]
    fn relative_modules_resolve_against_package() {
        // `from .sub import x` in unit pkg.specs (package pkg).
        assert_eq!(
            resolve_relative_module("pkg", ".sub"),
            Some("pkg.sub".to_string())
        );
        // `from . import x` in the same unit names the package itself.
        assert_eq!(resolve_relative_module("pkg", "."), Some("pkg".to_string()));
        // Two dots climb one level.
        assert_eq!(
            resolve_relative_module("a.b", "..util"),
            Some("a.util".to_string())
        );
        // Climbing past the root fails.
        assert_eq!(resolve_relative_module("", ".."), None);
        // Absolute modules pass through.
        assert_eq!(
            resolve_relative_module("pkg", "other.mod"),
            Some("other.mod".to_string())
        );
    }

    #[test]
    fn parent_packages() {
        assert_eq!(parent_package("pkg.util.text"), "pkg.util");
        assert_eq!(parent_package("top"), "");
    }

    #[test]
    fn candidates_cover_module_and_package() {
        let [module, package] = candidate_paths(Path::new("/src"), "pkg.util");
        assert_eq!(module, PathBuf::from("/src/pkg/util.py"));
        assert_eq!(package, PathBuf::from("/src/pkg/util/__init__.py"));
    }
}
