//! Generated-artifact writing.
//!
//! Artifacts are written atomically (temp file in the target directory,
//! fsync, rename) so a crash mid-build never leaves a half-written module
//! that a later staleness check could mistake for current. Package
//! `__init__.py` files are created along the way so the generated tree is
//! importable, and an `AGENTS.md` marker lands in each generated dir root
//! telling coding agents not to touch the contents.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use farcast_core::paths::generated_relpath;

/// Marker file placed at the root of every generated directory.
pub const AGENT_DOCS_FILE: &str = "AGENTS.md";

const AGENT_DOCS_TEXT: &str = "\
# Generated code

Everything in this directory is generated by farcast from spec
declarations. Do not edit these files; change the specs and rebuild.
";

/// Write one generated unit under its root. Returns the artifact path.
pub fn write_generated_unit(
    root: &Path,
    generated_dir: &str,
    unit: &str,
    header: &str,
    source: &str,
) -> std::io::Result<PathBuf> {
    let relpath = generated_relpath(unit, generated_dir);
    let out_path = root.join(&relpath);
    if let Some(parent) = out_path.parent() {
        fs::create_dir_all(parent)?;
    }
    ensure_init_files(root, &relpath);
    ensure_agent_docs(&out_path, generated_dir);

    let content = format!("{header}\n{}\n", source.trim_end());
    let temp = out_path.with_file_name(format!(
        ".farcast-tmp-{}",
        out_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unit.py")
    ));
    {
        let mut file = fs::File::create(&temp)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
    }
    match fs::rename(&temp, &out_path) {
        Ok(()) => Ok(out_path),
        Err(err) => {
            let _ = fs::remove_file(&temp);
            Err(err)
        }
    }
}

/// Read a unit's previously generated source, if any.
pub fn read_generated_unit(root: &Path, generated_dir: &str, unit: &str) -> Option<String> {
    let path = root.join(generated_relpath(unit, generated_dir));
    fs::read_to_string(path).ok()
}

/// Ensure every directory along the artifact's relative path carries an
/// `__init__.py`, so the generated modules import cleanly.
fn ensure_init_files(root: &Path, relpath: &Path) {
    let mut dir = root.to_path_buf();
    for component in relpath.parent().into_iter().flat_map(|p| p.components()) {
        dir.push(component);
        let init = dir.join("__init__.py");
        if !init.exists() {
            let _ = fs::write(&init, "");
        }
    }
}

/// Drop the agent-docs marker into the generated dir root above the
/// artifact.
fn ensure_agent_docs(out_path: &Path, generated_dir: &str) {
    for ancestor in out_path.ancestors() {
        if ancestor.file_name().and_then(|n| n.to_str()) == Some(generated_dir) {
            let docs = ancestor.join(AGENT_DOCS_FILE);
            if !docs.exists() {
                let _ = fs::write(&docs, AGENT_DOCS_TEXT);
            }
            break;
        }
    }
}
