//! CMake `depend.make` parsing.
//!
//! CMake's Makefile generator writes one `depend.make` per target, listing
//! `object: dependency` pairs. A header that never appears in the
//! compilation database can borrow the flags of any source file compiled
//! into an object that depends on it.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::flags::is_source_file;
use crate::paths;

pub const DEPEND_FILE_NAME: &str = "depend.make";

/// Every `depend.make` under `root`, in sorted order.
pub fn find_depend_files(root: &Path) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && entry.file_name() == DEPEND_FILE_NAME)
        .map(|entry| entry.into_path())
        .collect();
    found.sort();
    found
}

/// Source files compiled into the same objects as `header`, in the order the
/// objects first reference `header`.
///
/// Dependencies are resolved against `cwd`, the directory CMake was run
/// from, not the directory holding the dependency file.
pub fn parse_depend_file(cwd: &Path, content: &str, header: &Path) -> Vec<PathBuf> {
    let header = paths::absolutize(cwd, header);
    let mut objects: Vec<&str> = Vec::new();
    let mut sources: Vec<(&str, PathBuf)> = Vec::new();

    for line in content.lines() {
        if line.trim_start().starts_with('#') {
            continue;
        }
        let parts: Vec<&str> = line.split(':').collect();
        if parts.len() != 2 {
            continue;
        }
        let object = parts[0];
        let dependency = parts[1].trim_matches(|c: char| c == ' ' || c == '\r');
        let dependency = paths::absolutize(cwd, Path::new(dependency));

        if dependency == header {
            objects.push(object);
        } else if is_source_file(&dependency) {
            sources.push((object, dependency));
        }
    }

    let mut out = Vec::new();
    for object in objects {
        out.extend(
            sources
                .iter()
                .filter(|(o, _)| *o == object)
                .map(|(_, s)| s.clone()),
        );
    }
    out
}

fn read_depend_file(cwd: &Path, path: &Path, header: &Path) -> Result<Vec<PathBuf>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(parse_depend_file(cwd, &content, header))
}

/// Candidate source files for `header` from every dependency file under `cwd`.
/// Unreadable dependency files are skipped.
pub fn depend_file_candidates(cwd: &Path, header: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    for path in find_depend_files(cwd) {
        match read_depend_file(cwd, &path, header) {
            Ok(found) => {
                debug!(file = %path.display(), candidates = found.len(), "scanned dependency file");
                out.extend(found);
            }
            Err(e) => warn!("skipping dependency file: {:#}", e),
        }
    }
    out
}
