//! Manifest loading.
//!
//! A `Simbuildfile` is parsed straight into [`SimbuildManifest`] with
//! `serde_saphyr`. After parsing, the format version is checked and any
//! source entry containing glob metacharacters is expanded against the
//! project root. Patterns that match nothing are errors so a typo cannot
//! silently drop inputs from a task.

use camino::{Utf8Path, Utf8PathBuf};
use glob::{MatchOptions, Pattern};
use std::fs;
use tracing::debug;

use crate::ast::{SimbuildManifest, StringOrList};

mod diagnostics;
mod hints;

pub use diagnostics::{ManifestError, ManifestName, ManifestSource, map_yaml_error};

/// Default manifest file name.
pub const MANIFEST_FILE_NAME: &str = "Simbuildfile";

/// Major version of the manifest format this crate reads.
pub const SUPPORTED_MAJOR: u64 = 1;

const GLOB_CHARS: [char; 3] = ['*', '?', '['];

/// Parse manifest text without touching the filesystem.
///
/// Glob expansion is skipped; use [`from_path`] for a manifest on disk.
///
/// # Errors
///
/// Returns [`ManifestError::Parse`] when the YAML is malformed or does not
/// match the schema, and [`ManifestError::UnsupportedVersion`] for a
/// manifest with the wrong major version.
pub fn from_str(yaml: &str) -> Result<SimbuildManifest, ManifestError> {
    parse_named(yaml, &ManifestName::new(MANIFEST_FILE_NAME))
}

fn parse_named(yaml: &str, name: &ManifestName) -> Result<SimbuildManifest, ManifestError> {
    let source = ManifestSource::from(yaml);
    let manifest: SimbuildManifest =
        serde_saphyr::from_str(yaml).map_err(|err| ManifestError::Parse {
            name: name.to_string(),
            source: map_yaml_error(err, &source, name),
        })?;
    if manifest.simbuild_version.major != SUPPORTED_MAJOR {
        return Err(ManifestError::UnsupportedVersion {
            version: manifest.simbuild_version,
        });
    }
    Ok(manifest)
}

/// Load a manifest from `path`, expanding source globs against `root`.
///
/// # Errors
///
/// Returns [`ManifestError`] when the file cannot be read, fails to parse,
/// declares an unsupported version or contains a glob that is invalid or
/// matches nothing.
pub fn from_path(path: &Utf8Path, root: &Utf8Path) -> Result<SimbuildManifest, ManifestError> {
    let data = fs::read_to_string(path).map_err(|source| ManifestError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut manifest = parse_named(&data, &ManifestName::new(path.as_str()))?;
    expand_source_globs(&mut manifest, root)?;
    Ok(manifest)
}

fn is_glob(entry: &str) -> bool {
    entry.contains(GLOB_CHARS)
}

/// Replace glob entries in every task's sources with their sorted matches.
///
/// Matches are files only and are recorded relative to `root` when they sit
/// beneath it.
///
/// # Errors
///
/// Returns [`ManifestError::InvalidGlob`] or [`ManifestError::EmptyGlob`].
pub fn expand_source_globs(
    manifest: &mut SimbuildManifest,
    root: &Utf8Path,
) -> Result<(), ManifestError> {
    for task in &mut manifest.tasks {
        if !task.sources.iter().any(is_glob) {
            continue;
        }
        let mut expanded = Vec::new();
        for entry in task.sources.iter() {
            if is_glob(entry) {
                expanded.extend(glob_paths(entry, root)?);
            } else {
                expanded.push(entry.to_owned());
            }
        }
        task.sources = StringOrList::List(expanded);
    }
    Ok(())
}

/// Expand one pattern against `root`.
///
/// # Errors
///
/// Returns [`ManifestError::InvalidGlob`] for a malformed pattern or an
/// unreadable match and [`ManifestError::EmptyGlob`] when nothing matches.
pub fn glob_paths(pattern: &str, root: &Utf8Path) -> Result<Vec<String>, ManifestError> {
    let opts = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };
    let invalid = |detail: String| ManifestError::InvalidGlob {
        pattern: pattern.to_owned(),
        detail,
    };
    let full = if Utf8Path::new(pattern).is_absolute() {
        pattern.to_owned()
    } else {
        format!("{}/{pattern}", Pattern::escape(root.as_str()))
    };
    let entries = glob::glob_with(&full, opts).map_err(|err| invalid(err.to_string()))?;

    let mut matches = Vec::new();
    for entry in entries {
        let path = entry.map_err(|err| invalid(err.to_string()))?;
        let utf8 = Utf8PathBuf::from_path_buf(path)
            .map_err(|path| invalid(format!("non-UTF-8 match {}", path.display())))?;
        if !utf8.is_file() {
            continue;
        }
        let relative = utf8
            .strip_prefix(root)
            .map_or_else(|_| utf8.clone(), Utf8Path::to_path_buf);
        matches.push(relative.into_string());
    }
    if matches.is_empty() {
        return Err(ManifestError::EmptyGlob {
            pattern: pattern.to_owned(),
        });
    }
    matches.sort();
    debug!(pattern, count = matches.len(), "expanded source glob");
    Ok(matches)
}

#[cfg(test)]
mod tests;
