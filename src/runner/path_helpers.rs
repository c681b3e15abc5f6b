//! Path resolution helpers for the runner module.
//!
//! Centralises project root and manifest path logic so the main runner
//! module stays focused on command dispatch.

use camino::{Utf8Path, Utf8PathBuf};
use std::path::Path;

use super::RunnerError;

fn utf8(path: &Path) -> Result<Utf8PathBuf, RunnerError> {
    Utf8PathBuf::from_path_buf(path.to_path_buf()).map_err(|invalid| RunnerError::NonUtf8Path {
        path: invalid.display().to_string(),
    })
}

/// Resolve the project root: `-C DIR` against the current directory, or the
/// current directory itself. The result is absolute so rendered commands
/// work from any working directory.
pub(super) fn resolve_project_root(
    directory: Option<&Path>,
    cwd: &Path,
) -> Result<Utf8PathBuf, RunnerError> {
    let base = utf8(cwd)?;
    let Some(dir) = directory else {
        return Ok(base);
    };
    let requested = utf8(dir)?;
    Ok(if requested.is_absolute() {
        requested
    } else {
        base.join(requested)
    })
}

/// Resolve the manifest path against the project root.
pub(super) fn resolve_manifest_path(
    file: &Path,
    root: &Utf8Path,
) -> Result<Utf8PathBuf, RunnerError> {
    let manifest = utf8(file)?;
    Ok(if manifest.is_absolute() {
        manifest
    } else {
        root.join(manifest)
    })
}

pub(super) fn ensure_manifest_exists(path: &Utf8Path) -> Result<(), RunnerError> {
    if path.is_file() {
        return Ok(());
    }
    Err(RunnerError::ManifestNotFound {
        manifest_name: path.file_name().unwrap_or(path.as_str()).to_owned(),
        directory: path
            .parent()
            .map_or_else(|| ".".to_owned(), ToString::to_string),
        path: path.to_path_buf(),
    })
}
