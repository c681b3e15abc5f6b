//! Helpers for constructing manifest fixtures in tests.

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// Prefix the provided manifest body with the supported version header.
#[must_use]
pub fn manifest_yaml(body: &str) -> String {
    format!("simbuild_version: \"1.0.0\"\n{body}")
}

/// Write `body` (with the version header) to `root/Simbuildfile`.
///
/// # Errors
///
/// Returns an error when the file cannot be written.
pub fn write_manifest(root: &Utf8Path, body: &str) -> Result<Utf8PathBuf> {
    let path = root.join("Simbuildfile");
    fs::write(&path, manifest_yaml(body)).with_context(|| format!("write manifest {path}"))?;
    Ok(path)
}
