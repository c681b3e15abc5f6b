//! Helpers for creating executable stubs in tests.
//!
//! Stubs are tiny shell scripts marked executable so tests can exercise
//! program probing and task commands without real simulation tools. Callers
//! own the containing directory's lifetime to keep the stub on disk.
//!
//! # Examples
//!
//! ```rust
//! use camino::Utf8Path;
//! use tempfile::TempDir;
//! use test_support::fake_program;
//!
//! let temp = TempDir::new().expect("tempdir");
//! let root = Utf8Path::from_path(temp.path()).expect("utf8 path");
//! let path = fake_program(root, "abaqus", "exit 0").expect("stub executable");
//! assert!(path.exists());
//! ```

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// Write an executable named `name` inside `dir` whose body is `script`.
///
/// # Errors
///
/// Returns an error when the file cannot be written or made executable.
pub fn fake_program(dir: &Utf8Path, name: &str, script: &str) -> Result<Utf8PathBuf> {
    let path = dir.join(name);
    fs::write(path.as_std_path(), format!("#!/bin/sh\n{script}\n"))
        .with_context(|| format!("write program stub {name}"))?;
    make_executable(&path)?;
    Ok(path)
}

/// Write a program that appends its arguments to `log` and then runs `script`.
///
/// # Errors
///
/// Returns an error when the stub cannot be created.
pub fn recording_program(
    dir: &Utf8Path,
    name: &str,
    log: &Utf8Path,
    script: &str,
) -> Result<Utf8PathBuf> {
    let body = format!("echo \"{name} $*\" >> '{log}'\n{script}");
    fake_program(dir, name, &body)
}

/// Mark an existing file as executable on Unix; no-op elsewhere.
///
/// # Errors
///
/// Returns an error when the permissions cannot be read or updated.
pub fn make_executable(path: &Utf8Path) -> Result<()> {
    #[cfg(unix)]
    {
        let mut perms = fs::metadata(path.as_std_path())
            .context("stat program stub")?
            .permissions();
        perms.set_mode(0o755);
        fs::set_permissions(path.as_std_path(), perms).context("chmod program stub")?;
    }

    #[cfg(not(unix))]
    let _ = path;

    Ok(())
}
