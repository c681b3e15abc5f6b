//! Restore `PATH` after tests mutate it.
//!
//! The guard holds the original value and resets the variable on drop so
//! tests do not pollute global state, even when they panic.

use camino::Utf8Path;
use std::ffi::OsString;

use crate::env_lock::EnvLock;

/// Guard that restores `PATH` to its original value when dropped.
#[derive(Debug)]
pub struct PathGuard {
    original: Option<OsString>,
}

impl PathGuard {
    /// Put `dir` in front of the current `PATH` until the guard drops.
    ///
    /// # Panics
    ///
    /// Panics if the joined `PATH` cannot be represented.
    #[must_use]
    pub fn prepend(dir: &Utf8Path) -> Self {
        let _lock = EnvLock::acquire();
        let original = std::env::var_os("PATH");
        let mut entries = vec![dir.as_std_path().to_path_buf()];
        if let Some(current) = &original {
            entries.extend(std::env::split_paths(current));
        }
        let joined = std::env::join_paths(entries).expect("join PATH");
        // Mutating the environment is unsafe in Rust 2024; the lock
        // serialises it with other guards.
        unsafe { std::env::set_var("PATH", joined) };
        Self { original }
    }

    /// Replace `PATH` with exactly `dir` until the guard drops.
    #[must_use]
    pub fn only(dir: &Utf8Path) -> Self {
        let _lock = EnvLock::acquire();
        let original = std::env::var_os("PATH");
        unsafe { std::env::set_var("PATH", dir.as_std_path()) };
        Self { original }
    }
}

impl Drop for PathGuard {
    fn drop(&mut self) {
        let _lock = EnvLock::acquire();
        match self.original.take() {
            Some(path) => unsafe { std::env::set_var("PATH", path) },
            None => unsafe { std::env::remove_var("PATH") },
        }
    }
}
