//! `PATH` lookup with an LRU cache to avoid repeat filesystem scans.

use std::ffi::OsString;
use std::fs;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};

use camino::{Utf8Path, Utf8PathBuf};
use lru::LruCache;
use tracing::{debug, warn};

use super::ProgramLocator;

const CACHE_CAPACITY: NonZeroUsize = match NonZeroUsize::new(64) {
    Some(capacity) => capacity,
    None => NonZeroUsize::MIN,
};

/// Locates executables on a captured search path.
#[derive(Debug)]
pub struct PathLocator {
    cwd: Utf8PathBuf,
    dirs: Vec<Utf8PathBuf>,
    cache: Mutex<LruCache<String, Option<Utf8PathBuf>>>,
}

impl PathLocator {
    /// Capture `PATH` and resolve relative entries against `cwd`.
    #[must_use]
    pub fn from_env(cwd: &Utf8Path) -> Self {
        Self::with_search_path(std::env::var_os("PATH"), cwd)
    }

    /// Search an explicit list of directories.
    #[must_use]
    pub fn with_search_path(raw: Option<OsString>, cwd: &Utf8Path) -> Self {
        Self {
            cwd: cwd.to_path_buf(),
            dirs: parse_path_entries(raw, cwd),
            cache: Mutex::new(LruCache::new(CACHE_CAPACITY)),
        }
    }

    /// Directories searched, in order.
    #[must_use]
    pub fn dirs(&self) -> &[Utf8PathBuf] {
        &self.dirs
    }

    fn lock_cache(&self) -> MutexGuard<'_, LruCache<String, Option<Utf8PathBuf>>> {
        match self.cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lookup(&self, command: &str) -> Option<Utf8PathBuf> {
        if is_direct_path(command) {
            let raw = Utf8Path::new(command);
            let resolved = if raw.is_absolute() {
                raw.to_path_buf()
            } else {
                self.cwd.join(raw)
            };
            return is_executable(&resolved).then_some(resolved);
        }
        self.dirs
            .iter()
            .map(|dir| dir.join(command))
            .find(|candidate| is_executable(candidate))
    }
}

impl ProgramLocator for PathLocator {
    fn locate(&self, name: &str) -> Option<Utf8PathBuf> {
        if let Some(cached) = self.lock_cache().get(name) {
            return cached.clone();
        }
        let found = self.lookup(name);
        debug!(program = name, found = ?found, "located program");
        self.lock_cache().put(name.to_owned(), found.clone());
        found
    }
}

fn parse_path_entries(raw: Option<OsString>, cwd: &Utf8Path) -> Vec<Utf8PathBuf> {
    let Some(raw_value) = raw else {
        return Vec::new();
    };
    let mut entries = Vec::new();
    for (index, component) in std::env::split_paths(&raw_value).enumerate() {
        if component.as_os_str().is_empty() {
            entries.push(cwd.to_path_buf());
            continue;
        }
        let Ok(utf8) = Utf8PathBuf::from_path_buf(component) else {
            warn!(index, "skipping PATH entry with non-UTF-8 characters");
            continue;
        };
        entries.push(if utf8.is_absolute() {
            utf8
        } else {
            cwd.join(utf8)
        });
    }
    entries
}

fn is_direct_path(command: &str) -> bool {
    #[cfg(windows)]
    {
        command.contains(['\\', '/', ':'])
    }
    #[cfg(not(windows))]
    {
        command.contains('/')
    }
}

fn is_executable(path: &Utf8Path) -> bool {
    fs::metadata(path.as_std_path())
        .is_ok_and(|metadata| metadata.is_file() && has_execute_permission(&metadata))
}

#[cfg(unix)]
fn has_execute_permission(metadata: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn has_execute_permission(metadata: &fs::Metadata) -> bool {
    metadata.is_file()
}
