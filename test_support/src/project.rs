//! A throwaway project directory with a UTF-8 root.

use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use tempfile::TempDir;

/// Temporary project root removed on drop.
#[derive(Debug)]
pub struct Project {
    _dir: TempDir,
    root: Utf8PathBuf,
    bin: Utf8PathBuf,
}

impl Project {
    /// Create an empty project with a `bin/` directory for program stubs.
    ///
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created or is not UTF-8.
    #[must_use]
    pub fn new() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 temp dir");
        let bin = root.join("bin");
        fs::create_dir_all(&bin).expect("create bin dir");
        Self {
            _dir: dir,
            root,
            bin,
        }
    }

    /// Project root.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Directory for program stubs.
    #[must_use]
    pub fn bin(&self) -> &Utf8Path {
        &self.bin
    }

    /// Write `contents` to `relative`, creating parent directories.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be written.
    pub fn write(&self, relative: &str, contents: &str) -> Utf8PathBuf {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dir");
        }
        fs::write(&path, contents).expect("write project file");
        path
    }

    /// Read `relative` as text.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be read.
    #[must_use]
    pub fn read(&self, relative: &str) -> String {
        fs::read_to_string(self.root.join(relative)).expect("read project file")
    }
}

impl Default for Project {
    fn default() -> Self {
        Self::new()
    }
}
