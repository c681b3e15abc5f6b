//! Persisted per-target signature records.
//!
//! The store is the only state that survives between invocations. It lives
//! at `<build dir>/.simbuild-state.json` and maps each target path to the
//! signature of the task that last built it, the content digest of the file
//! written, and when it was built.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};

use camino::{Utf8Path, Utf8PathBuf};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::hasher::Fingerprint;

const FORMAT_VERSION: u32 = 1;

/// Record kept for one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRecord {
    /// Signature of the producing task when the target was written.
    pub signature: Fingerprint,
    /// Digest of the target content.
    pub content: Fingerprint,
    /// When the target was written.
    #[serde(with = "time::serde::rfc3339")]
    pub built_at: OffsetDateTime,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    version: u32,
    targets: BTreeMap<Utf8PathBuf, TargetRecord>,
}

/// Errors saving the store.
#[derive(Debug, Error, Diagnostic)]
pub enum StateError {
    /// Writing the state file failed.
    #[error("failed to write build state to {path}")]
    #[diagnostic(code(simbuild::state::write))]
    Write {
        /// State file path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// Encoding the records failed.
    #[error("failed to encode build state")]
    #[diagnostic(code(simbuild::state::encode))]
    Encode(#[from] serde_json::Error),
}

/// In-memory view of the state file.
#[derive(Debug)]
pub struct SignatureStore {
    path: Utf8PathBuf,
    records: BTreeMap<Utf8PathBuf, TargetRecord>,
    dirty: bool,
}

impl SignatureStore {
    /// Load the records at `path`.
    ///
    /// A missing file yields an empty store. An unreadable or corrupt file is
    /// logged and replaced by an empty store, which makes every task stale.
    #[must_use]
    pub fn open(path: impl Into<Utf8PathBuf>) -> Self {
        let state_path = path.into();
        let records = match fs::read_to_string(&state_path) {
            Ok(text) => match serde_json::from_str::<StateFile>(&text) {
                Ok(file) if file.version == FORMAT_VERSION => file.targets,
                Ok(file) => {
                    warn!(path = %state_path, version = file.version, "ignoring build state with unknown version");
                    BTreeMap::new()
                }
                Err(err) => {
                    warn!(path = %state_path, error = %err, "ignoring corrupt build state");
                    BTreeMap::new()
                }
            },
            Err(err) if err.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => {
                warn!(path = %state_path, error = %err, "ignoring unreadable build state");
                BTreeMap::new()
            }
        };
        debug!(path = %state_path, records = records.len(), "loaded build state");
        Self {
            path: state_path,
            records,
            dirty: false,
        }
    }

    /// Location of the backing file.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Record for `target`, if any.
    #[must_use]
    pub fn get(&self, target: &Utf8Path) -> Option<&TargetRecord> {
        self.records.get(target)
    }

    /// Replace the record for `target`.
    pub fn record(&mut self, target: Utf8PathBuf, record: TargetRecord) {
        self.records.insert(target, record);
        self.dirty = true;
    }

    /// Drop the record for `target`.
    pub fn forget(&mut self, target: &Utf8Path) {
        if self.records.remove(target).is_some() {
            self.dirty = true;
        }
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no records are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Write the records atomically if anything changed.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] when the file cannot be encoded or written.
    pub fn save(&mut self) -> Result<(), StateError> {
        if !self.dirty {
            return Ok(());
        }
        let file = StateFile {
            version: FORMAT_VERSION,
            targets: self.records.clone(),
        };
        let json = serde_json::to_vec_pretty(&file)?;
        let write_err = |source| StateError::Write {
            path: self.path.clone(),
            source,
        };
        let dir = self
            .path
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .unwrap_or_else(|| Utf8Path::new("."));
        fs::create_dir_all(dir).map_err(write_err)?;
        let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
        tmp.write_all(&json).map_err(write_err)?;
        tmp.persist(&self.path).map_err(|err| write_err(err.error))?;
        self.dirty = false;
        debug!(path = %self.path, records = self.records.len(), "saved build state");
        Ok(())
    }
}
