//! Content fingerprints and task signatures.
//!
//! A task's signature is a SHA-256 digest over everything that determines
//! its outputs: the action kind and templates, the target paths, the
//! parameter values with their types, the resolved paths of its required
//! programs, and each input path with the digest of its content. Every variable-length field is
//! framed with its length so adjacent fields cannot run together.
//!
//! # Examples
//!
//! ```
//! use simbuild::hasher::Fingerprint;
//!
//! let digest = Fingerprint::of_bytes(b"mesh");
//! assert_eq!(digest.as_str().len(), 64);
//! ```

use std::fs::File;
use std::io::{self, Read};

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::ir::{Action, Task};
use crate::locate::ProgramRegistry;

/// Lower-case hex SHA-256 digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Digest an in-memory buffer.
    #[must_use]
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self::from_hasher(Sha256::new_with_prefix(bytes))
    }

    fn from_hasher(hasher: Sha256) -> Self {
        Self(format!("{:x}", hasher.finalize()))
    }

    /// The hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stream `path` through SHA-256.
///
/// # Errors
///
/// Returns any I/O error raised opening or reading the file.
pub fn hash_file(path: &Utf8Path) -> io::Result<Fingerprint> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0_u8; 64 * 1024];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(buffer.get(..read).unwrap_or_default());
    }
    Ok(Fingerprint::from_hasher(hasher))
}

/// Computes task signatures.
pub struct SignatureHasher;

impl SignatureHasher {
    /// Signature of `task` given its resolved programs and the fingerprints
    /// of its inputs, in [`Task::inputs`] order.
    #[must_use]
    pub fn signature(
        task: &Task,
        programs: &ProgramRegistry,
        inputs: &[(Utf8PathBuf, Fingerprint)],
    ) -> Fingerprint {
        let mut hasher = Sha256::new();
        Self::hash_action(&mut hasher, &task.action);

        hasher.update(format!("targets:{}:", task.targets.len()).as_bytes());
        for target in &task.targets {
            Self::update_with_len(&mut hasher, target.as_str().as_bytes());
        }

        let mut params: Vec<_> = task.params.iter().collect();
        params.sort_by(|(a, _), (b, _)| a.cmp(b));
        hasher.update(format!("params:{}:", params.len()).as_bytes());
        for (name, value) in params {
            Self::update_with_len(&mut hasher, name.as_bytes());
            Self::update_with_len(&mut hasher, value.kind().as_bytes());
            Self::update_with_len(&mut hasher, value.to_string().as_bytes());
        }

        hasher.update(format!("programs:{}:", task.required_programs.len()).as_bytes());
        for name in &task.required_programs {
            Self::update_with_len(&mut hasher, name.as_bytes());
            match programs.path(name) {
                Some(path) => {
                    hasher.update(b"1");
                    Self::update_with_len(&mut hasher, path.as_str().as_bytes());
                }
                None => hasher.update(b"0"),
            }
        }

        hasher.update(format!("inputs:{}:", inputs.len()).as_bytes());
        for (path, fingerprint) in inputs {
            Self::update_with_len(&mut hasher, path.as_str().as_bytes());
            Self::update_with_len(&mut hasher, fingerprint.as_str().as_bytes());
        }
        Fingerprint::from_hasher(hasher)
    }

    fn hash_action(hasher: &mut Sha256, action: &Action) {
        Self::update_with_len(hasher, action.kind().as_bytes());
        match action {
            Action::Command { commands } => {
                hasher.update(format!("{}:", commands.len()).as_bytes());
                for template in commands {
                    Self::update_with_len(hasher, template.as_str().as_bytes());
                }
            }
            Action::Copy => {}
            Action::Substitute { prefix, postfix } => {
                Self::update_with_len(hasher, prefix.as_bytes());
                Self::update_with_len(hasher, postfix.as_bytes());
            }
        }
    }

    fn update_with_len(hasher: &mut Sha256, bytes: &[u8]) {
        let len = bytes.len();
        hasher.update(format!("{len}:").as_bytes());
        hasher.update(bytes);
    }
}
