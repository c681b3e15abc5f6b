//! Decides whether a task must run.

use std::collections::BTreeSet;
use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use crate::hasher::{Fingerprint, hash_file};
use crate::ir::{BuildGraph, Task, TaskId};
use crate::state::SignatureStore;

/// Why a task is stale, or that it is not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Staleness {
    /// Every target matches its record.
    UpToDate,
    /// A target does not exist.
    MissingTarget(Utf8PathBuf),
    /// A target has no record from a previous run.
    NoRecord(Utf8PathBuf),
    /// The task signature differs from the recorded one.
    SignatureChanged(Utf8PathBuf),
    /// The target content differs from what was recorded.
    TargetModified(Utf8PathBuf),
    /// A task producing one of the inputs ran in this invocation.
    UpstreamRebuilt,
}

impl Staleness {
    /// Whether the task must run.
    #[must_use]
    pub const fn is_stale(&self) -> bool {
        !matches!(self, Self::UpToDate)
    }
}

impl fmt::Display for Staleness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UpToDate => f.write_str("up to date"),
            Self::MissingTarget(path) => write!(f, "target {path} is missing"),
            Self::NoRecord(path) => write!(f, "target {path} has no build record"),
            Self::SignatureChanged(path) => write!(f, "inputs of {path} changed"),
            Self::TargetModified(path) => write!(f, "target {path} was modified"),
            Self::UpstreamRebuilt => f.write_str("an upstream task was rebuilt"),
        }
    }
}

/// Compares tasks against the persisted records.
pub struct StalenessResolver<'a> {
    store: &'a SignatureStore,
}

impl<'a> StalenessResolver<'a> {
    /// Resolve against `store`.
    #[must_use]
    pub const fn new(store: &'a SignatureStore) -> Self {
        Self { store }
    }

    /// Check `task` whose current signature is `signature`.
    #[must_use]
    pub fn check(&self, task: &Task, signature: &Fingerprint, upstream_rebuilt: bool) -> Staleness {
        let verdict = self.compare(task, Some(signature), upstream_rebuilt);
        debug!(task = %task.label, %verdict, "staleness");
        verdict
    }

    /// Convenience wrapper around [`Self::check`].
    #[must_use]
    pub fn is_stale(&self, task: &Task, signature: &Fingerprint, upstream_rebuilt: bool) -> bool {
        self.check(task, signature, upstream_rebuilt).is_stale()
    }

    fn compare(
        &self,
        task: &Task,
        signature: Option<&Fingerprint>,
        upstream_rebuilt: bool,
    ) -> Staleness {
        for target in &task.targets {
            if !target.exists() {
                return Staleness::MissingTarget(target.clone());
            }
            let Some(record) = self.store.get(target) else {
                return Staleness::NoRecord(target.clone());
            };
            if signature.is_some_and(|sig| *sig != record.signature) {
                return Staleness::SignatureChanged(target.clone());
            }
            if !content_matches(target, &record.content) {
                return Staleness::TargetModified(target.clone());
            }
        }
        if upstream_rebuilt {
            return Staleness::UpstreamRebuilt;
        }
        Staleness::UpToDate
    }

    /// Predict which tasks in `order` would run, without executing anything.
    ///
    /// Signatures that depend on not-yet-built inputs cannot be computed, so
    /// `signature` returns `None` for them and only target presence, records
    /// and upstream predictions are consulted.
    pub fn predict<F>(&self, graph: &BuildGraph, order: &[TaskId], mut signature: F) -> Vec<(TaskId, Staleness)>
    where
        F: FnMut(&Task) -> Option<Fingerprint>,
    {
        let mut stale: BTreeSet<TaskId> = BTreeSet::new();
        let mut out = Vec::with_capacity(order.len());
        for &id in order {
            let Some(task) = graph.task(id) else {
                continue;
            };
            let upstream = graph.upstream(id).iter().any(|up| stale.contains(up));
            let sig = if upstream { None } else { signature(task) };
            let verdict = self.compare(task, sig.as_ref(), upstream);
            if verdict.is_stale() {
                stale.insert(id);
            }
            out.push((id, verdict));
        }
        out
    }
}

fn content_matches(target: &Utf8Path, recorded: &Fingerprint) -> bool {
    hash_file(target).is_ok_and(|actual| actual == *recorded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Action, TaskId};
    use crate::params::Parameters;
    use crate::state::TargetRecord;
    use std::fs;
    use tempfile::TempDir;
    use time::OffsetDateTime;

    struct Fixture {
        _dir: TempDir,
        target: Utf8PathBuf,
        store: SignatureStore,
        task: Task,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().expect("tmp");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8");
        let target = root.join("out.txt");
        let store = SignatureStore::open(root.join("state.json"));
        let task = Task {
            id: TaskId(0),
            label: "out.txt".into(),
            targets: vec![target.clone()],
            sources: Vec::new(),
            depends: Vec::new(),
            action: Action::Copy,
            params: Parameters::new(),
            required_programs: BTreeSet::new(),
            documentation: false,
            description: None,
            stdout_target: None,
            scanner: None,
        };
        Fixture {
            _dir: dir,
            target,
            store,
            task,
        }
    }

    fn built(fx: &mut Fixture, signature: &Fingerprint) {
        fs::write(&fx.target, "data").expect("write");
        fx.store.record(
            fx.target.clone(),
            TargetRecord {
                signature: signature.clone(),
                content: hash_file(&fx.target).expect("hash"),
                built_at: OffsetDateTime::UNIX_EPOCH,
            },
        );
    }

    #[test]
    fn missing_target_is_stale() {
        let fx = fixture();
        let sig = Fingerprint::of_bytes(b"s");
        let verdict = StalenessResolver::new(&fx.store).check(&fx.task, &sig, false);
        assert_eq!(verdict, Staleness::MissingTarget(fx.target.clone()));
    }

    #[test]
    fn unrecorded_target_is_stale() {
        let fx = fixture();
        fs::write(&fx.target, "data").expect("write");
        let sig = Fingerprint::of_bytes(b"s");
        let verdict = StalenessResolver::new(&fx.store).check(&fx.task, &sig, false);
        assert_eq!(verdict, Staleness::NoRecord(fx.target.clone()));
    }

    #[test]
    fn matching_record_is_up_to_date_unless_upstream_rebuilt() {
        let mut fx = fixture();
        let sig = Fingerprint::of_bytes(b"s");
        built(&mut fx, &sig);
        let resolver = StalenessResolver::new(&fx.store);
        assert!(!resolver.is_stale(&fx.task, &sig, false));
        assert_eq!(resolver.check(&fx.task, &sig, true), Staleness::UpstreamRebuilt);
    }

    #[test]
    fn changed_signature_is_stale() {
        let mut fx = fixture();
        built(&mut fx, &Fingerprint::of_bytes(b"old"));
        let verdict =
            StalenessResolver::new(&fx.store).check(&fx.task, &Fingerprint::of_bytes(b"new"), false);
        assert_eq!(verdict, Staleness::SignatureChanged(fx.target.clone()));
    }

    #[test]
    fn externally_modified_target_is_stale() {
        let mut fx = fixture();
        let sig = Fingerprint::of_bytes(b"s");
        built(&mut fx, &sig);
        fs::write(&fx.target, "tampered").expect("write");
        let verdict = StalenessResolver::new(&fx.store).check(&fx.task, &sig, false);
        assert_eq!(verdict, Staleness::TargetModified(fx.target.clone()));
    }
}
