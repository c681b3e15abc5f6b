//! Program availability.
//!
//! Manifests declare each program as a list of candidate executable names.
//! [`ProgramRegistry::resolve`] asks a [`ProgramLocator`] for each candidate in
//! order and keeps the first hit, once per invocation. Planning and signature
//! computation then consult the registry instead of probing again.

mod path;

use std::collections::BTreeSet;

use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use tracing::info;

pub use path::PathLocator;

/// Finds an executable by name.
#[cfg_attr(test, mockall::automock)]
pub trait ProgramLocator: Send + Sync {
    /// Absolute path of `name`, or `None` when it cannot be run.
    fn locate(&self, name: &str) -> Option<Utf8PathBuf>;
}

/// Resolution of one program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramEntry {
    /// Candidate names, in preference order.
    pub candidates: Vec<String>,
    /// The first candidate found, if any.
    pub path: Option<Utf8PathBuf>,
}

/// Resolved programs keyed by their declared name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgramRegistry {
    programs: IndexMap<String, ProgramEntry>,
}

impl ProgramRegistry {
    /// Locate every program any task requires.
    ///
    /// A required program missing from `declared` is looked up under its own
    /// name.
    pub fn resolve<'a, I>(
        declared: &IndexMap<String, Vec<String>>,
        required: I,
        locator: &dyn ProgramLocator,
    ) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let wanted: BTreeSet<&str> = required.into_iter().collect();
        let mut programs = IndexMap::new();
        for name in wanted {
            let candidates = declared
                .get(name)
                .filter(|list| !list.is_empty())
                .cloned()
                .unwrap_or_else(|| vec![name.to_owned()]);
            let path = candidates
                .iter()
                .find_map(|candidate| locator.locate(candidate));
            match &path {
                Some(found) => info!(program = name, path = %found, "program available"),
                None => info!(program = name, ?candidates, "program unavailable"),
            }
            programs.insert(name.to_owned(), ProgramEntry { candidates, path });
        }
        Self { programs }
    }

    /// Whether `name` resolved to an executable.
    #[must_use]
    pub fn is_available(&self, name: &str) -> bool {
        self.path(name).is_some()
    }

    /// Resolved path of `name`.
    #[must_use]
    pub fn path(&self, name: &str) -> Option<&Utf8Path> {
        self.programs
            .get(name)
            .and_then(|entry| entry.path.as_deref())
    }

    /// Text substituted for `${program.NAME}`: the resolved path, or the
    /// first candidate when nothing was found.
    #[must_use]
    pub fn invocation(&self, name: &str) -> String {
        match self.programs.get(name) {
            Some(ProgramEntry {
                path: Some(path), ..
            }) => path.to_string(),
            Some(entry) => entry
                .candidates
                .first()
                .cloned()
                .unwrap_or_else(|| name.to_owned()),
            None => name.to_owned(),
        }
    }

    /// Every resolved program in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ProgramEntry)> {
        self.programs.iter().map(|(name, entry)| (name.as_str(), entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;

    #[test]
    fn first_available_candidate_wins() {
        let mut locator = MockProgramLocator::new();
        locator
            .expect_locate()
            .with(eq("abq2024"))
            .return_const(None);
        locator
            .expect_locate()
            .with(eq("abaqus"))
            .return_const(Some(Utf8PathBuf::from("/opt/abaqus")));
        locator
            .expect_locate()
            .with(eq("cubit"))
            .return_const(None);

        let mut declared = IndexMap::new();
        declared.insert(
            "abaqus".to_owned(),
            vec!["abq2024".to_owned(), "abaqus".to_owned()],
        );
        let registry = ProgramRegistry::resolve(&declared, ["abaqus", "cubit", "abaqus"], &locator);

        assert_eq!(registry.path("abaqus"), Some(Utf8Path::new("/opt/abaqus")));
        assert!(!registry.is_available("cubit"));
        assert_eq!(registry.invocation("abaqus"), "/opt/abaqus");
        assert_eq!(registry.invocation("cubit"), "cubit");
        assert_eq!(registry.iter().count(), 2);
    }

    #[test]
    fn unresolved_program_invokes_first_candidate() {
        let mut locator = MockProgramLocator::new();
        locator.expect_locate().return_const(None);
        let mut declared = IndexMap::new();
        declared.insert("solver".to_owned(), vec!["solve-v2".to_owned(), "solve".to_owned()]);
        let registry = ProgramRegistry::resolve(&declared, ["solver"], &locator);
        assert_eq!(registry.invocation("solver"), "solve-v2");
    }
}
