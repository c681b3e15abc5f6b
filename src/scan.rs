//! Implicit dependencies discovered by scanning input files.
//!
//! A [`Scanner`] matches a multi-line regular expression against every input
//! whose name ends in one of its suffixes. Each match, or its first capture
//! group when the pattern has one, names another file resolved against the
//! directory of the file that mentions it. Discovered files carrying a
//! scanned suffix are read in turn.
//!
//! ```
//! use simbuild::scan::{ScanRule, Scanner};
//!
//! let scanner = Scanner::compile(&ScanRule::abaqus_input()).expect("pattern");
//! let found = scanner.scan_text("**\n*Include, input=mesh.inp\n*Step\n");
//! assert_eq!(found, vec!["mesh.inp"]);
//! ```

use std::collections::{HashSet, VecDeque};
use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use miette::Diagnostic;
use regex::{Regex, RegexBuilder};
use thiserror::Error;
use tracing::debug;

/// A scanning rule before its pattern is compiled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRule {
    /// Regular expression matched line by line.
    pub pattern: String,
    /// File name endings that select which inputs are read.
    pub suffixes: Vec<String>,
    /// Match without regard to ASCII case.
    pub ignore_case: bool,
}

impl ScanRule {
    /// `*INCLUDE, INPUT=` keywords in Abaqus `.inp` files.
    #[must_use]
    pub fn abaqus_input() -> Self {
        Self {
            pattern: r"^\*INCLUDE,\s*input=(.+)$".to_owned(),
            suffixes: vec![".inp".to_owned()],
            ignore_case: true,
        }
    }

    /// Include, image, figure and bibliography directives in Sphinx sources.
    #[must_use]
    pub fn sphinx() -> Self {
        Self {
            pattern: r"^\s*\.\. (?:include|literalinclude|image|figure|bibliography)::\s*(.+)$"
                .to_owned(),
            suffixes: vec![".rst".to_owned(), ".txt".to_owned()],
            ignore_case: false,
        }
    }

    /// Look up a built-in rule by name.
    #[must_use]
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "abaqus_input" => Some(Self::abaqus_input()),
            "sphinx" => Some(Self::sphinx()),
            _ => None,
        }
    }
}

/// A file could not be read while scanning.
#[derive(Debug, Error, Diagnostic)]
#[error("failed to scan {path}: {source}")]
#[diagnostic(code(simbuild::scan::read))]
pub struct ScanError {
    /// The file being scanned.
    pub path: Utf8PathBuf,
    /// Underlying error.
    #[source]
    pub source: io::Error,
}

/// A compiled [`ScanRule`].
#[derive(Debug, Clone)]
pub struct Scanner {
    rule: ScanRule,
    regex: Regex,
}

impl PartialEq for Scanner {
    fn eq(&self, other: &Self) -> bool {
        self.rule == other.rule
    }
}

impl Scanner {
    /// Compile `rule`.
    ///
    /// # Errors
    ///
    /// Returns [`regex::Error`] when the pattern is not a valid regular
    /// expression.
    pub fn compile(rule: &ScanRule) -> Result<Self, regex::Error> {
        let regex = RegexBuilder::new(&rule.pattern)
            .multi_line(true)
            .case_insensitive(rule.ignore_case)
            .build()?;
        Ok(Self {
            rule: rule.clone(),
            regex,
        })
    }

    /// The rule this scanner was compiled from.
    #[must_use]
    pub const fn rule(&self) -> &ScanRule {
        &self.rule
    }

    /// Whether `path` is read by this scanner.
    #[must_use]
    pub fn applies_to(&self, path: &Utf8Path) -> bool {
        self.rule
            .suffixes
            .iter()
            .any(|suffix| path.as_str().ends_with(suffix.as_str()))
    }

    /// File names mentioned in `text`, trimmed, in order of appearance.
    #[must_use]
    pub fn scan_text(&self, text: &str) -> Vec<String> {
        self.regex
            .captures_iter(text)
            .filter_map(|caps| caps.get(1).or_else(|| caps.get(0)))
            .map(|found| found.as_str().trim())
            .filter(|name| !name.is_empty())
            .map(str::to_owned)
            .collect()
    }

    /// Files reachable from `inputs` through scanned mentions, excluding the
    /// inputs themselves.
    ///
    /// Inputs and mentioned files that do not exist are not read; a missing
    /// mentioned file is still returned so the caller can report it.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError`] when an existing file cannot be read.
    pub fn implicit_inputs<'p, I>(&self, inputs: I) -> Result<Vec<Utf8PathBuf>, ScanError>
    where
        I: IntoIterator<Item = &'p Utf8Path>,
    {
        let declared: Vec<&Utf8Path> = inputs.into_iter().collect();
        let mut queue: VecDeque<Utf8PathBuf> = declared
            .iter()
            .filter(|path| self.applies_to(path))
            .map(|path| path.to_path_buf())
            .collect();
        let mut visited = HashSet::new();
        let mut found: Vec<Utf8PathBuf> = Vec::new();

        while let Some(file) = queue.pop_front() {
            if !visited.insert(file.clone()) {
                continue;
            }
            let bytes = match fs::read(&file) {
                Ok(bytes) => bytes,
                Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                Err(source) => return Err(ScanError { path: file, source }),
            };
            let dir = file.parent().unwrap_or_else(|| Utf8Path::new("."));
            for name in self.scan_text(&String::from_utf8_lossy(&bytes)) {
                let mentioned = dir.join(name);
                if self.applies_to(&mentioned) {
                    queue.push_back(mentioned.clone());
                }
                if !declared.contains(&mentioned.as_path()) && !found.contains(&mentioned) {
                    debug!(scanned = %file, found = %mentioned, "implicit dependency");
                    found.push(mentioned);
                }
            }
        }
        Ok(found)
    }
}
