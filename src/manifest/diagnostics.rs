//! Translates manifest failures into actionable diagnostics.
//!
//! [`ManifestSource`] retains the YAML text and [`ManifestName`] labels its
//! origin so [`map_yaml_error`] can attach a source span and a hint for common
//! mistakes such as tab indentation.
//
// Module-level suppression for version-dependent lint false positives from
// miette/thiserror derive macros. FIXME(rust-lang/rust#130021): remove once
// upstream is fixed.
#![allow(
    clippy::allow_attributes,
    clippy::allow_attributes_without_reason,
    unused_assignments
)]

use camino::Utf8PathBuf;
use miette::{Diagnostic, NamedSource, SourceSpan};
use semver::Version;
use serde_saphyr::{Error as YamlError, Location};
use thiserror::Error;

use super::hints::YAML_HINTS;

/// YAML source content for a manifest.
///
/// # Examples
/// ```rust
/// use simbuild::manifest::ManifestSource;
/// let source = ManifestSource::from("tasks: []");
/// assert_eq!(source.as_str(), "tasks: []");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestSource(String);

impl ManifestSource {
    /// Wrap manifest text.
    #[must_use]
    pub fn new(src: impl Into<String>) -> Self {
        Self(src.into())
    }

    /// The manifest text.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for ManifestSource {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl AsRef<str> for ManifestSource {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

/// Display name for a manifest used in diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestName(String);

impl ManifestName {
    /// Label a manifest.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The label.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for ManifestName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl AsRef<str> for ManifestName {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Display for ManifestName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0.as_str())
    }
}

/// Errors raised while loading a manifest.
#[derive(Debug, Error, Diagnostic)]
pub enum ManifestError {
    /// The manifest file could not be read.
    #[error("failed to read manifest {path}")]
    #[diagnostic(code(simbuild::manifest::read))]
    Read {
        /// Manifest path.
        path: Utf8PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The YAML did not parse into a manifest.
    #[error("failed to parse manifest {name}")]
    #[diagnostic(code(simbuild::manifest::parse))]
    Parse {
        /// Manifest label.
        name: String,
        /// Parser diagnostic with span and hint.
        #[source]
        #[diagnostic_source]
        source: Box<dyn Diagnostic + Send + Sync + 'static>,
    },
    /// The manifest format version is not supported.
    #[error("unsupported simbuild_version {version}")]
    #[diagnostic(
        code(simbuild::manifest::version),
        help("this build of simbuild reads manifests with major version 1")
    )]
    UnsupportedVersion {
        /// Declared version.
        version: Version,
    },
    /// A source glob pattern is malformed.
    #[error("invalid glob pattern '{pattern}': {detail}")]
    #[diagnostic(code(simbuild::manifest::glob))]
    InvalidGlob {
        /// Pattern as declared.
        pattern: String,
        /// Why the pattern was rejected.
        detail: String,
    },
    /// A source glob pattern matched no files.
    #[error("glob pattern '{pattern}' matched no files")]
    #[diagnostic(
        code(simbuild::manifest::empty_glob),
        help("glob patterns are matched against the project root")
    )]
    EmptyGlob {
        /// Pattern as declared.
        pattern: String,
    },
}

/// Reconstruct the byte offset for a `serde_saphyr::Location`, tolerating
/// `\r\n` line endings and clamping columns past the end of the line.
fn byte_index(src: &str, line: u64, column: u64) -> usize {
    let target_line = usize::try_from(line.saturating_sub(1)).unwrap_or(usize::MAX);
    let target_column = usize::try_from(column.saturating_sub(1)).unwrap_or(usize::MAX);
    let mut offset = 0usize;
    for (idx, segment) in src.split_inclusive('\n').enumerate() {
        if idx == target_line {
            let without_newline = segment.strip_suffix('\n').unwrap_or(segment);
            let cleaned = without_newline.strip_suffix('\r').unwrap_or(without_newline);
            let column_offset = cleaned
                .char_indices()
                .nth(target_column)
                .map_or(cleaned.len(), |(byte_idx, _)| byte_idx);
            return offset + column_offset;
        }
        offset += segment.len();
    }
    src.len()
}

fn to_span(src: &ManifestSource, loc: Location) -> SourceSpan {
    let at = byte_index(src.as_str(), loc.line(), loc.column());
    let bytes = src.as_str().as_bytes();
    let is_line_break = |b: u8| b == b'\n' || b == b'\r';
    let (start, end) = match bytes.get(at) {
        Some(&b) if !is_line_break(b) => (at, at + 1),
        _ => {
            let start = if at > 0 && bytes.get(at - 1).is_some_and(|p| !is_line_break(*p)) {
                at - 1
            } else {
                at
            };
            (start, at)
        }
    };
    SourceSpan::new(start.into(), end.saturating_sub(start))
}

#[derive(Debug, Error, Diagnostic)]
#[error("{message}")]
#[diagnostic(code(simbuild::yaml::parse))]
struct YamlDiagnostic {
    #[source_code]
    src: NamedSource<String>,
    #[label("parse error here")]
    span: Option<SourceSpan>,
    #[help]
    help: Option<String>,
    #[source]
    source: YamlError,
    message: String,
}

fn has_tab_indent(src: &ManifestSource, location: Option<Location>) -> bool {
    let Some(loc) = location else {
        return false;
    };
    let line_idx = usize::try_from(loc.line().saturating_sub(1)).unwrap_or(usize::MAX);
    let line = src.as_str().lines().nth(line_idx).unwrap_or("");
    line.chars()
        .take_while(|c| c.is_whitespace())
        .any(|c| c == '\t')
}

fn hint_for(err_str: &str, src: &ManifestSource, loc: Option<Location>) -> Option<String> {
    if has_tab_indent(src, loc) {
        return Some("Use spaces for indentation; tabs are invalid in YAML.".into());
    }
    let lower = err_str.to_lowercase();
    YAML_HINTS
        .iter()
        .find(|(needle, _)| lower.contains(&needle.to_lowercase()))
        .map(|(_, hint)| (*hint).into())
}

/// Map a `serde_saphyr` error into a [`miette`] diagnostic carrying the
/// offending span and, where one applies, a hint.
#[must_use]
pub fn map_yaml_error(
    err: YamlError,
    src: &ManifestSource,
    name: &ManifestName,
) -> Box<dyn Diagnostic + Send + Sync + 'static> {
    let loc = err.location();
    let (line, col, span) = loc.map_or((1, 1, None), |l| {
        (l.line(), l.column(), Some(to_span(src, l)))
    });
    let err_str = err.to_string();
    let hint = hint_for(&err_str, src, loc);
    let message = format!("YAML error at line {line}, column {col}: {err_str}");

    Box::new(YamlDiagnostic {
        src: NamedSource::new(name.as_str(), src.as_str().to_owned()),
        span,
        help: hint,
        source: err,
        message,
    })
}
