//! Error types for the runner module.

// Scoped suppression for version-dependent lint false positives from
// miette/thiserror derive macros.
// FIXME(rust-lang/rust#130021): remove once upstream is fixed.
#![allow(
    clippy::allow_attributes,
    clippy::allow_attributes_without_reason,
    unused_assignments
)]

use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

/// Errors raised during command execution.
#[derive(Debug, Error, Diagnostic)]
pub enum RunnerError {
    /// The manifest file does not exist at the expected path.
    #[error("no {manifest_name} found in {directory}")]
    #[diagnostic(
        code(simbuild::runner::manifest_not_found),
        help("create a {manifest_name}, pass -f FILE or run from the project root with -C DIR")
    )]
    ManifestNotFound {
        /// Expected manifest file name.
        manifest_name: String,
        /// Directory that was searched.
        directory: String,
        /// The path that was attempted.
        path: Utf8PathBuf,
    },
    /// A path given on the command line is not valid UTF-8.
    #[error("path is not valid UTF-8: {path}")]
    #[diagnostic(code(simbuild::runner::non_utf8_path))]
    NonUtf8Path {
        /// Lossy rendering of the path.
        path: String,
    },
    /// One or more tasks failed or the build was interrupted.
    #[error("build failed: {summary}")]
    #[diagnostic(code(simbuild::runner::build_failed))]
    BuildFailed {
        /// Per-status task counts.
        summary: String,
    },
}
