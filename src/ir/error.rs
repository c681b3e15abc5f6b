//! Errors raised while building the task graph or resolving requested names.

// The unused_assignments lint fires on miette/thiserror derive expansion in
// some Rust versions only, so `#[expect]` cannot be used here.
// FIXME(rust-lang/rust#130021): remove once upstream is fixed.
#![allow(
    clippy::allow_attributes,
    clippy::allow_attributes_without_reason,
    unused_assignments
)]

use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

use super::template::TemplateError;

/// Fatal errors in task registration, graph finalisation or planning.
#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    /// A task declared no targets.
    #[error("task #{index} declares no targets")]
    #[diagnostic(code(simbuild::graph::empty_targets))]
    EmptyTargets {
        /// Zero-based registration index.
        index: usize,
    },

    /// Two tasks claim the same output file.
    #[error("target '{target}' is already produced by task '{producer}'")]
    #[diagnostic(
        code(simbuild::graph::duplicate_target),
        help("every file may be produced by at most one task")
    )]
    DuplicateTarget {
        /// The contested target path.
        target: Utf8PathBuf,
        /// Label of the task that registered it first.
        producer: String,
    },

    /// A template placeholder has no matching parameter.
    #[error("task '{task}' references parameter '{name}' which is not defined")]
    #[diagnostic(code(simbuild::graph::missing_parameter))]
    MissingParameter {
        /// Task label.
        task: String,
        /// Parameter name.
        name: String,
    },

    /// A parameter is never referenced by the action.
    #[error("task '{task}' defines parameter '{name}' which its action never uses")]
    #[diagnostic(
        code(simbuild::graph::unused_parameter),
        help("remove the parameter or reference it as ${{{name}}}")
    )]
    UnusedParameter {
        /// Task label.
        task: String,
        /// Parameter name.
        name: String,
    },

    /// `${program.NAME}` names a program the task does not require.
    #[error("task '{task}' uses program '{program}' without listing it in requires")]
    #[diagnostic(code(simbuild::graph::unknown_program))]
    UnknownProgram {
        /// Task label.
        task: String,
        /// Program name.
        program: String,
    },

    /// The action reads `${SOURCE}` but the task has no sources.
    #[error("task '{task}' references its sources but declares none")]
    #[diagnostic(code(simbuild::graph::missing_source))]
    MissingSource {
        /// Task label.
        task: String,
    },

    /// A built-in action received the wrong number of paths.
    #[error(
        "task '{task}': {action} expects {expected} but has {sources} source(s) and {targets} target(s)"
    )]
    #[diagnostic(code(simbuild::graph::arity))]
    ArityMismatch {
        /// Task label.
        task: String,
        /// Built-in action name.
        action: &'static str,
        /// Human description of the expected shape.
        expected: &'static str,
        /// Number of sources.
        sources: usize,
        /// Number of targets.
        targets: usize,
    },

    /// A command template is malformed.
    #[error("task '{task}' has an invalid command template")]
    #[diagnostic(code(simbuild::graph::template))]
    Template {
        /// Task label.
        task: String,
        /// Parser error.
        #[source]
        source: TemplateError,
    },

    /// A custom scan pattern is not a valid regular expression.
    #[error("task '{task}' has an invalid scan pattern")]
    #[diagnostic(code(simbuild::graph::scan_pattern))]
    InvalidScanPattern {
        /// Task label.
        task: String,
        /// Compilation error.
        #[source]
        source: regex::Error,
    },

    /// `scan` names a scanner that does not exist.
    #[error("task '{task}' uses unknown scanner '{name}'")]
    #[diagnostic(
        code(simbuild::graph::unknown_scanner),
        help("use `abaqus_input`, `sphinx` or a mapping with `pattern` and `suffixes`")
    )]
    UnknownScanner {
        /// Task label.
        task: String,
        /// The requested scanner.
        name: String,
    },

    /// A requested name is neither an alias nor a produced target.
    #[error("'{name}' is not an alias or a target of any task")]
    #[diagnostic(
        code(simbuild::graph::unknown_target),
        help("run `simbuild aliases` to list the available names")
    )]
    UnknownTarget {
        /// The requested name.
        name: String,
    },

    /// The dependency graph or the alias table contains a cycle.
    #[error("dependency cycle detected: {}", cycle.join(" -> "))]
    #[diagnostic(code(simbuild::graph::cycle))]
    Cycle {
        /// Nodes on the cycle, starting and ending with the same entry.
        cycle: Vec<String>,
    },
}
