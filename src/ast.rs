//! Simbuild manifest Abstract Syntax Tree structures.
//!
//! This module defines the data structures used to represent a parsed
//! `Simbuildfile`. They mirror the YAML schema and are deserialised with
//! `serde_saphyr`. Paths are kept as declared; resolution against the build
//! directory and project root happens when the manifest is lowered into the
//! graph.
//!
//! ```rust
//! use simbuild::ast::{Recipe, SimbuildManifest, StringOrList};
//!
//! let yaml = "simbuild_version: \"1.0.0\"\ntasks:\n  - targets: mesh.inp\n    command: \"touch ${TARGET}\"";
//! let manifest: SimbuildManifest = serde_saphyr::from_str(yaml).expect("parse");
//! let task = manifest.tasks.first().expect("task");
//! assert_eq!(task.targets, StringOrList::String("mesh.inp".into()));
//! assert!(matches!(task.recipe, Recipe::Command { .. }));
//! ```

use indexmap::IndexMap;
use semver::Version;
use serde::{Deserialize, Serialize, de::Deserializer};

use crate::params::Parameters;

/// Top-level manifest structure parsed from a `Simbuildfile`.
#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SimbuildManifest {
    /// Semantic version of the manifest format.
    pub simbuild_version: Version,

    /// Program names mapped to candidate executables; the first candidate
    /// found on `PATH` wins.
    #[serde(default)]
    pub programs: IndexMap<String, StringOrList>,

    /// Tasks in declaration order.
    #[serde(default)]
    pub tasks: Vec<TaskSpec>,

    /// Alias names mapped to targets or other aliases.
    #[serde(default)]
    pub aliases: IndexMap<String, StringOrList>,

    /// Names built when the command line requests nothing.
    #[serde(default)]
    pub defaults: Vec<String>,
}

/// A single task declaration.
#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TaskSpec {
    /// Files the task produces.
    pub targets: StringOrList,

    /// Files the task reads and substitutes into `${SOURCES}`.
    #[serde(default)]
    pub sources: StringOrList,

    /// Extra inputs that order the task and feed its signature without
    /// being substituted.
    #[serde(default)]
    pub depends: StringOrList,

    /// How the targets are produced.
    #[serde(flatten)]
    pub recipe: Recipe,

    /// Commands appended after the main command.
    #[serde(default)]
    pub post_action: StringOrList,

    /// Values substituted into the action.
    #[serde(default)]
    pub params: Parameters,

    /// Programs the action needs.
    #[serde(default)]
    pub requires: StringOrList,

    /// Alias to add every target of this task to.
    #[serde(default)]
    pub alias: Option<String>,

    /// Capture the action's output into `<first target stem>.stdout`.
    #[serde(default)]
    pub stdout: bool,

    /// Marks the task as a documentation build.
    #[serde(default)]
    pub documentation: bool,

    /// Optional human-readable description shown in plans and reports.
    #[serde(default)]
    pub description: Option<String>,

    /// Scan inputs for files they include.
    #[serde(default)]
    pub scan: Option<ScanSpec>,
}

/// Implicit dependency scanning declared on a task.
///
/// Either the name of a built-in scanner or a custom pattern:
///
/// ```rust
/// use simbuild::ast::ScanSpec;
///
/// let preset: ScanSpec = serde_saphyr::from_str("abaqus_input").expect("parse");
/// assert_eq!(preset, ScanSpec::Preset("abaqus_input".into()));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ScanSpec {
    /// A built-in scanner: `abaqus_input` or `sphinx`.
    Preset(String),
    /// A regular expression applied to inputs with the given suffixes.
    Pattern {
        /// Pattern matched line by line; the first capture group, when
        /// present, names the included file.
        pattern: String,
        /// File name endings selecting which inputs are read.
        suffixes: StringOrList,
        /// Match without regard to case.
        #[serde(default)]
        ignore_case: bool,
    },
}

/// The action a task runs.
///
/// Exactly one of `command`, `copy` or `substitute` must be present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Recipe {
    /// One or more shell command templates run in order.
    Command {
        /// The command templates.
        command: StringOrList,
    },
    /// Copy each source to the target at the same position.
    Copy,
    /// Copy a single source to a single target, replacing
    /// `<prefix>key<postfix>` markers with parameter values.
    Substitute {
        /// Marker placed before each key.
        prefix: String,
        /// Marker placed after each key.
        postfix: String,
    },
}

#[derive(Debug, Deserialize)]
struct SubstituteMarkers {
    #[serde(default = "default_marker")]
    prefix: String,
    #[serde(default = "default_marker")]
    postfix: String,
}

fn default_marker() -> String {
    String::from("@")
}

impl<'de> Deserialize<'de> for Recipe {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct RawRecipe {
            command: Option<StringOrList>,
            copy: Option<bool>,
            substitute: Option<SubstituteMarkers>,
        }

        let raw = RawRecipe::deserialize(deserializer)?;
        match (raw.command, raw.copy, raw.substitute) {
            (Some(command), None, None) => Ok(Self::Command { command }),
            (None, Some(true), None) => Ok(Self::Copy),
            (None, Some(false), None) => Err(serde::de::Error::custom(
                "copy must be true when present",
            )),
            (None, None, Some(markers)) => Ok(Self::Substitute {
                prefix: markers.prefix,
                postfix: markers.postfix,
            }),
            (None, None, None) => Err(serde::de::Error::custom(
                "missing one of command, copy, or substitute",
            )),
            (command, copy, substitute) => {
                let present: Vec<&str> = [
                    ("command", command.is_some()),
                    ("copy", copy.is_some()),
                    ("substitute", substitute.is_some()),
                ]
                .into_iter()
                .filter_map(|(name, is_present)| is_present.then_some(name))
                .collect();
                Err(serde::de::Error::custom(format!(
                    "fields {} are mutually exclusive",
                    present.join(", ")
                )))
            }
        }
    }
}

/// Convenience type for fields that accept either a single string or a list
/// of strings.
///
/// ```rust
/// use simbuild::ast::StringOrList;
///
/// let list: StringOrList = serde_saphyr::from_str("[a, b]").expect("parse");
/// assert_eq!(list.to_vec(), vec!["a".to_owned(), "b".to_owned()]);
/// ```
#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum StringOrList {
    /// No value was provided.
    #[default]
    Empty,
    /// A single string value.
    String(String),
    /// A list of string values.
    List(Vec<String>),
}

impl StringOrList {
    /// Borrow the contained strings in order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let items: &[String] = match self {
            Self::Empty => &[],
            Self::String(value) => std::slice::from_ref(value),
            Self::List(values) => values,
        };
        items.iter().map(String::as_str)
    }

    /// Collect the contained strings.
    #[must_use]
    pub fn to_vec(&self) -> Vec<String> {
        self.iter().map(str::to_owned).collect()
    }

    /// Whether no strings are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}
