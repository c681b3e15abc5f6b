//! Finalised task graph types.

use std::collections::BTreeSet;
use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;

use super::error::GraphError;
use super::template::ActionTemplate;
use crate::params::Parameters;
use crate::scan::Scanner;

/// Identifies a task by its registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub(crate) usize);

impl TaskId {
    /// Zero-based registration index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a task runs to produce its targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Shell commands run in order; the first failure stops the task.
    Command {
        /// Main commands followed by post actions.
        commands: Vec<ActionTemplate>,
    },
    /// Copy source `i` to target `i`.
    Copy,
    /// Copy the single source to the single target, replacing
    /// `<prefix>key<postfix>` with parameter values.
    Substitute {
        /// Marker before each key.
        prefix: String,
        /// Marker after each key.
        postfix: String,
    },
}

impl Action {
    /// Short name used in signatures and diagnostics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Command { .. } => "command",
            Self::Copy => "copy",
            Self::Substitute { .. } => "substitute",
        }
    }
}

/// A registered task with all paths resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    /// Registration index.
    pub id: TaskId,
    /// Display name: the first target relative to the build directory.
    pub label: String,
    /// Absolute target paths; the stdout capture file, when present, is last.
    pub targets: Vec<Utf8PathBuf>,
    /// Absolute source paths substituted into `${SOURCES}`.
    pub sources: Vec<Utf8PathBuf>,
    /// Absolute implicit inputs.
    pub depends: Vec<Utf8PathBuf>,
    /// The action to run.
    pub action: Action,
    /// Values substituted into the action.
    pub params: Parameters,
    /// Programs the action needs.
    pub required_programs: BTreeSet<String>,
    /// Whether the task builds documentation.
    pub documentation: bool,
    /// Optional description.
    pub description: Option<String>,
    /// File receiving the action's captured output.
    pub stdout_target: Option<Utf8PathBuf>,
    /// Finds further inputs mentioned inside the declared ones.
    pub scanner: Option<Scanner>,
}

impl Task {
    /// Sources followed by implicit dependencies.
    pub fn inputs(&self) -> impl Iterator<Item = &Utf8PathBuf> {
        self.sources.iter().chain(&self.depends)
    }

    /// Targets the action itself must write; excludes the stdout capture.
    pub fn action_targets(&self) -> impl Iterator<Item = &Utf8PathBuf> {
        self.targets
            .iter()
            .filter(move |target| Some(*target) != self.stdout_target.as_ref())
    }
}

/// One distinct path in the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Absolute path.
    pub path: Utf8PathBuf,
    /// Task producing the path; `None` marks an external input.
    pub producer: Option<TaskId>,
    /// Tasks reading the path, in registration order.
    pub consumers: Vec<TaskId>,
}

impl Node {
    /// Whether the path is produced outside the build.
    #[must_use]
    pub const fn is_external(&self) -> bool {
        self.producer.is_none()
    }
}

/// Immutable, acyclic task graph.
#[derive(Debug, Clone, Default)]
pub struct BuildGraph {
    pub(crate) root: Utf8PathBuf,
    pub(crate) build_dir: Utf8PathBuf,
    pub(crate) tasks: Vec<Task>,
    pub(crate) nodes: IndexMap<Utf8PathBuf, Node>,
    pub(crate) aliases: IndexMap<String, Vec<Utf8PathBuf>>,
    pub(crate) defaults: Vec<String>,
}

impl BuildGraph {
    /// Tasks in registration order.
    #[must_use]
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Look up a task.
    #[must_use]
    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(id.0)
    }

    /// Every path node in first-seen order.
    #[must_use]
    pub const fn nodes(&self) -> &IndexMap<Utf8PathBuf, Node> {
        &self.nodes
    }

    /// Aliases mapped to their flattened target paths.
    #[must_use]
    pub const fn aliases(&self) -> &IndexMap<String, Vec<Utf8PathBuf>> {
        &self.aliases
    }

    /// Names built when nothing is requested.
    #[must_use]
    pub fn defaults(&self) -> &[String] {
        &self.defaults
    }

    /// Directory targets are resolved under.
    #[must_use]
    pub fn build_dir(&self) -> &Utf8Path {
        &self.build_dir
    }

    /// Producer of `path`, if any.
    #[must_use]
    pub fn producer_of(&self, path: &Utf8Path) -> Option<TaskId> {
        self.nodes.get(path).and_then(|node| node.producer)
    }

    /// Distinct tasks producing inputs of `id`.
    #[must_use]
    pub fn upstream(&self, id: TaskId) -> BTreeSet<TaskId> {
        self.task(id)
            .into_iter()
            .flat_map(Task::inputs)
            .filter_map(|input| self.producer_of(input))
            .filter(|producer| *producer != id)
            .collect()
    }

    /// Distinct tasks consuming targets of `id`.
    #[must_use]
    pub fn downstream(&self, id: TaskId) -> BTreeSet<TaskId> {
        self.task(id)
            .into_iter()
            .flat_map(|task| task.targets.iter())
            .filter_map(|target| self.nodes.get(target))
            .flat_map(|node| node.consumers.iter().copied())
            .collect()
    }

    /// Render `path` relative to the build directory or project root when it
    /// sits under one of them.
    #[must_use]
    pub fn display_path(&self, path: &Utf8Path) -> String {
        path.strip_prefix(&self.build_dir)
            .or_else(|_| path.strip_prefix(&self.root))
            .unwrap_or(path)
            .to_string()
    }

    /// Resolve a requested name to the tasks producing it.
    ///
    /// Names are tried as an alias, then as a target under the build
    /// directory, then verbatim and finally under the project root.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownTarget`] when nothing matches.
    pub fn resolve_name(&self, name: &str) -> Result<BTreeSet<TaskId>, GraphError> {
        if let Some(targets) = self.aliases.get(name) {
            return Ok(targets
                .iter()
                .filter_map(|target| self.producer_of(target))
                .collect());
        }
        self.resolve_target(Utf8Path::new(name))
            .and_then(|path| self.producer_of(&path))
            .map(|id| BTreeSet::from([id]))
            .ok_or_else(|| GraphError::UnknownTarget {
                name: name.to_owned(),
            })
    }

    /// Resolve a declared path to a produced target, trying the build
    /// directory, the path verbatim and the project root in turn.
    pub(crate) fn resolve_target(&self, declared: &Utf8Path) -> Option<Utf8PathBuf> {
        [
            self.build_dir.join(declared),
            declared.to_path_buf(),
            self.root.join(declared),
        ]
        .into_iter()
        .find(|candidate| self.producer_of(candidate).is_some())
    }
}
