//! Incremental task registration.

use std::collections::{BTreeSet, HashMap, HashSet};

use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use tracing::debug;

use super::cycle;
use super::error::GraphError;
use super::graph::{Action, BuildGraph, Node, Task, TaskId};
use super::template::ActionTemplate;
use crate::config::BuildConfig;
use crate::params::{ParamValue, Parameters};
use crate::scan::{ScanRule, Scanner};

/// Declared action before its templates are parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionSpec {
    /// Command templates run in order.
    Command(Vec<String>),
    /// Copy each source to its target.
    Copy,
    /// Replace `<prefix>key<postfix>` markers while copying.
    Substitute {
        /// Marker before each key.
        prefix: String,
        /// Marker after each key.
        postfix: String,
    },
}

/// A task as declared by the caller; paths are not yet resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDecl {
    /// Declared targets, relative to the build directory unless absolute.
    pub targets: Vec<Utf8PathBuf>,
    /// Declared sources.
    pub sources: Vec<Utf8PathBuf>,
    /// Declared implicit inputs.
    pub depends: Vec<Utf8PathBuf>,
    /// The action.
    pub action: ActionSpec,
    /// Commands appended after a command action.
    pub post_actions: Vec<String>,
    /// Parameter values.
    pub params: Parameters,
    /// Programs the action needs.
    pub required_programs: BTreeSet<String>,
    /// Documentation build flag.
    pub documentation: bool,
    /// Optional description.
    pub description: Option<String>,
    /// Capture action output into `<first target stem>.stdout`.
    pub capture_stdout: bool,
    /// Scan inputs for further dependencies.
    pub scan: Option<ScanRule>,
}

fn paths<I, P>(items: I) -> Vec<Utf8PathBuf>
where
    I: IntoIterator<Item = P>,
    P: Into<Utf8PathBuf>,
{
    items.into_iter().map(Into::into).collect()
}

impl TaskDecl {
    /// Declare a task with the given action and targets.
    pub fn new<I, P>(targets: I, action: ActionSpec) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Utf8PathBuf>,
    {
        Self {
            targets: paths(targets),
            sources: Vec::new(),
            depends: Vec::new(),
            action,
            post_actions: Vec::new(),
            params: Parameters::new(),
            required_programs: BTreeSet::new(),
            documentation: false,
            description: None,
            capture_stdout: false,
            scan: None,
        }
    }

    /// Declare a shell command task.
    pub fn command<I, P, C, S>(targets: I, commands: C) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Utf8PathBuf>,
        C: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            targets,
            ActionSpec::Command(commands.into_iter().map(Into::into).collect()),
        )
    }

    /// Set the sources.
    #[must_use]
    pub fn with_sources<I, P>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Utf8PathBuf>,
    {
        self.sources = paths(sources);
        self
    }

    /// Set the implicit inputs.
    #[must_use]
    pub fn with_depends<I, P>(mut self, depends: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Utf8PathBuf>,
    {
        self.depends = paths(depends);
        self
    }

    /// Add a parameter.
    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Add a required program.
    #[must_use]
    pub fn requiring(mut self, program: impl Into<String>) -> Self {
        self.required_programs.insert(program.into());
        self
    }

    /// Mark as a documentation task.
    #[must_use]
    pub const fn documentation(mut self) -> Self {
        self.documentation = true;
        self
    }

    /// Capture the action output into a `.stdout` target.
    #[must_use]
    pub const fn capturing_stdout(mut self) -> Self {
        self.capture_stdout = true;
        self
    }

    /// Scan inputs with `rule`.
    #[must_use]
    pub fn scanning(mut self, rule: ScanRule) -> Self {
        self.scan = Some(rule);
        self
    }
}

/// Handle returned for a registered task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskHandle(TaskId);

impl TaskHandle {
    /// Identifier of the registered task.
    #[must_use]
    pub const fn id(self) -> TaskId {
        self.0
    }
}

struct Pending {
    task: Task,
    sources: Vec<Utf8PathBuf>,
    depends: Vec<Utf8PathBuf>,
}

/// Collects task declarations and produces a [`BuildGraph`].
pub struct GraphBuilder<'cfg> {
    config: &'cfg BuildConfig,
    pending: Vec<Pending>,
    producers: HashMap<Utf8PathBuf, TaskId>,
    aliases: IndexMap<String, Vec<String>>,
    defaults: Vec<String>,
}

impl<'cfg> GraphBuilder<'cfg> {
    /// Start an empty graph.
    #[must_use]
    pub fn new(config: &'cfg BuildConfig) -> Self {
        Self {
            config,
            pending: Vec::new(),
            producers: HashMap::new(),
            aliases: IndexMap::new(),
            defaults: Vec::new(),
        }
    }

    fn resolve_declared_target(&self, declared: &Utf8Path) -> Utf8PathBuf {
        self.config.target_path(declared)
    }

    /// Validate and register a task.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError`] when the task has no targets, claims a target
    /// another task already produces, or its action does not match its
    /// parameters, programs or paths.
    pub fn register_task(&mut self, decl: TaskDecl) -> Result<TaskHandle, GraphError> {
        let id = TaskId(self.pending.len());
        let first = decl
            .targets
            .first()
            .ok_or(GraphError::EmptyTargets { index: id.0 })?;
        let label = first.to_string();

        let mut targets: Vec<Utf8PathBuf> = decl
            .targets
            .iter()
            .map(|declared| self.resolve_declared_target(declared))
            .collect();
        let stdout_target = decl.capture_stdout.then(|| {
            let first_target = self.resolve_declared_target(first);
            let stem = first_target.file_stem().unwrap_or("stdout");
            first_target.with_file_name(format!("{stem}.stdout"))
        });
        targets.extend(stdout_target.iter().cloned());

        let mut seen = HashSet::new();
        for target in &targets {
            if let Some(existing) = self.producers.get(target) {
                let producer = self
                    .pending
                    .get(existing.0)
                    .map_or_else(|| existing.to_string(), |p| p.task.label.clone());
                return Err(GraphError::DuplicateTarget {
                    target: target.clone(),
                    producer,
                });
            }
            if !seen.insert(target) {
                return Err(GraphError::DuplicateTarget {
                    target: target.clone(),
                    producer: label,
                });
            }
        }

        let action = build_action(&decl, &label)?;
        validate_action(&action, &decl, &label)?;
        let scanner = decl
            .scan
            .as_ref()
            .map(Scanner::compile)
            .transpose()
            .map_err(|source| GraphError::InvalidScanPattern {
                task: label.clone(),
                source,
            })?;

        for target in &targets {
            self.producers.insert(target.clone(), id);
        }
        debug!(task = %label, targets = targets.len(), "registered task");
        self.pending.push(Pending {
            task: Task {
                id,
                label,
                targets,
                sources: Vec::new(),
                depends: Vec::new(),
                action,
                params: decl.params,
                required_programs: decl.required_programs,
                documentation: decl.documentation,
                description: decl.description,
                stdout_target,
                scanner,
            },
            sources: decl.sources,
            depends: decl.depends,
        });
        Ok(TaskHandle(id))
    }

    /// Append `members` (targets or alias names) to alias `name`.
    pub fn register_alias<I, S>(&mut self, name: impl Into<String>, members: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases
            .entry(name.into())
            .or_default()
            .extend(members.into_iter().map(Into::into));
    }

    /// Add every declared target of the registered task `handle` to alias
    /// `name`.
    ///
    /// Members are recorded as resolved paths, so an alias may share its
    /// name with one of the task's targets.
    pub fn register_task_alias(&mut self, name: impl Into<String>, handle: TaskHandle) {
        let members: Vec<String> = self
            .pending
            .get(handle.id().0)
            .map(|pending| {
                pending
                    .task
                    .action_targets()
                    .map(|target| target.to_string())
                    .collect()
            })
            .unwrap_or_default();
        self.register_alias(name, members);
    }

    /// Record a name to build when nothing is requested.
    pub fn add_default(&mut self, name: impl Into<String>) {
        self.defaults.push(name.into());
    }

    fn resolve_input(&self, declared: &Utf8Path) -> Utf8PathBuf {
        if declared.is_absolute() {
            return declared.to_path_buf();
        }
        let in_build = self.config.target_path(declared);
        if self.producers.contains_key(&in_build) {
            in_build
        } else {
            self.config.external_path(declared)
        }
    }

    /// Link inputs to producers, resolve aliases and reject cycles.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownTarget`] for alias members or defaults
    /// that name nothing and [`GraphError::Cycle`] when tasks or aliases
    /// depend on themselves.
    pub fn finalize(self) -> Result<BuildGraph, GraphError> {
        let mut nodes: IndexMap<Utf8PathBuf, Node> = IndexMap::new();
        let mut tasks = Vec::with_capacity(self.pending.len());
        for pending in &self.pending {
            let mut task = pending.task.clone();
            task.sources = pending
                .sources
                .iter()
                .map(|p| self.resolve_input(p))
                .collect();
            task.depends = pending
                .depends
                .iter()
                .map(|p| self.resolve_input(p))
                .collect();
            for target in &task.targets {
                nodes.insert(
                    target.clone(),
                    Node {
                        path: target.clone(),
                        producer: Some(task.id),
                        consumers: Vec::new(),
                    },
                );
            }
            tasks.push(task);
        }
        for task in &tasks {
            for input in task.inputs() {
                let node = nodes.entry(input.clone()).or_insert_with(|| Node {
                    path: input.clone(),
                    producer: None,
                    consumers: Vec::new(),
                });
                if !node.consumers.contains(&task.id) {
                    node.consumers.push(task.id);
                }
            }
        }

        let mut graph = BuildGraph {
            root: self.config.root().to_path_buf(),
            build_dir: self.config.build_dir().to_path_buf(),
            tasks,
            nodes,
            aliases: IndexMap::new(),
            defaults: self.defaults.clone(),
        };

        if let Some(found) = cycle::find_task_cycle(&graph) {
            let cycle = found.iter().map(|p| graph.display_path(p)).collect();
            return Err(GraphError::Cycle { cycle });
        }

        graph.aliases = self.flatten_aliases(&graph)?;
        for name in &graph.defaults {
            graph.resolve_name(name)?;
        }
        debug!(
            tasks = graph.tasks.len(),
            nodes = graph.nodes.len(),
            aliases = graph.aliases.len(),
            "finalised task graph"
        );
        Ok(graph)
    }

    fn flatten_aliases(
        &self,
        graph: &BuildGraph,
    ) -> Result<IndexMap<String, Vec<Utf8PathBuf>>, GraphError> {
        let is_target = |member: &str| graph.resolve_target(Utf8Path::new(member)).is_some();
        if let Some(found) = cycle::find_alias_cycle(&self.aliases, is_target) {
            return Err(GraphError::Cycle { cycle: found });
        }
        let mut flat = IndexMap::new();
        for name in self.aliases.keys() {
            let mut targets = Vec::new();
            self.collect_alias(name, graph, &mut targets)?;
            flat.insert(name.clone(), targets);
        }
        Ok(flat)
    }

    fn collect_alias(
        &self,
        name: &str,
        graph: &BuildGraph,
        out: &mut Vec<Utf8PathBuf>,
    ) -> Result<(), GraphError> {
        // Produced targets win over aliases of the same name.
        for member in self.aliases.get(name).into_iter().flatten() {
            match graph.resolve_target(Utf8Path::new(member)) {
                Some(target) => {
                    if !out.contains(&target) {
                        out.push(target);
                    }
                }
                None if self.aliases.contains_key(member) => {
                    self.collect_alias(member, graph, out)?;
                }
                None => {
                    return Err(GraphError::UnknownTarget {
                        name: member.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

fn build_action(decl: &TaskDecl, label: &str) -> Result<Action, GraphError> {
    let template_error = |source| GraphError::Template {
        task: label.to_owned(),
        source,
    };
    Ok(match &decl.action {
        ActionSpec::Command(commands) => Action::Command {
            commands: commands
                .iter()
                .chain(&decl.post_actions)
                .map(|text| ActionTemplate::parse(text))
                .collect::<Result<_, _>>()
                .map_err(template_error)?,
        },
        ActionSpec::Copy => Action::Copy,
        ActionSpec::Substitute { prefix, postfix } => Action::Substitute {
            prefix: prefix.clone(),
            postfix: postfix.clone(),
        },
    })
}

fn validate_action(action: &Action, decl: &TaskDecl, label: &str) -> Result<(), GraphError> {
    let arity = |expected: &'static str| GraphError::ArityMismatch {
        task: label.to_owned(),
        action: action.kind(),
        expected,
        sources: decl.sources.len(),
        targets: decl.targets.len(),
    };
    match action {
        Action::Command { commands } => validate_templates(commands, decl, label),
        Action::Copy => {
            if decl.sources.is_empty() || decl.sources.len() != decl.targets.len() {
                return Err(arity("one source per target"));
            }
            if let Some(name) = decl.params.keys().next() {
                return Err(GraphError::UnusedParameter {
                    task: label.to_owned(),
                    name: name.clone(),
                });
            }
            Ok(())
        }
        Action::Substitute { .. } => {
            if decl.sources.len() != 1 || decl.targets.len() != 1 {
                return Err(arity("exactly one source and one target"));
            }
            Ok(())
        }
    }
}

fn validate_templates(
    commands: &[ActionTemplate],
    decl: &TaskDecl,
    label: &str,
) -> Result<(), GraphError> {
    let referenced: HashSet<&str> = commands.iter().flat_map(ActionTemplate::param_names).collect();
    for template in commands {
        if let Some(name) = template
            .param_names()
            .find(|name| !decl.params.contains_key(*name))
        {
            return Err(GraphError::MissingParameter {
                task: label.to_owned(),
                name: name.to_owned(),
            });
        }
        if let Some(program) = template
            .program_names()
            .find(|program| !decl.required_programs.contains(*program))
        {
            return Err(GraphError::UnknownProgram {
                task: label.to_owned(),
                program: program.to_owned(),
            });
        }
        if template.needs_source() && decl.sources.is_empty() {
            return Err(GraphError::MissingSource {
                task: label.to_owned(),
            });
        }
    }
    if let Some(name) = decl
        .params
        .keys()
        .find(|name| !referenced.contains(name.as_str()))
    {
        return Err(GraphError::UnusedParameter {
            task: label.to_owned(),
            name: name.clone(),
        });
    }
    Ok(())
}
