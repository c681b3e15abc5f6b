//! Parallel plan execution.
//!
//! A fixed pool of scoped worker threads pulls ready tasks from a shared
//! schedule guarded by a mutex and condition variable. A task becomes ready
//! once every upstream task in the plan has finished successfully; a failure
//! or cancellation skips its downstream subtree while independent branches
//! keep running. Signature records are collected during the run and applied
//! to the store once every worker has stopped.

mod builtin;
mod process;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::io;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use miette::Diagnostic;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::cancel::CancellationToken;
use crate::config::BuildConfig;
use crate::hasher::{Fingerprint, SignatureHasher, hash_file};
use crate::ir::{Action, BuildGraph, RenderContext, Task, TaskId, TemplateError};
use crate::plan::BuildPlan;
use crate::locate::ProgramRegistry;
use crate::report::{ExecutionReport, SkipReason, TaskReport, TaskStatus};
use crate::scan::ScanError;
use crate::staleness::{Staleness, StalenessResolver};
use crate::state::{SignatureStore, TargetRecord};
use crate::status::{SilentReporter, StatusReporter};

use process::{Completion, run_shell};

const WAIT_INTERVAL: Duration = Duration::from_millis(100);

/// Why an action did not produce its targets.
#[derive(Debug, Error, Diagnostic)]
pub enum ActionFailure {
    /// A command exited unsuccessfully.
    #[error("command exited with {}: {command}", code.map_or_else(|| "a signal".to_owned(), |c| format!("status {c}")))]
    #[diagnostic(code(simbuild::exec::exit_status))]
    ExitStatus {
        /// The rendered command.
        command: String,
        /// Exit code, absent when killed by a signal.
        code: Option<i32>,
    },
    /// A command could not be rendered into valid shell.
    #[error("invalid command: {source}")]
    #[diagnostic(code(simbuild::exec::invalid_command))]
    InvalidCommand {
        /// Rendering error.
        #[source]
        source: TemplateError,
    },
    /// The action finished without writing a declared target.
    #[error("action did not produce target {path}")]
    #[diagnostic(code(simbuild::exec::target_not_produced))]
    TargetNotProduced {
        /// The missing target.
        path: Utf8PathBuf,
    },
    /// The command was killed because the build was interrupted.
    #[error("command terminated by interrupt: {command}")]
    #[diagnostic(code(simbuild::exec::terminated))]
    Terminated {
        /// The rendered command.
        command: String,
    },
}

/// Errors local to a single task.
#[derive(Debug, Error, Diagnostic)]
pub enum ExecError {
    /// An input that no task produces does not exist.
    #[error("missing input {path}")]
    #[diagnostic(
        code(simbuild::exec::missing_input),
        help("create the file or declare the task that produces it")
    )]
    MissingExternalInput {
        /// The missing file.
        path: Utf8PathBuf,
    },
    /// The action failed.
    #[error(transparent)]
    #[diagnostic(transparent)]
    ActionFailure(#[from] ActionFailure),
    /// A file mentioned by a scanned input does not exist.
    #[error("missing input {path} included by another input")]
    #[diagnostic(
        code(simbuild::exec::missing_included_input),
        help("list the producing task's target under `depends` so it is built first")
    )]
    MissingIncludedInput {
        /// The missing file.
        path: Utf8PathBuf,
    },
    /// An input could not be scanned.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Scan(#[from] ScanError),
    /// A filesystem operation failed.
    #[error("I/O error on {path}: {source}")]
    #[diagnostic(code(simbuild::exec::io))]
    Io {
        /// Path being accessed.
        path: Utf8PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Slot {
    Waiting(usize),
    Ready,
    Running,
    Done(TaskStatus),
}

/// Everything a worker learns from running one task.
struct Outcome {
    status: TaskStatus,
    error: Option<ExecError>,
    output: String,
    records: Vec<(Utf8PathBuf, TargetRecord)>,
    duration: Duration,
}

struct Schedule {
    slots: BTreeMap<TaskId, Slot>,
    running: usize,
    done: usize,
    rebuilt: BTreeSet<TaskId>,
    reports: HashMap<TaskId, TaskReport>,
    records: Vec<(Utf8PathBuf, TargetRecord)>,
    forget: Vec<Utf8PathBuf>,
}

impl Schedule {
    fn new(graph: &BuildGraph, plan: &BuildPlan) -> Self {
        let planned: BTreeSet<TaskId> = plan.tasks.iter().copied().collect();
        let slots = plan
            .tasks
            .iter()
            .map(|&id| {
                let waiting = graph
                    .upstream(id)
                    .iter()
                    .filter(|up| planned.contains(up))
                    .count();
                let slot = if waiting == 0 {
                    Slot::Ready
                } else {
                    Slot::Waiting(waiting)
                };
                (id, slot)
            })
            .collect();
        Self {
            slots,
            running: 0,
            done: 0,
            rebuilt: BTreeSet::new(),
            reports: HashMap::new(),
            records: Vec::new(),
            forget: Vec::new(),
        }
    }

    fn total(&self) -> usize {
        self.slots.len()
    }

    fn is_finished(&self) -> bool {
        self.done == self.total()
    }

    fn next_ready(&mut self) -> Option<TaskId> {
        let id = self
            .slots
            .iter()
            .find(|(_, slot)| **slot == Slot::Ready)
            .map(|(id, _)| *id)?;
        self.slots.insert(id, Slot::Running);
        self.running += 1;
        Some(id)
    }

    fn finish(&mut self, graph: &BuildGraph, id: TaskId, status: TaskStatus) {
        self.slots.insert(id, Slot::Done(status.clone()));
        self.done += 1;
        self.reports.insert(id, unrun_report(graph, id, status));
    }

    fn cancel_pending(&mut self, graph: &BuildGraph) {
        let pending: Vec<TaskId> = self
            .slots
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Waiting(_) | Slot::Ready))
            .map(|(id, _)| *id)
            .collect();
        for id in pending {
            self.finish(graph, id, TaskStatus::Skipped(SkipReason::Cancelled));
        }
    }

    /// Release or skip the tasks downstream of `id`.
    fn propagate(&mut self, graph: &BuildGraph, id: TaskId, ok: bool) {
        let mut stack: Vec<TaskId> = graph.downstream(id).into_iter().collect();
        while let Some(down) = stack.pop() {
            match self.slots.get(&down).cloned() {
                Some(Slot::Waiting(count)) if ok => {
                    let slot = if count <= 1 {
                        Slot::Ready
                    } else {
                        Slot::Waiting(count - 1)
                    };
                    self.slots.insert(down, slot);
                }
                Some(Slot::Waiting(_) | Slot::Ready) if !ok => {
                    debug!(task = %label_of(graph, down), "skipping downstream of failed task");
                    self.finish(graph, down, TaskStatus::Skipped(SkipReason::UpstreamFailed));
                    stack.extend(graph.downstream(down));
                }
                _ => {}
            }
        }
    }
}

fn label_of(graph: &BuildGraph, id: TaskId) -> String {
    graph
        .task(id)
        .map_or_else(|| id.to_string(), |task| task.label.clone())
}

/// Report for a task that finished without running its action.
fn unrun_report(graph: &BuildGraph, id: TaskId, status: TaskStatus) -> TaskReport {
    TaskReport {
        task: id,
        label: label_of(graph, id),
        description: graph.task(id).and_then(|task| task.description.clone()),
        status,
        error: None,
        output: String::new(),
        duration: Duration::ZERO,
    }
}

/// Runs a [`BuildPlan`].
pub struct Executor<'a> {
    graph: &'a BuildGraph,
    config: &'a BuildConfig,
    programs: &'a ProgramRegistry,
    cancel: CancellationToken,
    reporter: &'a dyn StatusReporter,
}

impl<'a> Executor<'a> {
    /// Execute tasks of `graph` with the given configuration and programs.
    #[must_use]
    pub fn new(
        graph: &'a BuildGraph,
        config: &'a BuildConfig,
        programs: &'a ProgramRegistry,
    ) -> Self {
        Self {
            graph,
            config,
            programs,
            cancel: CancellationToken::new(),
            reporter: &SilentReporter,
        }
    }

    /// Stop scheduling when `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Send task progress to `reporter`.
    #[must_use]
    pub fn with_reporter(mut self, reporter: &'a dyn StatusReporter) -> Self {
        self.reporter = reporter;
        self
    }

    /// Run every task in `plan`, updating `store` with the new records.
    ///
    /// Task failures are reported per task rather than returned; the caller
    /// inspects [`ExecutionReport::is_success`].
    pub fn execute(&self, plan: &BuildPlan, store: &mut SignatureStore) -> ExecutionReport {
        let shared = Mutex::new(Schedule::new(self.graph, plan));
        let wake = Condvar::new();
        let workers = self.config.jobs().get().min(plan.tasks.len()).max(1);
        info!(tasks = plan.tasks.len(), workers, "executing plan");

        let snapshot: &SignatureStore = store;
        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| self.worker(&shared, &wake, snapshot));
            }
        });

        let mut schedule = shared.into_inner().unwrap_or_else(PoisonError::into_inner);
        for (path, record) in schedule.records.drain(..) {
            store.record(path, record);
        }
        for path in schedule.forget.drain(..) {
            store.forget(&path);
        }

        let mut tasks: Vec<TaskReport> = plan
            .tasks
            .iter()
            .filter_map(|id| schedule.reports.remove(id))
            .collect();
        tasks.extend(plan.ignored.iter().map(|(id, reason)| {
            unrun_report(self.graph, *id, TaskStatus::Ignored(reason.clone()))
        }));
        ExecutionReport {
            tasks,
            cancelled: self.cancel.is_cancelled(),
        }
    }

    fn lock<'s>(schedule: &'s Mutex<Schedule>) -> MutexGuard<'s, Schedule> {
        schedule.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn worker(&self, schedule: &Mutex<Schedule>, wake: &Condvar, store: &SignatureStore) {
        loop {
            let Some((id, upstream_rebuilt)) = self.claim(schedule, wake) else {
                wake.notify_all();
                return;
            };
            let Some(task) = self.graph.task(id) else {
                continue;
            };
            let outcome = self.run_task(task, upstream_rebuilt, store);

            let mut guard = Self::lock(schedule);
            guard.running = guard.running.saturating_sub(1);
            let ok = outcome.status.is_ok();
            if outcome.status == TaskStatus::Succeeded {
                guard.rebuilt.insert(id);
            }
            if ok {
                guard.records.extend(outcome.records);
            } else {
                guard.forget.extend(task.targets.iter().cloned());
            }
            guard.slots.insert(id, Slot::Done(outcome.status.clone()));
            guard.done += 1;
            self.reporter
                .task_finished(&task.label, &outcome.status, guard.done, guard.total());
            guard.reports.insert(
                id,
                TaskReport {
                    task: id,
                    label: task.label.clone(),
                    description: task.description.clone(),
                    status: outcome.status,
                    error: outcome.error,
                    output: outcome.output,
                    duration: outcome.duration,
                },
            );
            guard.propagate(self.graph, id, ok);
            drop(guard);
            wake.notify_all();
        }
    }

    /// Wait for a ready task. Returns `None` once nothing is left to run.
    fn claim(&self, schedule: &Mutex<Schedule>, wake: &Condvar) -> Option<(TaskId, bool)> {
        let mut guard = Self::lock(schedule);
        loop {
            if self.cancel.is_cancelled() {
                guard.cancel_pending(self.graph);
            }
            if guard.is_finished() {
                return None;
            }
            if let Some(id) = guard.next_ready() {
                let rebuilt = self
                    .graph
                    .upstream(id)
                    .iter()
                    .any(|up| guard.rebuilt.contains(up));
                return Some((id, rebuilt));
            }
            if guard.running == 0 && !self.cancel.is_cancelled() {
                // Nothing running and nothing ready: the remaining tasks can
                // never start.
                warn!("execution stalled with unfinished tasks");
                guard.cancel_pending(self.graph);
                return None;
            }
            guard = wake
                .wait_timeout(guard, WAIT_INTERVAL)
                .map(|(g, _)| g)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);
        }
    }

    fn run_task(&self, task: &Task, upstream_rebuilt: bool, store: &SignatureStore) -> Outcome {
        let started = Instant::now();
        let mut output = String::new();
        let result = self.build(task, upstream_rebuilt, store, &mut output);
        let duration = started.elapsed();
        match result {
            Ok((status, records)) => Outcome {
                status,
                error: None,
                output,
                records,
                duration,
            },
            Err(err) => {
                warn!(task = %task.label, error = %err, "task failed");
                Outcome {
                    status: TaskStatus::Failed,
                    error: Some(err),
                    output,
                    records: Vec::new(),
                    duration,
                }
            }
        }
    }

    fn build(
        &self,
        task: &Task,
        upstream_rebuilt: bool,
        store: &SignatureStore,
        output: &mut String,
    ) -> Result<(TaskStatus, Vec<(Utf8PathBuf, TargetRecord)>), ExecError> {
        let inputs = fingerprint_inputs(self.graph, task)?;
        let signature = SignatureHasher::signature(task, self.programs, &inputs);
        let staleness = StalenessResolver::new(store).check(task, &signature, upstream_rebuilt);
        if staleness == Staleness::UpToDate {
            return Ok((TaskStatus::UpToDate, Vec::new()));
        }
        info!(task = %task.label, reason = %staleness, "running task");
        self.reporter.task_started(&task.label);

        prepare_targets(task)?;
        self.run_action(task, output)?;
        if let Some(capture) = &task.stdout_target {
            fs::write(capture, output.as_bytes()).map_err(|source| ExecError::Io {
                path: capture.clone(),
                source,
            })?;
        }
        let records = record_targets(task, &signature)?;
        Ok((TaskStatus::Succeeded, records))
    }

    fn run_action(&self, task: &Task, output: &mut String) -> Result<(), ExecError> {
        let targets: Vec<&Utf8PathBuf> = task.action_targets().collect();
        match &task.action {
            Action::Command { commands } => self.run_commands(task, commands, output),
            Action::Copy => builtin::copy(&task.sources, &targets),
            Action::Substitute { prefix, postfix } => {
                let (Some(source), Some(target)) = (task.sources.first(), targets.first()) else {
                    return Ok(());
                };
                builtin::substitute(
                    source,
                    target,
                    &task.params,
                    self.config.root(),
                    (prefix, postfix),
                )
            }
        }
    }

    fn run_commands(
        &self,
        task: &Task,
        commands: &[crate::ir::ActionTemplate],
        output: &mut String,
    ) -> Result<(), ExecError> {
        let targets: Vec<Utf8PathBuf> = task.action_targets().cloned().collect();
        let programs: IndexMap<String, String> = task
            .required_programs
            .iter()
            .map(|name| (name.clone(), self.programs.invocation(name)))
            .collect();
        let ctx = RenderContext {
            targets: &targets,
            sources: &task.sources,
            params: &task.params,
            programs: &programs,
            root: self.config.root(),
        };
        let cwd = working_dir(task);
        for template in commands {
            let command = template
                .render(&ctx)
                .map_err(|source| ActionFailure::InvalidCommand { source })?;
            debug!(task = %task.label, %command, cwd = %cwd, "spawning command");
            let run = run_shell(&command, cwd, &self.cancel, self.config.interrupt_policy())
                .map_err(|source| ExecError::Io {
                    path: cwd.to_path_buf(),
                    source,
                })?;
            output.push_str(&String::from_utf8_lossy(&run.output));
            match run.completion {
                Completion::Exited(status) if status.success() => {}
                Completion::Exited(status) => {
                    return Err(ActionFailure::ExitStatus {
                        command,
                        code: status.code(),
                    }
                    .into());
                }
                Completion::Terminated => {
                    return Err(ActionFailure::Terminated { command }.into());
                }
            }
        }
        Ok(())
    }
}

/// Fingerprint the inputs of `task` in [`Task::inputs`] order, followed by
/// any files its scanner finds mentioned in them.
///
/// # Errors
///
/// Returns [`ExecError::MissingExternalInput`] for an absent input no task
/// produces, [`ExecError::MissingIncludedInput`] for an absent scanned
/// mention, and [`ExecError::Io`] or [`ExecError::Scan`] for read failures.
pub fn fingerprint_inputs(
    graph: &BuildGraph,
    task: &Task,
) -> Result<Vec<(Utf8PathBuf, Fingerprint)>, ExecError> {
    let mut hashed = Vec::new();
    for input in task.inputs() {
        if graph.producer_of(input).is_none() && !input.exists() {
            return Err(ExecError::MissingExternalInput {
                path: input.clone(),
            });
        }
        let missing = || ExecError::MissingExternalInput {
            path: input.clone(),
        };
        hashed.push((input.clone(), fingerprint(input, missing)?));
    }
    let Some(scanner) = &task.scanner else {
        return Ok(hashed);
    };
    for included in scanner.implicit_inputs(task.inputs().map(Utf8PathBuf::as_path))? {
        if let Some(producer) = graph.producer_of(&included) {
            let upstream = graph.upstream(task.id);
            if !upstream.contains(&producer) {
                warn!(
                    task = %task.label,
                    input = %included,
                    "scanned input is built by a task this one does not depend on"
                );
            }
        }
        let missing = || ExecError::MissingIncludedInput {
            path: included.clone(),
        };
        let digest = fingerprint(&included, missing)?;
        hashed.push((included, digest));
    }
    Ok(hashed)
}

fn fingerprint(
    path: &Utf8Path,
    missing: impl FnOnce() -> ExecError,
) -> Result<Fingerprint, ExecError> {
    hash_file(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            missing()
        } else {
            ExecError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })
}

fn working_dir(task: &Task) -> &Utf8Path {
    task.targets
        .first()
        .and_then(|target| target.parent())
        .unwrap_or_else(|| Utf8Path::new("."))
}

/// Remove stale copies of the task's own targets and create their parent
/// directories.
fn prepare_targets(task: &Task) -> Result<(), ExecError> {
    for target in &task.targets {
        match fs::remove_file(target) {
            Ok(()) => debug!(target = %target, "removed stale target"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(ExecError::Io {
                    path: target.clone(),
                    source,
                });
            }
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|source| ExecError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }
    Ok(())
}

fn record_targets(
    task: &Task,
    signature: &Fingerprint,
) -> Result<Vec<(Utf8PathBuf, TargetRecord)>, ExecError> {
    let built_at = OffsetDateTime::now_utc();
    task.targets
        .iter()
        .map(|target| {
            let content = hash_file(target).map_err(|source| {
                if source.kind() == io::ErrorKind::NotFound {
                    ExecError::from(ActionFailure::TargetNotProduced {
                        path: target.clone(),
                    })
                } else {
                    ExecError::Io {
                        path: target.clone(),
                        source,
                    }
                }
            })?;
            Ok((
                target.clone(),
                TargetRecord {
                    signature: signature.clone(),
                    content,
                    built_at,
                },
            ))
        })
        .collect()
}
