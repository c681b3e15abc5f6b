//! CLI execution and command dispatch logic.
//!
//! This module keeps `main` minimal by providing a single entry point that
//! loads the manifest, builds the graph, locates programs and then runs the
//! requested command. Pipeline stages are reported through a
//! [`StatusReporter`]; command output goes to the writer supplied by the
//! caller.

mod error;
mod path_helpers;

pub use error::RunnerError;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use std::fs;
use std::io::{self, Write};
use tracing::{debug, info, warn};

use crate::cancel::CancellationToken;
use crate::cli::{Cli, Commands, TargetArgs};
use crate::config::BuildConfig;
use crate::executor::{Executor, fingerprint_inputs};
use crate::hasher::{Fingerprint, SignatureHasher};
use crate::ir::{BuildGraph, Task, TaskId};
use crate::output_mode;
use crate::plan::{BuildPlan, Planner};
use crate::locate::{PathLocator, ProgramRegistry};
use crate::report::ExecutionReport;
use crate::staleness::StalenessResolver;
use crate::state::SignatureStore;
use crate::status::{PipelineStage, StatusReporter, report_pipeline_stage};
use crate::{dot, manifest};

use path_helpers::{ensure_manifest_exists, resolve_manifest_path, resolve_project_root};

/// Everything a command needs once the manifest is loaded.
pub struct Session {
    /// Immutable settings for this invocation.
    pub config: BuildConfig,
    /// The validated task graph.
    pub graph: BuildGraph,
    /// Programs required by any task, resolved on `PATH`.
    pub programs: ProgramRegistry,
}

impl Session {
    /// Plan `names` against this session.
    ///
    /// # Errors
    ///
    /// Returns an error when a name is neither an alias nor a target.
    pub fn plan(&self, names: &[String]) -> Result<BuildPlan> {
        Planner::new(&self.graph, &self.config, &self.programs)
            .plan(names)
            .context("failed to plan the build")
    }

    fn label(&self, id: TaskId) -> &str {
        self.graph.task(id).map_or("?", |task| task.label.as_str())
    }
}

/// Execute the parsed [`Cli`] command, writing command output to stdout.
///
/// # Errors
///
/// Returns an error if the manifest cannot be loaded, the graph is invalid,
/// the state cannot be saved or any task fails.
pub fn run(cli: &Cli) -> Result<()> {
    let mode = output_mode::resolve(cli.accessible);
    let reporter = mode.reporter(cli.progress.unwrap_or(true));
    let stdout = io::stdout();
    let mut out = stdout.lock();
    run_with(cli, reporter.as_ref(), &mut out)
}

/// Execute the parsed [`Cli`] command with an explicit reporter and output.
///
/// # Errors
///
/// See [`run`].
pub fn run_with(cli: &Cli, reporter: &dyn StatusReporter, out: &mut dyn Write) -> Result<()> {
    let session = load_session(cli, reporter)?;
    let command = cli
        .command
        .clone()
        .unwrap_or_else(|| Commands::Build(TargetArgs::default()));
    match command {
        Commands::Build(args) => handle_build(&session, &args.names, reporter, out),
        Commands::Plan(args) => handle_plan(&session, &args.names, reporter, out),
        Commands::Graph => {
            write!(out, "{}", dot::render(&session.graph)).context("failed to write graph")?;
            Ok(())
        }
        Commands::Aliases => write_aliases(&session, out),
        Commands::Clean(args) => handle_clean(&session, &args.names, out),
    }
}

/// Load the manifest named by `cli`, build its graph and locate programs.
///
/// # Errors
///
/// Returns an error when the manifest is missing or invalid or the graph
/// fails validation.
pub fn load_session(cli: &Cli, reporter: &dyn StatusReporter) -> Result<Session> {
    let cwd = std::env::current_dir().context("failed to read the current directory")?;
    let root = resolve_project_root(cli.directory.as_deref(), &cwd)?;
    let manifest_path = resolve_manifest_path(&cli.file, &root)?;

    report_pipeline_stage(reporter, PipelineStage::ManifestIngestion);
    ensure_manifest_exists(&manifest_path)?;
    let manifest = manifest::from_path(&manifest_path, &root)
        .with_context(|| format!("failed to load manifest {manifest_path}"))?;
    if tracing::enabled!(tracing::Level::DEBUG) {
        let ast_json =
            serde_json::to_string_pretty(&manifest).context("failed to serialise manifest")?;
        debug!("AST:\n{ast_json}");
    }

    report_pipeline_stage(reporter, PipelineStage::GraphConstruction);
    let config = cli.build_config(root.clone());
    let graph =
        BuildGraph::from_manifest(&manifest, &config).context("failed to build the task graph")?;
    info!(tasks = graph.tasks().len(), root = %root, "task graph ready");

    report_pipeline_stage(reporter, PipelineStage::ProgramLocator);
    let declared: IndexMap<String, Vec<String>> = manifest
        .programs
        .iter()
        .map(|(name, candidates)| (name.clone(), candidates.to_vec()))
        .collect();
    let required = graph
        .tasks()
        .iter()
        .flat_map(|task| task.required_programs.iter().map(String::as_str));
    let locator = PathLocator::from_env(&root);
    let programs = ProgramRegistry::resolve(&declared, required, &locator);

    Ok(Session {
        config,
        graph,
        programs,
    })
}

fn handle_build(
    session: &Session,
    names: &[String],
    reporter: &dyn StatusReporter,
    out: &mut dyn Write,
) -> Result<()> {
    report_pipeline_stage(reporter, PipelineStage::Planning);
    let plan = session.plan(names)?;

    report_pipeline_stage(reporter, PipelineStage::Execution);
    let cancel = CancellationToken::new();
    if let Err(err) = cancel.cancel_on_ctrl_c() {
        warn!(error = %err, "Ctrl-C handling unavailable");
    }
    let mut store = SignatureStore::open(session.config.state_path());
    let report = Executor::new(&session.graph, &session.config, &session.programs)
        .with_cancellation(cancel)
        .with_reporter(reporter)
        .execute(&plan, &mut store);
    store.save().context("failed to save build state")?;

    writeln!(out, "{report}").context("failed to write report")?;
    reporter.report_complete(&report.summary());
    finish(&report)
}

fn finish(report: &ExecutionReport) -> Result<()> {
    if report.is_success() {
        Ok(())
    } else {
        Err(RunnerError::BuildFailed {
            summary: report.summary(),
        }
        .into())
    }
}

/// Signature of `task` when every input can be read.
fn predicted_signature(session: &Session, task: &Task) -> Option<Fingerprint> {
    let inputs = fingerprint_inputs(&session.graph, task).ok()?;
    Some(SignatureHasher::signature(task, &session.programs, &inputs))
}

fn handle_plan(
    session: &Session,
    names: &[String],
    reporter: &dyn StatusReporter,
    out: &mut dyn Write,
) -> Result<()> {
    report_pipeline_stage(reporter, PipelineStage::Planning);
    let plan = session.plan(names)?;
    let store = SignatureStore::open(session.config.state_path());
    let verdicts = StalenessResolver::new(&store).predict(&session.graph, &plan.tasks, |task| {
        predicted_signature(session, task)
    });

    let mut lines = String::new();
    for (id, verdict) in &verdicts {
        let state = if verdict.is_stale() { "run" } else { "up-to-date" };
        lines.push_str(&format!("{state:<12} {}", session.label(*id)));
        if verdict.is_stale() {
            lines.push_str(&format!(" ({verdict})"));
        }
        lines.push('\n');
        if let Some(description) = session.graph.task(*id).and_then(|t| t.description.as_deref()) {
            lines.push_str(&format!("{:<12} {description}\n", ""));
        }
    }
    for (id, reason) in &plan.ignored {
        lines.push_str(&format!("{:<12} {} ({reason})\n", "ignored", session.label(*id)));
    }
    let stale = verdicts.iter().filter(|(_, v)| v.is_stale()).count();
    lines.push_str(&format!(
        "{stale} to run, {} up to date, {} ignored\n",
        verdicts.len() - stale,
        plan.ignored.len()
    ));
    out.write_all(lines.as_bytes())
        .context("failed to write plan")?;
    reporter.report_complete("plan only");
    Ok(())
}

fn write_aliases(session: &Session, out: &mut dyn Write) -> Result<()> {
    let graph = &session.graph;
    let mut text = String::from("Default targets:\n");
    if graph.defaults().is_empty() {
        text.push_str("    (all tasks)\n");
    }
    for name in graph.defaults() {
        text.push_str(&format!("    {name}\n"));
    }
    text.push_str("\nTarget aliases:\n");
    if graph.aliases().is_empty() {
        text.push_str("    (none)\n");
    }
    for (name, members) in graph.aliases() {
        let rendered: Vec<String> = members
            .iter()
            .map(|member| graph.display_path(member))
            .collect();
        text.push_str(&format!("    {name}: {}\n", rendered.join(" ")));
    }
    out.write_all(text.as_bytes())
        .context("failed to write aliases")?;
    Ok(())
}

fn handle_clean(session: &Session, names: &[String], out: &mut dyn Write) -> Result<()> {
    let plan = session.plan(names)?;
    let mut store = SignatureStore::open(session.config.state_path());
    let ids = plan
        .tasks
        .iter()
        .copied()
        .chain(plan.ignored.iter().map(|(id, _)| *id));
    let mut removed = 0usize;
    for id in ids {
        let Some(task) = session.graph.task(id) else {
            continue;
        };
        for target in &task.targets {
            match fs::remove_file(target) {
                Ok(()) => {
                    removed += 1;
                    debug!(target = %target, "removed target");
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => {
                    return Err(err).with_context(|| format!("failed to remove {target}"));
                }
            }
            store.forget(target);
        }
    }
    store.save().context("failed to save build state")?;
    writeln!(out, "removed {removed} file(s)").context("failed to write clean summary")?;
    Ok(())
}
