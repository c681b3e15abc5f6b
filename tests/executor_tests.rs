//! End-to-end execution of small simulation pipelines against stub programs.

use std::fs;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, ensure};
use camino::Utf8PathBuf;
use rstest::rstest;
use simbuild::cancel::CancellationToken;
use simbuild::config::BuildConfig;
use simbuild::executor::Executor;
use simbuild::ir::BuildGraph;
use simbuild::plan::Planner;
use simbuild::locate::ProgramRegistry;
use simbuild::report::{IgnoreReason, SkipReason, TaskStatus};
use simbuild::state::SignatureStore;
use test_support::{Project, recording_program};

mod common;
use common::{FixedLocator, build, config, graph_from_yaml, programs, project};

fn pipeline(size: i64) -> String {
    format!(
        r#"
tasks:
  - targets: geometry.cae
    sources: geometry.py
    command: "${{program.cubit}} ${{SOURCE}} ${{TARGET}}"
    requires: cubit
  - targets: partition.cae
    sources: geometry.cae
    command: "${{program.cubit}} ${{SOURCE}} ${{TARGET}}"
    requires: cubit
  - targets: mesh.inp
    sources: partition.cae
    command: "${{program.cubit}} ${{SOURCE}} ${{TARGET}} ${{size}}"
    requires: cubit
    params:
      size: {size}
  - targets: solver.inp
    sources: solver.inp.in
    depends: mesh.inp
    substitute: {{}}
    params:
      size: {size}
  - targets: solve.odb
    sources: solver.inp
    command: "${{program.abaqus}} ${{SOURCE}} ${{TARGET}}"
    requires: abaqus
    stdout: true
    alias: solve
"#
    )
}

struct Stubs {
    log: Utf8PathBuf,
    locator: FixedLocator,
}

fn stubs(project: &Project) -> Result<Stubs> {
    project.write("geometry.py", "print('plate with hole')\n");
    project.write("solver.inp.in", "*Mesh size=@size@\n");
    let log = project.root().join("calls.log");
    let cubit = recording_program(project.bin(), "cubit", &log, "cp \"$1\" \"$2\"")?;
    let abaqus = recording_program(
        project.bin(),
        "abaqus",
        &log,
        "echo solving \"$1\"; cp \"$1\" \"$2\"",
    )?;
    let locator = FixedLocator::default()
        .with("cubit", cubit)
        .with("abaqus", abaqus);
    Ok(Stubs { log, locator })
}

fn calls(log: &Utf8PathBuf) -> usize {
    fs::read_to_string(log).map_or(0, |text| text.lines().count())
}

fn status(report: &simbuild::report::ExecutionReport, label: &str) -> Result<TaskStatus> {
    report
        .status_by_label(label)
        .cloned()
        .with_context(|| format!("no status for {label}"))
}

#[rstest]
#[case(1)]
#[case(4)]
fn five_stage_pipeline_builds_then_stays_up_to_date(
    project: Project,
    #[case] jobs: usize,
) -> Result<()> {
    let stubs = stubs(&project)?;
    let config = config(project.root(), jobs);
    let graph = graph_from_yaml(&pipeline(3), &config)?;
    let registry = programs(&graph, &stubs.locator);

    let first = build(&graph, &config, &registry, &[])?;
    ensure!(first.is_success(), "{first}");
    ensure!(first.count(|s| *s == TaskStatus::Succeeded) == 5, "{first}");
    ensure!(calls(&stubs.log) == 4);
    ensure!(project.read("build/solver.inp") == "*Mesh size=3\n");
    ensure!(project.read("build/solve.stdout").contains("solving"));

    let second = build(&graph, &config, &registry, &[])?;
    ensure!(second.count(|s| *s == TaskStatus::UpToDate) == 5, "{second}");
    ensure!(calls(&stubs.log) == 4, "up-to-date tasks ran again");
    Ok(())
}

#[rstest]
fn parameter_change_rebuilds_only_the_affected_subtree(project: Project) -> Result<()> {
    let stubs = stubs(&project)?;
    let config = config(project.root(), 2);
    let original = graph_from_yaml(&pipeline(3), &config)?;
    let registry = programs(&original, &stubs.locator);
    ensure!(build(&original, &config, &registry, &[])?.is_success());

    let changed = graph_from_yaml(&pipeline(5), &config)?;
    let report = build(&changed, &config, &registry, &[])?;
    ensure!(status(&report, "geometry.cae")? == TaskStatus::UpToDate);
    ensure!(status(&report, "partition.cae")? == TaskStatus::UpToDate);
    for label in ["mesh.inp", "solver.inp", "solve.odb"] {
        ensure!(
            status(&report, label)? == TaskStatus::Succeeded,
            "{label} was not rebuilt: {report}"
        );
    }
    ensure!(project.read("build/solver.inp") == "*Mesh size=5\n");
    Ok(())
}

#[rstest]
fn edited_source_file_rebuilds_its_consumers(project: Project) -> Result<()> {
    let stubs = stubs(&project)?;
    let config = config(project.root(), 1);
    let graph = graph_from_yaml(&pipeline(3), &config)?;
    let registry = programs(&graph, &stubs.locator);
    ensure!(build(&graph, &config, &registry, &[])?.is_success());

    project.write("solver.inp.in", "*Mesh size=@size@\n*Step\n");
    let report = build(&graph, &config, &registry, &[])?;
    ensure!(status(&report, "mesh.inp")? == TaskStatus::UpToDate);
    ensure!(status(&report, "solver.inp")? == TaskStatus::Succeeded);
    ensure!(status(&report, "solve.odb")? == TaskStatus::Succeeded);
    Ok(())
}

#[rstest]
fn removed_target_is_rebuilt(project: Project) -> Result<()> {
    let stubs = stubs(&project)?;
    let config = config(project.root(), 1);
    let graph = graph_from_yaml(&pipeline(3), &config)?;
    let registry = programs(&graph, &stubs.locator);
    ensure!(build(&graph, &config, &registry, &[])?.is_success());

    fs::remove_file(project.root().join("build/partition.cae"))?;
    let report = build(&graph, &config, &registry, &["partition.cae"])?;
    ensure!(report.tasks.len() == 2, "{report}");
    ensure!(status(&report, "partition.cae")? == TaskStatus::Succeeded);
    Ok(())
}

#[rstest]
fn alias_plans_the_whole_chain_in_order(project: Project) -> Result<()> {
    let stubs = stubs(&project)?;
    let config = config(project.root(), 1);
    let graph = graph_from_yaml(&pipeline(3), &config)?;
    let registry = programs(&graph, &stubs.locator);

    let plan = Planner::new(&graph, &config, &registry).plan(&["solve"])?;
    let labels: Vec<&str> = plan
        .tasks
        .iter()
        .filter_map(|id| graph.task(*id))
        .map(|task| task.label.as_str())
        .collect();
    ensure!(
        labels == ["geometry.cae", "partition.cae", "mesh.inp", "solver.inp", "solve.odb"],
        "unexpected plan {labels:?}"
    );
    ensure!(plan.ignored.is_empty());
    Ok(())
}

#[rstest]
fn removed_intermediate_rebuilds_downstream_through_alias(project: Project) -> Result<()> {
    let stubs = stubs(&project)?;
    let config = config(project.root(), 2);
    let graph = graph_from_yaml(&pipeline(3), &config)?;
    let registry = programs(&graph, &stubs.locator);
    ensure!(build(&graph, &config, &registry, &["solve"])?.is_success());

    fs::remove_file(project.root().join("build/mesh.inp"))?;
    let report = build(&graph, &config, &registry, &["solve"])?;
    ensure!(report.is_success(), "{report}");
    ensure!(report.tasks.len() == 5, "{report}");
    for label in ["geometry.cae", "partition.cae"] {
        ensure!(status(&report, label)? == TaskStatus::UpToDate, "{label}: {report}");
    }
    for label in ["mesh.inp", "solver.inp", "solve.odb"] {
        ensure!(status(&report, label)? == TaskStatus::Succeeded, "{label}: {report}");
    }
    ensure!(project.root().join("build/mesh.inp").exists());
    Ok(())
}

#[rstest]
fn failure_after_a_shared_upstream_keeps_sibling_branches(project: Project) -> Result<()> {
    let config = config(project.root(), 2);
    let graph = graph_from_yaml(
        concat!(
            "tasks:\n",
            "  - targets: a.txt\n",
            "    command: \"echo a > ${TARGET}\"\n",
            "  - targets: b.txt\n",
            "    sources: a.txt\n",
            "    command: \"exit 1\"\n",
            "  - targets: c.txt\n",
            "    sources: b.txt\n",
            "    copy: true\n",
            "  - targets: d.txt\n",
            "    sources: a.txt\n",
            "    copy: true\n",
        ),
        &config,
    )?;
    let report = build(&graph, &config, &ProgramRegistry::default(), &[])?;

    ensure!(!report.is_success());
    ensure!(status(&report, "a.txt")? == TaskStatus::Succeeded, "{report}");
    ensure!(status(&report, "b.txt")? == TaskStatus::Failed, "{report}");
    ensure!(status(&report, "c.txt")? == TaskStatus::Skipped(SkipReason::UpstreamFailed));
    ensure!(status(&report, "d.txt")? == TaskStatus::Succeeded, "{report}");
    ensure!(project.read("build/d.txt") == "a\n");
    Ok(())
}

#[rstest]
fn failure_skips_only_the_dependent_subtree(project: Project) -> Result<()> {
    let config = config(project.root(), 2);
    let graph = graph_from_yaml(
        concat!(
            "tasks:\n",
            "  - targets: broken.txt\n",
            "    command: \"echo meshing failed; exit 3\"\n",
            "  - targets: after.txt\n",
            "    sources: broken.txt\n",
            "    command: \"cp ${SOURCE} ${TARGET}\"\n",
            "  - targets: sibling.txt\n",
            "    command: \"echo ok > ${TARGET}\"\n",
        ),
        &config,
    )?;
    let report = build(&graph, &config, &ProgramRegistry::default(), &[])?;

    ensure!(!report.is_success());
    ensure!(status(&report, "broken.txt")? == TaskStatus::Failed);
    ensure!(status(&report, "after.txt")? == TaskStatus::Skipped(SkipReason::UpstreamFailed));
    ensure!(status(&report, "sibling.txt")? == TaskStatus::Succeeded);
    let failure = report.failures().next().context("failure entry")?;
    ensure!(failure.output.contains("meshing failed"));
    ensure!(
        failure
            .error
            .as_ref()
            .is_some_and(|err| err.to_string().contains("exit")),
        "{:?}",
        failure.error
    );

    let store = SignatureStore::open(config.state_path());
    ensure!(store.get(&project.root().join("build/sibling.txt")).is_some());
    ensure!(store.get(&project.root().join("build/broken.txt")).is_none());
    Ok(())
}

#[rstest]
fn missing_external_input_fails_the_task(project: Project) -> Result<()> {
    let config = config(project.root(), 1);
    let graph = graph_from_yaml(
        "tasks:\n  - targets: out.txt\n    sources: absent.txt\n    copy: true\n",
        &config,
    )?;
    let report = build(&graph, &config, &ProgramRegistry::default(), &[])?;
    ensure!(status(&report, "out.txt")? == TaskStatus::Failed);
    Ok(())
}

const SCANNED: &str = concat!(
    "tasks:\n",
    "  - targets: job.odb\n",
    "    sources: job.inp\n",
    "    command: \"cat ${SOURCE} > ${TARGET}\"\n",
    "    scan: abaqus_input\n",
);

#[rstest]
fn edited_include_file_rebuilds_the_scanning_task(project: Project) -> Result<()> {
    project.write("job.inp", "*HEADING\n*Include, input=parts/plate.inp\n");
    project.write("parts/plate.inp", "*NODE\n*INCLUDE, INPUT=nodes.inp\n");
    project.write("parts/nodes.inp", "1, 0.0, 0.0\n");
    let config = config(project.root(), 1);
    let graph = graph_from_yaml(SCANNED, &config)?;
    let registry = ProgramRegistry::default();

    ensure!(build(&graph, &config, &registry, &[])?.is_success());
    let unchanged = build(&graph, &config, &registry, &[])?;
    ensure!(status(&unchanged, "job.odb")? == TaskStatus::UpToDate, "{unchanged}");

    project.write("parts/nodes.inp", "1, 0.0, 0.0\n2, 1.0, 0.0\n");
    let edited = build(&graph, &config, &registry, &[])?;
    ensure!(status(&edited, "job.odb")? == TaskStatus::Succeeded, "{edited}");
    Ok(())
}

#[rstest]
fn missing_include_file_fails_the_scanning_task(project: Project) -> Result<()> {
    project.write("job.inp", "*INCLUDE, INPUT=absent.inp\n");
    let config = config(project.root(), 1);
    let graph = graph_from_yaml(SCANNED, &config)?;
    let report = build(&graph, &config, &ProgramRegistry::default(), &[])?;

    ensure!(status(&report, "job.odb")? == TaskStatus::Failed, "{report}");
    let failure = report.failures().next().context("failure entry")?;
    ensure!(
        failure
            .error
            .as_ref()
            .is_some_and(|err| err.to_string().contains("absent.inp")),
        "{:?}",
        failure.error
    );
    Ok(())
}

#[rstest]
fn undeclared_target_output_fails_the_task(project: Project) -> Result<()> {
    let config = config(project.root(), 1);
    let graph = graph_from_yaml(
        "tasks:\n  - targets: [a.txt, b.txt]\n    command: \"touch ${TARGET}\"\n",
        &config,
    )?;
    let report = build(&graph, &config, &ProgramRegistry::default(), &[])?;
    ensure!(status(&report, "a.txt")? == TaskStatus::Failed, "{report}");
    Ok(())
}

#[rstest]
fn tasks_needing_missing_programs_are_ignored(project: Project) -> Result<()> {
    let stubs = stubs(&project)?;
    let locator = FixedLocator::default().with(
        "cubit",
        project.bin().join("cubit"),
    );
    let config = config(project.root(), 1);
    let graph = graph_from_yaml(&pipeline(3), &config)?;
    let registry = programs(&graph, &locator);

    let report = build(&graph, &config, &registry, &[])?;
    ensure!(report.is_success(), "{report}");
    ensure!(status(&report, "solver.inp")? == TaskStatus::Succeeded);
    ensure!(
        status(&report, "solve.odb")?
            == TaskStatus::Ignored(IgnoreReason::ProgramUnavailable {
                program: "abaqus".into(),
            })
    );
    ensure!(!project.root().join("build/solve.odb").exists());
    ensure!(calls(&stubs.log) == 3);
    Ok(())
}

#[rstest]
fn unconditional_build_runs_tasks_with_missing_programs(project: Project) -> Result<()> {
    let config = config(project.root(), 1).with_unconditional_build(true);
    let graph = graph_from_yaml(
        concat!(
            "tasks:\n",
            "  - targets: out.txt\n",
            "    command: \"${program.simbuild_absent_tool} ${TARGET}\"\n",
            "    requires: simbuild_absent_tool\n",
        ),
        &config,
    )?;
    let registry = programs(&graph, &FixedLocator::default());
    let plan = Planner::new(&graph, &config, &registry).plan::<&str>(&[])?;
    ensure!(plan.ignored.is_empty());

    let report = build(&graph, &config, &registry, &[])?;
    ensure!(status(&report, "out.txt")? == TaskStatus::Failed);
    Ok(())
}

fn run_cancellable(
    graph: &BuildGraph,
    config: &BuildConfig,
    token: CancellationToken,
) -> Result<simbuild::report::ExecutionReport> {
    let registry = ProgramRegistry::default();
    let plan = Planner::new(graph, config, &registry).plan::<&str>(&[])?;
    let mut store = SignatureStore::open(config.state_path());
    Ok(Executor::new(graph, config, &registry)
        .with_cancellation(token)
        .execute(&plan, &mut store))
}

const SLOW: &str = concat!(
    "tasks:\n",
    "  - targets: slow.txt\n",
    "    command: \"exec sleep 5\"\n",
    "  - targets: next.txt\n",
    "    sources: slow.txt\n",
    "    copy: true\n",
);

#[rstest]
fn cancelled_before_start_runs_nothing(project: Project) -> Result<()> {
    let config = config(project.root(), 2);
    let graph = graph_from_yaml(SLOW, &config)?;
    let token = CancellationToken::new();
    token.cancel();

    let report = run_cancellable(&graph, &config, token)?;
    ensure!(report.cancelled);
    ensure!(
        report.count(|s| *s == TaskStatus::Skipped(SkipReason::Cancelled)) == 2,
        "{report}"
    );
    Ok(())
}

#[rstest]
fn cancellation_terminates_running_actions(project: Project) -> Result<()> {
    let config = config(project.root(), 1);
    let graph = graph_from_yaml(SLOW, &config)?;
    let token = CancellationToken::new();
    let trigger = token.clone();
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(300));
        trigger.cancel();
    });

    let started = Instant::now();
    let report = run_cancellable(&graph, &config, token)?;
    canceller
        .join()
        .map_err(|_| anyhow::anyhow!("canceller panicked"))?;

    ensure!(started.elapsed() < Duration::from_secs(4), "action was not killed");
    ensure!(report.cancelled);
    ensure!(status(&report, "slow.txt")? == TaskStatus::Failed);
    ensure!(!status(&report, "next.txt")?.is_ok());
    ensure!(!project.root().join("build/slow.txt").exists());
    Ok(())
}
