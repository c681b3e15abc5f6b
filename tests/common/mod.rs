//! Shared helpers for integration tests.
//!
//! Integration tests under `tests/` compile as independent crates. This module
//! is included via `mod common;` in individual test files to share fixtures and
//! helpers while keeping test modules small.

#![allow(
    dead_code,
    clippy::allow_attributes,
    reason = "each test crate uses a different subset of helpers"
)]

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use rstest::fixture;
use std::collections::BTreeMap;
use std::num::NonZeroUsize;

use simbuild::config::BuildConfig;
use simbuild::executor::Executor;
use simbuild::ir::BuildGraph;
use simbuild::plan::Planner;
use simbuild::locate::{ProgramLocator, ProgramRegistry};
use simbuild::report::ExecutionReport;
use simbuild::state::SignatureStore;
use test_support::Project;

/// Locator answering from a fixed table instead of `PATH`.
#[derive(Debug, Default)]
pub struct FixedLocator {
    found: BTreeMap<String, Utf8PathBuf>,
}

impl FixedLocator {
    /// Report `name` as installed at `path`.
    #[must_use]
    pub fn with(mut self, name: &str, path: impl Into<Utf8PathBuf>) -> Self {
        self.found.insert(name.to_owned(), path.into());
        self
    }
}

impl ProgramLocator for FixedLocator {
    fn locate(&self, name: &str) -> Option<Utf8PathBuf> {
        self.found.get(name).cloned()
    }
}

/// Fixture: an empty project directory.
#[fixture]
pub fn project() -> Project {
    Project::new()
}

/// Configuration rooted at `root` with `jobs` workers.
pub fn config(root: &Utf8Path, jobs: usize) -> BuildConfig {
    BuildConfig::new(root).with_jobs(NonZeroUsize::new(jobs).unwrap_or(NonZeroUsize::MIN))
}

/// Parse `yaml` (without the version header) into a graph under `config`.
pub fn graph_from_yaml(yaml: &str, config: &BuildConfig) -> Result<BuildGraph> {
    let manifest = simbuild::manifest::from_str(&test_support::manifest_yaml(yaml))
        .context("parse manifest")?;
    BuildGraph::from_manifest(&manifest, config).context("build graph")
}

/// Resolve every required program against `locator`.
pub fn programs(graph: &BuildGraph, locator: &dyn ProgramLocator) -> ProgramRegistry {
    let required = graph
        .tasks()
        .iter()
        .flat_map(|task| task.required_programs.iter().map(String::as_str));
    ProgramRegistry::resolve(&IndexMap::new(), required, locator)
}

/// Plan `names` and execute the plan, saving state afterwards.
pub fn build(
    graph: &BuildGraph,
    config: &BuildConfig,
    registry: &ProgramRegistry,
    names: &[&str],
) -> Result<ExecutionReport> {
    let plan = Planner::new(graph, config, registry)
        .plan(names)
        .context("plan")?;
    let mut store = SignatureStore::open(config.state_path());
    let report = Executor::new(graph, config, registry).execute(&plan, &mut store);
    store.save().context("save state")?;
    Ok(report)
}
