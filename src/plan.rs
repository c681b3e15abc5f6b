//! Plan assembly: from requested names to an ordered list of tasks.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use crate::config::BuildConfig;
use crate::ir::{BuildGraph, GraphError, TaskId};
use crate::locate::ProgramRegistry;
use crate::report::IgnoreReason;

/// Tasks to consider, in execution order, plus the tasks left out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildPlan {
    /// Tasks in a topological order, ties broken by registration order.
    pub tasks: Vec<TaskId>,
    /// Tasks excluded from the run, with the reason.
    pub ignored: Vec<(TaskId, IgnoreReason)>,
}

impl BuildPlan {
    /// Whether the plan contains nothing at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty() && self.ignored.is_empty()
    }
}

/// Builds [`BuildPlan`]s against a graph.
pub struct Planner<'a> {
    graph: &'a BuildGraph,
    config: &'a BuildConfig,
    programs: &'a ProgramRegistry,
}

impl<'a> Planner<'a> {
    /// Plan over `graph` with the given configuration and resolved programs.
    #[must_use]
    pub const fn new(
        graph: &'a BuildGraph,
        config: &'a BuildConfig,
        programs: &'a ProgramRegistry,
    ) -> Self {
        Self {
            graph,
            config,
            programs,
        }
    }

    /// Assemble a plan for `names`.
    ///
    /// With no names, the graph's defaults are planned, or every task when
    /// there are no defaults.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownTarget`] for a name that is neither an
    /// alias nor a target.
    pub fn plan<S: AsRef<str>>(&self, names: &[S]) -> Result<BuildPlan, GraphError> {
        let requested = self.requested(names)?;
        let needed = self.close_upstream(requested);
        let ignored = self.ignored(&needed);
        let runnable: BTreeSet<TaskId> = needed
            .into_iter()
            .filter(|id| !ignored.contains_key(id))
            .collect();
        let tasks = self.topological(&runnable);
        info!(
            tasks = tasks.len(),
            ignored = ignored.len(),
            "assembled build plan"
        );
        Ok(BuildPlan {
            tasks,
            ignored: ignored.into_iter().collect(),
        })
    }

    fn requested<S: AsRef<str>>(&self, names: &[S]) -> Result<BTreeSet<TaskId>, GraphError> {
        let mut requested = BTreeSet::new();
        if names.is_empty() {
            if self.graph.defaults().is_empty() {
                requested.extend(self.graph.tasks().iter().map(|task| task.id));
            }
            for name in self.graph.defaults() {
                requested.extend(self.graph.resolve_name(name)?);
            }
        }
        for name in names {
            requested.extend(self.graph.resolve_name(name.as_ref())?);
        }
        debug!(requested = requested.len(), "resolved requested names");
        Ok(requested)
    }

    fn close_upstream(&self, requested: BTreeSet<TaskId>) -> BTreeSet<TaskId> {
        let mut needed = BTreeSet::new();
        let mut stack: Vec<TaskId> = requested.into_iter().collect();
        while let Some(id) = stack.pop() {
            if needed.insert(id) {
                stack.extend(self.graph.upstream(id));
            }
        }
        needed
    }

    fn own_reason(&self, id: TaskId) -> Option<IgnoreReason> {
        let task = self.graph.task(id)?;
        if task.documentation && self.config.ignore_documentation() {
            return Some(IgnoreReason::Documentation);
        }
        if self.config.unconditional_build() {
            return None;
        }
        task.required_programs
            .iter()
            .find(|program| !self.programs.is_available(program))
            .map(|program| IgnoreReason::ProgramUnavailable {
                program: program.clone(),
            })
    }

    fn ignored(&self, needed: &BTreeSet<TaskId>) -> BTreeMap<TaskId, IgnoreReason> {
        let mut ignored = BTreeMap::new();
        for &id in &self.topological(needed) {
            let reason = self.own_reason(id).or_else(|| {
                self.graph
                    .upstream(id)
                    .into_iter()
                    .find(|up| ignored.contains_key(up))
                    .and_then(|up| self.graph.task(up))
                    .map(|up| IgnoreReason::UpstreamIgnored {
                        upstream: up.label.clone(),
                    })
            });
            if let Some(reason) = reason {
                info!(task = id.index(), %reason, "ignoring task");
                ignored.insert(id, reason);
            }
        }
        ignored
    }

    /// Kahn's algorithm restricted to `subset`, always releasing the lowest
    /// registration index first.
    fn topological(&self, subset: &BTreeSet<TaskId>) -> Vec<TaskId> {
        let mut pending: BTreeMap<TaskId, usize> = subset
            .iter()
            .map(|&id| {
                let deps = self
                    .graph
                    .upstream(id)
                    .iter()
                    .filter(|up| subset.contains(up))
                    .count();
                (id, deps)
            })
            .collect();
        let mut ready: BTreeSet<TaskId> = pending
            .iter()
            .filter(|(_, deps)| **deps == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut order = Vec::with_capacity(subset.len());
        while let Some(id) = ready.pop_first() {
            order.push(id);
            for down in self.graph.downstream(id) {
                if let Some(deps) = pending.get_mut(&down) {
                    *deps = deps.saturating_sub(1);
                    if *deps == 0 && subset.contains(&down) && !order.contains(&down) {
                        ready.insert(down);
                    }
                }
            }
            pending.remove(&id);
        }
        order
    }
}
