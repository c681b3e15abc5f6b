//! Manifest-to-graph lowering.

use camino::Utf8PathBuf;

use crate::ast::{Recipe, ScanSpec, SimbuildManifest, StringOrList, TaskSpec};
use crate::config::BuildConfig;
use crate::scan::ScanRule;

use super::builder::{ActionSpec, GraphBuilder, TaskDecl};
use super::error::GraphError;
use super::graph::BuildGraph;

impl BuildGraph {
    /// Register every task, alias and default of `manifest` and finalise the
    /// graph.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError`] for any invalid task declaration, unknown alias
    /// member or default, or dependency cycle.
    pub fn from_manifest(
        manifest: &SimbuildManifest,
        config: &BuildConfig,
    ) -> Result<Self, GraphError> {
        let mut builder = GraphBuilder::new(config);
        for spec in &manifest.tasks {
            let handle = builder.register_task(to_decl(spec)?)?;
            if let Some(alias) = &spec.alias {
                builder.register_task_alias(alias.clone(), handle);
            }
        }
        for (name, members) in &manifest.aliases {
            builder.register_alias(name.clone(), members.iter());
        }
        for name in &manifest.defaults {
            builder.add_default(name.clone());
        }
        builder.finalize()
    }
}

fn to_paths(list: &StringOrList) -> Vec<Utf8PathBuf> {
    list.iter().map(Utf8PathBuf::from).collect()
}

fn to_scan_rule(spec: &TaskSpec, scan: &ScanSpec) -> Result<ScanRule, GraphError> {
    match scan {
        ScanSpec::Preset(name) => {
            ScanRule::preset(name).ok_or_else(|| GraphError::UnknownScanner {
                task: spec.targets.iter().next().unwrap_or_default().to_owned(),
                name: name.clone(),
            })
        }
        ScanSpec::Pattern {
            pattern,
            suffixes,
            ignore_case,
        } => Ok(ScanRule {
            pattern: pattern.clone(),
            suffixes: suffixes.to_vec(),
            ignore_case: *ignore_case,
        }),
    }
}

fn to_decl(spec: &TaskSpec) -> Result<TaskDecl, GraphError> {
    let action = match &spec.recipe {
        Recipe::Command { command } => ActionSpec::Command(command.to_vec()),
        Recipe::Copy => ActionSpec::Copy,
        Recipe::Substitute { prefix, postfix } => ActionSpec::Substitute {
            prefix: prefix.clone(),
            postfix: postfix.clone(),
        },
    };
    let scan = spec
        .scan
        .as_ref()
        .map(|scan| to_scan_rule(spec, scan))
        .transpose()?;
    Ok(TaskDecl {
        targets: to_paths(&spec.targets),
        sources: to_paths(&spec.sources),
        depends: to_paths(&spec.depends),
        action,
        post_actions: spec.post_action.to_vec(),
        params: spec.params.clone(),
        required_programs: spec.requires.iter().map(str::to_owned).collect(),
        documentation: spec.documentation,
        description: spec.description.clone(),
        capture_stdout: spec.stdout,
        scan,
    })
}
