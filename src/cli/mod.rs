//! Command line interface definition using clap.
//!
//! [`Cli`] doubles as the layered configuration schema: values come from
//! defaults, a discovered `simbuild` configuration file (or the file named by
//! `SIMBUILD_CONFIG_PATH`), `SIMBUILD_*` environment variables and finally the
//! command line, merged through `ortho_config`.

use clap::parser::ValueSource;
use clap::{ArgMatches, Args, CommandFactory, FromArgMatches, Parser, Subcommand};
use ortho_config::declarative::LayerComposition;
use ortho_config::figment::{Figment, providers::Env};
use ortho_config::uncased::Uncased;
use ortho_config::{
    ConfigDiscovery, MergeComposer, OrthoConfig, OrthoMergeExt, OrthoResult, sanitize_value,
};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;

use camino::Utf8PathBuf;

use crate::config::{BuildConfig, InterruptPolicy};
use crate::manifest::MANIFEST_FILE_NAME;

mod parsing;

use parsing::parse_jobs;

/// Maximum number of jobs accepted by the CLI.
const MAX_JOBS: usize = 64;
const CONFIG_ENV_VAR: &str = "SIMBUILD_CONFIG_PATH";
const ENV_PREFIX: &str = "SIMBUILD_";

/// Flags whose CLI value only overrides lower layers when typed explicitly.
const EXPLICIT_ONLY: [&str; 6] = [
    "file",
    "verbose",
    "ignore_documentation",
    "unconditional_build",
    "accessible",
    "progress",
];

/// A signature-checked task build engine for simulation workflows.
#[derive(Debug, Parser, Serialize, Deserialize, OrthoConfig)]
#[command(author, version, about, long_about = None)]
#[ortho_config(prefix = "SIMBUILD")]
pub struct Cli {
    /// Path to the manifest file to use.
    #[arg(short, long, value_name = "FILE", default_value = MANIFEST_FILE_NAME)]
    #[ortho_config(default = default_manifest_path())]
    pub file: PathBuf,

    /// Run as if started in this directory.
    ///
    /// The directory is the project root: manifest lookup, relative sources
    /// and config discovery are resolved against it.
    #[arg(short = 'C', long, value_name = "DIR")]
    pub directory: Option<PathBuf>,

    /// Directory relative targets are built under (default `build`).
    #[arg(long, value_name = "DIR")]
    pub build_dir: Option<PathBuf>,

    /// Set the number of parallel workers.
    ///
    /// Values must be between 1 and 64; defaults to the available
    /// parallelism.
    #[arg(short, long, value_name = "N", value_parser = parse_jobs)]
    pub jobs: Option<usize>,

    /// Enable verbose diagnostic logging.
    #[arg(short, long)]
    #[ortho_config(default = false)]
    pub verbose: bool,

    /// Ignore tasks marked as documentation builds.
    #[arg(long)]
    #[ortho_config(default = false)]
    pub ignore_documentation: bool,

    /// Run tasks even when a program they require was not found.
    #[arg(long)]
    #[ortho_config(default = false)]
    pub unconditional_build: bool,

    /// What to do with running commands on Ctrl-C.
    #[arg(long, value_enum, value_name = "POLICY")]
    pub on_interrupt: Option<InterruptPolicy>,

    /// Force accessible output mode on or off (overrides auto-detection).
    #[arg(long)]
    pub accessible: Option<bool>,

    /// Force progress bars on or off in standard mode.
    #[arg(long)]
    pub progress: Option<bool>,

    /// Optional subcommand to execute; defaults to `build` when omitted.
    ///
    /// `OrthoConfig` merging ignores this field; CLI parsing supplies it.
    #[serde(skip)]
    #[command(subcommand)]
    #[ortho_config(skip_cli)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Apply the default command if none was specified.
    #[must_use]
    pub fn with_default_command(mut self) -> Self {
        if self.command.is_none() {
            self.command = Some(Commands::Build(TargetArgs::default()));
        }
        self
    }

    /// Assemble the immutable build settings rooted at `root`.
    #[must_use]
    pub fn build_config(&self, root: Utf8PathBuf) -> BuildConfig {
        let jobs = self
            .jobs
            .and_then(NonZeroUsize::new)
            .or_else(|| std::thread::available_parallelism().ok())
            .unwrap_or(NonZeroUsize::MIN);
        let config = BuildConfig::new(root)
            .with_jobs(jobs)
            .with_ignore_documentation(self.ignore_documentation)
            .with_unconditional_build(self.unconditional_build)
            .with_interrupt_policy(self.on_interrupt.unwrap_or_default());
        match self
            .build_dir
            .as_deref()
            .and_then(camino::Utf8Path::from_path)
        {
            Some(dir) => config.with_build_dir(dir),
            None => config,
        }
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            file: default_manifest_path(),
            directory: None,
            build_dir: None,
            jobs: None,
            verbose: false,
            ignore_documentation: false,
            unconditional_build: false,
            on_interrupt: None,
            accessible: None,
            progress: None,
            command: None,
        }
        .with_default_command()
    }
}

/// Names accepted by `build`, `plan` and `clean`.
#[derive(Debug, Args, PartialEq, Eq, Clone, Default, Serialize, Deserialize)]
pub struct TargetArgs {
    /// Aliases or targets; the manifest defaults apply when empty.
    #[serde(default)]
    pub names: Vec<String>,
}

/// Available top-level commands.
#[derive(Debug, Subcommand, PartialEq, Eq, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Commands {
    /// Build the named aliases or targets (or the defaults).
    Build(TargetArgs),

    /// Show which tasks would run without running them.
    Plan(TargetArgs),

    /// Print the dependency graph in DOT format.
    Graph,

    /// List the default targets and every alias.
    Aliases,

    /// Remove built targets and forget their signatures.
    Clean(TargetArgs),
}

fn default_manifest_path() -> PathBuf {
    PathBuf::from(MANIFEST_FILE_NAME)
}

/// Parse CLI arguments, returning the parsed struct and the matches needed
/// for configuration merging.
///
/// # Errors
///
/// Returns a `clap::Error` when parsing fails.
pub fn parse_from<I, T>(iter: I) -> Result<(Cli, ArgMatches), clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let mut command = Cli::command();
    let matches = command.try_get_matches_from_mut(iter)?;
    let matches_for_merge = matches.clone();
    let mut matches_for_parse = matches;
    let cli = Cli::from_arg_matches_mut(&mut matches_for_parse)
        .map_err(|err| err.with_cmd(&command))?;
    Ok((cli, matches_for_merge))
}

fn env_provider() -> Env {
    Env::prefixed(ENV_PREFIX)
}

fn config_discovery(directory: Option<&PathBuf>) -> ConfigDiscovery {
    let mut builder = ConfigDiscovery::builder("simbuild").env_var(CONFIG_ENV_VAR);
    if let Some(dir) = directory {
        builder = builder.clear_project_roots().add_project_root(dir);
    }
    builder.build()
}

fn is_empty_value(value: &serde_json::Value) -> bool {
    matches!(value, serde_json::Value::Object(map) if map.is_empty())
}

fn cli_overrides_from_matches(cli: &Cli, matches: &ArgMatches) -> OrthoResult<serde_json::Value> {
    let value = sanitize_value(cli)?;
    let mut map = match value {
        serde_json::Value::Object(map) => map,
        other => {
            return Err(Arc::new(ortho_config::OrthoError::Validation {
                key: String::from("cli"),
                message: format!(
                    "expected parsed CLI values to serialize to an object, got {other:?}"
                ),
            }));
        }
    };

    map.remove("command");
    for field in EXPLICIT_ONLY {
        if matches.value_source(field) != Some(ValueSource::CommandLine) {
            map.remove(field);
        }
    }
    Ok(serde_json::Value::Object(map))
}

/// Merge configuration layers under the parsed CLI values.
///
/// # Errors
///
/// Returns an [`ortho_config::OrthoError`] if layer composition or merging
/// fails.
pub fn merge_with_config(cli: &Cli, matches: &ArgMatches) -> OrthoResult<Cli> {
    let command = cli.command.clone();
    let mut errors = Vec::new();
    let mut composer = MergeComposer::with_capacity(4);

    match sanitize_value(&Cli::default()) {
        Ok(value) => composer.push_defaults(value),
        Err(err) => errors.push(err),
    }

    let discovery = config_discovery(cli.directory.as_ref());
    let mut file_layers = discovery.compose_layers();
    errors.append(&mut file_layers.required_errors);
    if file_layers.value.is_empty() {
        errors.append(&mut file_layers.optional_errors);
    }
    for layer in file_layers.value {
        composer.push_layer(layer);
    }

    let env_provider = env_provider()
        .map(|key| Uncased::new(key.as_str().to_ascii_uppercase()))
        .split("__");
    match Figment::from(env_provider)
        .extract::<serde_json::Value>()
        .into_ortho_merge()
    {
        Ok(value) => composer.push_environment(value),
        Err(err) => errors.push(err),
    }

    match cli_overrides_from_matches(cli, matches) {
        Ok(value) if !is_empty_value(&value) => composer.push_cli(value),
        Ok(_) => {}
        Err(err) => errors.push(err),
    }

    let composition = LayerComposition::new(composer.layers(), errors);
    let mut merged = composition.into_merge_result(Cli::merge_from_layers)?;
    merged.command = command;
    Ok(merged)
}
