//! Immutable build configuration.
//!
//! A [`BuildConfig`] replaces a shared, mutable construction environment: it
//! is assembled once from the command line (or by library callers) and passed
//! by reference into graph registration, planning and execution.

use camino::{Utf8Path, Utf8PathBuf};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;

/// Name of the signature state file kept inside the build directory.
pub const STATE_FILE_NAME: &str = ".simbuild-state.json";

/// What to do with running actions when the build is interrupted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum InterruptPolicy {
    /// Let running actions finish; only unstarted tasks are cancelled.
    Wait,
    /// Kill running actions and report them as failed.
    #[default]
    Terminate,
}

/// Settings shared by every stage of a build invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildConfig {
    root: Utf8PathBuf,
    build_dir: Utf8PathBuf,
    jobs: NonZeroUsize,
    unconditional_build: bool,
    ignore_documentation: bool,
    interrupt_policy: InterruptPolicy,
}

impl BuildConfig {
    /// Create a configuration rooted at `root` with the build directory at
    /// `root/build` and one worker.
    ///
    /// A relative `root` is kept as given; callers wanting absolute command
    /// paths should pass an absolute root.
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        let root_dir = root.into();
        let build_dir = root_dir.join("build");
        Self {
            root: root_dir,
            build_dir,
            jobs: NonZeroUsize::MIN,
            unconditional_build: false,
            ignore_documentation: false,
            interrupt_policy: InterruptPolicy::default(),
        }
    }

    /// Place the build directory at `dir`, resolved under the root when
    /// relative.
    #[must_use]
    pub fn with_build_dir(mut self, dir: impl AsRef<Utf8Path>) -> Self {
        self.build_dir = self.root.join(dir.as_ref());
        self
    }

    /// Set the number of parallel workers.
    #[must_use]
    pub const fn with_jobs(mut self, jobs: NonZeroUsize) -> Self {
        self.jobs = jobs;
        self
    }

    /// Run tasks even when their required programs are unavailable.
    #[must_use]
    pub const fn with_unconditional_build(mut self, enabled: bool) -> Self {
        self.unconditional_build = enabled;
        self
    }

    /// Ignore tasks flagged as documentation builds.
    #[must_use]
    pub const fn with_ignore_documentation(mut self, enabled: bool) -> Self {
        self.ignore_documentation = enabled;
        self
    }

    /// Choose how running actions react to an interrupt.
    #[must_use]
    pub const fn with_interrupt_policy(mut self, policy: InterruptPolicy) -> Self {
        self.interrupt_policy = policy;
        self
    }

    /// Project root used to resolve external sources.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Directory that relative targets are placed under.
    #[must_use]
    pub fn build_dir(&self) -> &Utf8Path {
        &self.build_dir
    }

    /// Number of parallel workers.
    #[must_use]
    pub const fn jobs(&self) -> NonZeroUsize {
        self.jobs
    }

    /// Whether unavailable programs still force their tasks to run.
    #[must_use]
    pub const fn unconditional_build(&self) -> bool {
        self.unconditional_build
    }

    /// Whether documentation tasks are ignored.
    #[must_use]
    pub const fn ignore_documentation(&self) -> bool {
        self.ignore_documentation
    }

    /// Policy applied to running actions on interrupt.
    #[must_use]
    pub const fn interrupt_policy(&self) -> InterruptPolicy {
        self.interrupt_policy
    }

    /// Location of the persisted signature records.
    #[must_use]
    pub fn state_path(&self) -> Utf8PathBuf {
        self.build_dir.join(STATE_FILE_NAME)
    }

    /// Resolve a declared target path under the build directory.
    #[must_use]
    pub fn target_path(&self, declared: &Utf8Path) -> Utf8PathBuf {
        self.build_dir.join(declared)
    }

    /// Resolve a declared external path under the project root.
    #[must_use]
    pub fn external_path(&self, declared: &Utf8Path) -> Utf8PathBuf {
        self.root.join(declared)
    }
}
