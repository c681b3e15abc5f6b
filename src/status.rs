//! Pipeline and task status reporting for accessible and standard output
//! modes.
//!
//! This module provides a [`StatusReporter`] trait plus concrete reporters
//! for accessibility-first textual output and standard terminal progress
//! output. Standard mode uses `indicatif::MultiProgress` to keep stage
//! summaries persistent while the pipeline advances, and adds a task bar
//! during execution. Reporters are shared with executor worker threads and
//! must be `Sync`.

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

use crate::report::TaskStatus;

fn stage_label(current: u32, total: u32, description: &str) -> String {
    format!("Stage {current}/{total}: {description}")
}

fn stage_summary(state: &str, current: u32, total: u32, description: &str) -> String {
    format!("[{state}] {}", stage_label(current, total, description))
}

/// Report pipeline and task progress to the user.
pub trait StatusReporter: Sync {
    /// Emit a status update for the given pipeline stage.
    fn report_stage(&self, current: u32, total: u32, description: &str);

    /// A task's action is about to run.
    fn task_started(&self, label: &str);

    /// A task reached a terminal state; `done` of `total` tasks are finished.
    fn task_finished(&self, label: &str, status: &TaskStatus, done: usize, total: usize);

    /// Emit a completion message once the pipeline has finished.
    fn report_complete(&self, summary: &str);
}

/// Accessible reporter: writes static, labelled lines to stderr.
pub struct AccessibleReporter;

impl StatusReporter for AccessibleReporter {
    fn report_stage(&self, current: u32, total: u32, description: &str) {
        let message = stage_label(current, total, description);
        // Status output failures must not abort the build.
        drop(writeln!(io::stderr(), "{message}"));
    }

    fn task_started(&self, label: &str) {
        drop(writeln!(io::stderr(), "Running: {label}"));
    }

    fn task_finished(&self, label: &str, status: &TaskStatus, done: usize, total: usize) {
        drop(writeln!(io::stderr(), "Task {done}/{total}: {label} {status}"));
    }

    fn report_complete(&self, summary: &str) {
        drop(writeln!(io::stderr(), "Build complete: {summary}"));
    }
}

/// Silent reporter: emits nothing.
pub struct SilentReporter;

impl StatusReporter for SilentReporter {
    fn report_stage(&self, _current: u32, _total: u32, _description: &str) {}
    fn task_started(&self, _label: &str) {}
    fn task_finished(&self, _label: &str, _status: &TaskStatus, _done: usize, _total: usize) {}
    fn report_complete(&self, _summary: &str) {}
}

#[derive(Debug)]
struct IndicatifState {
    progress: MultiProgress,
    bars: Vec<ProgressBar>,
    task_bar: Option<ProgressBar>,
    running_index: Option<usize>,
    completed: bool,
    is_hidden: bool,
}

/// Standard reporter backed by `indicatif::MultiProgress`.
pub struct IndicatifReporter {
    state: Mutex<IndicatifState>,
}

impl IndicatifReporter {
    /// Construct an `indicatif` reporter with one persistent line per stage.
    #[must_use]
    pub fn new() -> Self {
        let progress = MultiProgress::with_draw_target(ProgressDrawTarget::stderr_with_hz(12));
        progress.set_move_cursor(false);
        let style = ProgressStyle::with_template("{msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());

        let mut bars = Vec::with_capacity(PipelineStage::ALL.len());
        for stage in PipelineStage::ALL {
            let bar = progress.add(ProgressBar::new(1));
            bar.set_style(style.clone());
            bar.set_message(stage_summary(
                "pending",
                stage.index(),
                PIPELINE_STAGE_COUNT,
                stage.description(),
            ));
            bars.push(bar);
        }

        Self {
            state: Mutex::new(IndicatifState {
                is_hidden: progress.is_hidden(),
                progress,
                bars,
                task_bar: None,
                running_index: None,
                completed: false,
            }),
        }
    }

    fn set_stage_state(state: &IndicatifState, index: usize, status: &str, finish_line: bool) {
        let Ok(current) = u32::try_from(index + 1) else {
            return;
        };
        let description = PipelineStage::from_index(current).map_or("", PipelineStage::description);
        let message = stage_summary(status, current, PIPELINE_STAGE_COUNT, description);
        if state.is_hidden {
            drop(writeln!(io::stderr(), "{message}"));
            return;
        }
        if let Some(bar) = state.bars.get(index) {
            if finish_line {
                bar.finish_with_message(message);
            } else {
                bar.set_message(message);
            }
        }
    }

    fn task_bar(state: &mut IndicatifState, total: usize) -> Option<&ProgressBar> {
        if state.is_hidden {
            return None;
        }
        if state.task_bar.is_none() {
            let style = ProgressStyle::with_template("{bar:30} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar());
            let bar = state
                .progress
                .add(ProgressBar::new(u64::try_from(total).unwrap_or(u64::MAX)));
            bar.set_style(style);
            state.task_bar = Some(bar);
        }
        state.task_bar.as_ref()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, IndicatifState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for IndicatifReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for IndicatifReporter {
    fn drop(&mut self) {
        let mut state = self.lock();
        if state.completed {
            return;
        }
        if let Some(index) = state.running_index.take() {
            Self::set_stage_state(&state, index, "failed", true);
        }
        if let Some(bar) = state.task_bar.take() {
            bar.abandon();
        }
    }
}

impl StatusReporter for IndicatifReporter {
    fn report_stage(&self, current: u32, _total: u32, _description: &str) {
        let Ok(index) = usize::try_from(current.saturating_sub(1)) else {
            return;
        };
        let mut state = self.lock();
        if index >= state.bars.len() {
            return;
        }
        if let Some(previous) = state.running_index
            && previous != index
        {
            Self::set_stage_state(&state, previous, "done", true);
        }
        Self::set_stage_state(&state, index, "running", false);
        state.running_index = Some(index);
    }

    fn task_started(&self, label: &str) {
        let state = self.lock();
        if let Some(bar) = &state.task_bar {
            bar.set_message(label.to_owned());
        }
    }

    fn task_finished(&self, label: &str, status: &TaskStatus, done: usize, total: usize) {
        let mut state = self.lock();
        let hidden = state.is_hidden;
        if let Some(bar) = Self::task_bar(&mut state, total) {
            bar.set_position(u64::try_from(done).unwrap_or(u64::MAX));
            bar.set_message(format!("{label} {status}"));
        }
        if hidden {
            drop(writeln!(io::stderr(), "Task {done}/{total}: {label} {status}"));
        }
    }

    fn report_complete(&self, summary: &str) {
        let mut state = self.lock();
        if let Some(index) = state.running_index.take() {
            Self::set_stage_state(&state, index, "done", true);
        }
        if let Some(bar) = state.task_bar.take() {
            bar.finish_and_clear();
        }
        state.completed = true;
        drop(writeln!(io::stderr(), "Build complete: {summary}"));
    }
}

/// Enumerates the pipeline stages in reporting order.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PipelineStage {
    /// Stage 1: read and parse the manifest.
    ManifestIngestion = 1,
    /// Stage 2: register tasks and validate the graph.
    GraphConstruction = 2,
    /// Stage 3: locate required programs.
    ProgramLocator = 3,
    /// Stage 4: assemble the build plan.
    Planning = 4,
    /// Stage 5: run stale tasks.
    Execution = 5,
}

/// The total number of pipeline stages reported during a build.
pub const PIPELINE_STAGE_COUNT: u32 = 5;

const _: () = assert!(
    PipelineStage::ALL.len() == PIPELINE_STAGE_COUNT as usize,
    "PipelineStage::ALL length must equal PIPELINE_STAGE_COUNT"
);

impl PipelineStage {
    /// All pipeline stages in reporting order.
    pub const ALL: [Self; 5] = [
        Self::ManifestIngestion,
        Self::GraphConstruction,
        Self::ProgramLocator,
        Self::Planning,
        Self::Execution,
    ];

    /// 1-based index of this stage within the pipeline.
    #[must_use]
    pub const fn index(self) -> u32 {
        self as u32
    }

    /// Convert a 1-based stage index into a [`PipelineStage`].
    #[must_use]
    pub const fn from_index(index: u32) -> Option<Self> {
        match index {
            1 => Some(Self::ManifestIngestion),
            2 => Some(Self::GraphConstruction),
            3 => Some(Self::ProgramLocator),
            4 => Some(Self::Planning),
            5 => Some(Self::Execution),
            _ => None,
        }
    }

    /// Human-readable description of this stage.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::ManifestIngestion => "Reading manifest",
            Self::GraphConstruction => "Building task graph",
            Self::ProgramLocator => "Locating programs",
            Self::Planning => "Planning build",
            Self::Execution => "Running tasks",
        }
    }
}

/// Report a pipeline stage via a [`StatusReporter`].
pub fn report_pipeline_stage(reporter: &dyn StatusReporter, stage: PipelineStage) {
    reporter.report_stage(stage.index(), PIPELINE_STAGE_COUNT, stage.description());
}
