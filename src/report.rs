//! Terminal task statuses and the run summary.

use std::fmt;
use std::time::Duration;

use crate::executor::ExecError;
use crate::ir::TaskId;

/// Why a task was left out of the plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    /// A required program could not be found.
    ProgramUnavailable {
        /// The missing program.
        program: String,
    },
    /// Documentation tasks are being ignored.
    Documentation,
    /// An upstream task was ignored.
    UpstreamIgnored {
        /// Label of the ignored upstream task.
        upstream: String,
    },
}

impl fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProgramUnavailable { program } => write!(f, "program '{program}' not found"),
            Self::Documentation => f.write_str("documentation is ignored"),
            Self::UpstreamIgnored { upstream } => write!(f, "upstream '{upstream}' ignored"),
        }
    }
}

/// Why a task was not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// An upstream task failed or was skipped.
    UpstreamFailed,
    /// The build was cancelled before the task started.
    Cancelled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::UpstreamFailed => "upstream failed",
            Self::Cancelled => "cancelled",
        })
    }
}

/// Terminal state of a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    /// Nothing had to be done.
    UpToDate,
    /// The action ran and produced every target.
    Succeeded,
    /// The action or its checks failed.
    Failed,
    /// The task never started.
    Skipped(SkipReason),
    /// The task was excluded during planning.
    Ignored(IgnoreReason),
}

impl TaskStatus {
    /// Whether this status keeps the build successful.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::UpToDate | Self::Succeeded | Self::Ignored(_))
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UpToDate => f.write_str("up to date"),
            Self::Succeeded => f.write_str("succeeded"),
            Self::Failed => f.write_str("failed"),
            Self::Skipped(reason) => write!(f, "skipped ({reason})"),
            Self::Ignored(reason) => write!(f, "ignored ({reason})"),
        }
    }
}

/// Outcome of one task.
#[derive(Debug)]
pub struct TaskReport {
    /// The task.
    pub task: TaskId,
    /// Display label.
    pub label: String,
    /// The task's description, when it declares one.
    pub description: Option<String>,
    /// Terminal status.
    pub status: TaskStatus,
    /// Failure cause, for failed tasks.
    pub error: Option<ExecError>,
    /// Captured action output.
    pub output: String,
    /// Time spent in the task.
    pub duration: Duration,
}

/// Outcome of a whole build.
#[derive(Debug, Default)]
pub struct ExecutionReport {
    /// Per-task outcomes in plan order, ignored tasks last.
    pub tasks: Vec<TaskReport>,
    /// Whether the build was cancelled.
    pub cancelled: bool,
}

impl ExecutionReport {
    /// Status of `task`, if it was part of the build.
    #[must_use]
    pub fn status_of(&self, task: TaskId) -> Option<&TaskStatus> {
        self.tasks
            .iter()
            .find(|report| report.task == task)
            .map(|report| &report.status)
    }

    /// Status of the task labelled `label`.
    #[must_use]
    pub fn status_by_label(&self, label: &str) -> Option<&TaskStatus> {
        self.tasks
            .iter()
            .find(|report| report.label == label)
            .map(|report| &report.status)
    }

    /// Whether every task is up to date, succeeded or ignored.
    #[must_use]
    pub fn is_success(&self) -> bool {
        !self.cancelled && self.tasks.iter().all(|report| report.status.is_ok())
    }

    /// Count tasks whose status satisfies `pred`.
    pub fn count(&self, pred: impl Fn(&TaskStatus) -> bool) -> usize {
        self.tasks.iter().filter(|report| pred(&report.status)).count()
    }

    /// One-line count of tasks per terminal status.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut line = format!(
            "{} succeeded, {} up to date, {} failed, {} skipped, {} ignored",
            self.count(|s| *s == TaskStatus::Succeeded),
            self.count(|s| *s == TaskStatus::UpToDate),
            self.count(|s| *s == TaskStatus::Failed),
            self.count(|s| matches!(s, TaskStatus::Skipped(_))),
            self.count(|s| matches!(s, TaskStatus::Ignored(_))),
        );
        if self.cancelled {
            line.push_str(" (interrupted)");
        }
        line
    }

    /// Reports of failed tasks.
    pub fn failures(&self) -> impl Iterator<Item = &TaskReport> {
        self.tasks
            .iter()
            .filter(|report| report.status == TaskStatus::Failed)
    }
}

impl fmt::Display for ExecutionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for report in &self.tasks {
            write!(f, "{:<12} {}", short_status(&report.status), report.label)?;
            if let TaskStatus::Succeeded | TaskStatus::Failed = report.status {
                write!(f, " ({:.1?})", report.duration)?;
            }
            writeln!(f)?;
            if let Some(description) = &report.description {
                writeln!(f, "             {description}")?;
            }
            if let TaskStatus::Skipped(_) | TaskStatus::Ignored(_) = report.status {
                writeln!(f, "             {}", report.status)?;
            }
        }
        for report in self.failures() {
            writeln!(f)?;
            writeln!(f, "--- {} failed ---", report.label)?;
            if let Some(error) = &report.error {
                writeln!(f, "{error}")?;
            }
            let output = report.output.trim_end();
            if !output.is_empty() {
                writeln!(f, "{output}")?;
            }
        }
        writeln!(f)?;
        f.write_str(&self.summary())
    }
}

const fn short_status(status: &TaskStatus) -> &'static str {
    match status {
        TaskStatus::UpToDate => "up-to-date",
        TaskStatus::Succeeded => "succeeded",
        TaskStatus::Failed => "FAILED",
        TaskStatus::Skipped(_) => "skipped",
        TaskStatus::Ignored(_) => "ignored",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(id: usize, label: &str, status: TaskStatus) -> TaskReport {
        TaskReport {
            task: TaskId(id),
            label: label.into(),
            description: None,
            status,
            error: None,
            output: String::new(),
            duration: Duration::ZERO,
        }
    }

    #[test]
    fn ignored_tasks_keep_the_build_successful() {
        let run = ExecutionReport {
            tasks: vec![
                report(0, "a", TaskStatus::Succeeded),
                report(
                    1,
                    "b",
                    TaskStatus::Ignored(IgnoreReason::ProgramUnavailable {
                        program: "abaqus".into(),
                    }),
                ),
            ],
            cancelled: false,
        };
        assert!(run.is_success());
        assert_eq!(run.status_of(TaskId(0)), Some(&TaskStatus::Succeeded));
    }

    #[test]
    fn summary_lists_failures_with_output() {
        let mut failed = report(0, "mesh.inp", TaskStatus::Failed);
        failed.output = "segfault\n".into();
        let run = ExecutionReport {
            tasks: vec![
                failed,
                report(1, "solve.odb", TaskStatus::Skipped(SkipReason::UpstreamFailed)),
            ],
            cancelled: false,
        };
        assert!(!run.is_success());
        let text = run.to_string();
        assert!(text.contains("FAILED       mesh.inp"), "{text}");
        assert!(text.contains("skipped (upstream failed)"), "{text}");
        assert!(text.contains("--- mesh.inp failed ---\nsegfault"), "{text}");
        assert!(text.ends_with("0 succeeded, 0 up to date, 1 failed, 1 skipped, 0 ignored"));
    }

    #[test]
    fn run_tasks_show_duration_and_description() {
        let mut solved = report(0, "solve.odb", TaskStatus::Succeeded);
        solved.duration = Duration::from_millis(1500);
        solved.description = Some("Abaqus static solve".into());
        let run = ExecutionReport {
            tasks: vec![solved, report(1, "mesh.inp", TaskStatus::UpToDate)],
            cancelled: false,
        };
        let text = run.to_string();
        assert!(text.contains("succeeded    solve.odb (1.5s)\n"), "{text}");
        assert!(text.contains("             Abaqus static solve\n"), "{text}");
        assert!(text.contains("up-to-date   mesh.inp\n"), "{text}");
    }
}
