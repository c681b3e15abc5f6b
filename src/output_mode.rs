//! Output mode detection and status reporter selection.
//!
//! Accessible mode prints static, labelled lines suitable for screen readers,
//! dumb terminals and CI logs. It is chosen explicitly with `--accessible` or
//! detected from `NO_COLOR` and `TERM=dumb`.

use std::env;

use crate::status::{AccessibleReporter, IndicatifReporter, SilentReporter, StatusReporter};

/// Whether terminal output should use static text or progress bars.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Static text output with explicit labels.
    Accessible,
    /// Standard terminal output with progress bars.
    Standard,
}

impl OutputMode {
    /// Return `true` when the mode is [`Accessible`](OutputMode::Accessible).
    #[must_use]
    pub const fn is_accessible(self) -> bool {
        matches!(self, Self::Accessible)
    }

    /// Pick the reporter for this mode.
    ///
    /// Accessible mode always reports; standard mode shows progress bars
    /// unless `progress` is false.
    #[must_use]
    pub fn reporter(self, progress: bool) -> Box<dyn StatusReporter> {
        match (self, progress) {
            (Self::Accessible, _) => Box::new(AccessibleReporter),
            (Self::Standard, true) => Box::new(IndicatifReporter::new()),
            (Self::Standard, false) => Box::new(SilentReporter),
        }
    }
}

/// Resolve the output mode from an explicit choice and the environment.
///
/// An explicit value wins. Otherwise `NO_COLOR` (set to anything, even
/// empty) or `TERM=dumb` selects accessible mode.
///
/// # Examples
///
/// ```
/// use simbuild::output_mode::{OutputMode, resolve};
///
/// assert_eq!(resolve(Some(true)), OutputMode::Accessible);
/// assert_eq!(resolve(Some(false)), OutputMode::Standard);
/// ```
#[must_use]
pub fn resolve(explicit: Option<bool>) -> OutputMode {
    resolve_with(explicit, |key| env::var(key).ok())
}

/// [`resolve`] with an injectable environment lookup.
#[must_use]
pub fn resolve_with<F>(explicit: Option<bool>, read_env: F) -> OutputMode
where
    F: Fn(&str) -> Option<String>,
{
    let accessible = explicit.unwrap_or_else(|| {
        read_env("NO_COLOR").is_some() || read_env("TERM").as_deref() == Some("dumb")
    });
    if accessible {
        OutputMode::Accessible
    } else {
        OutputMode::Standard
    }
}
