//! Typed task parameters.
//!
//! Parameters are the named values a task substitutes into its action
//! template. Each value keeps its type so signatures distinguish `1` from
//! `"1"`, and path values can be resolved against the project root before
//! they reach a command line.
//!
//! ```
//! use simbuild::params::ParamValue;
//!
//! let width: ParamValue = serde_json::from_str("1.5").expect("parse");
//! assert_eq!(width.to_string(), "1.5");
//! assert_eq!(ParamValue::Float(2.0).to_string(), "2.0");
//! ```

use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered mapping of parameter names to values, in declaration order.
pub type Parameters = IndexMap<String, ParamValue>;

/// A single parameter value.
///
/// YAML scalars deserialise to [`ParamValue::Integer`], [`ParamValue::Float`]
/// or [`ParamValue::String`]; a mapping with a single `path` key yields
/// [`ParamValue::Path`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// A signed integer.
    Integer(i64),
    /// A floating point number.
    Float(f64),
    /// A filesystem path, resolved against the project root when rendered.
    Path {
        /// The declared path.
        path: Utf8PathBuf,
    },
    /// Free-form text inserted verbatim.
    String(String),
}

impl ParamValue {
    /// Short tag naming the value's type, used when hashing signatures.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Integer(_) => "int",
            Self::Float(_) => "float",
            Self::Path { .. } => "path",
            Self::String(_) => "str",
        }
    }

    /// Render the value for substitution, resolving relative paths under
    /// `root`.
    #[must_use]
    pub fn render(&self, root: &Utf8Path) -> String {
        match self {
            Self::Path { path } if path.is_relative() => root.join(path).into_string(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(value) => write!(f, "{value}"),
            Self::Float(value) => {
                let text = value.to_string();
                f.write_str(&text)?;
                // Whole floats keep their decimal point.
                if text.bytes().all(|b| b.is_ascii_digit() || b == b'-') {
                    f.write_str(".0")?;
                }
                Ok(())
            }
            Self::Path { path } => f.write_str(path.as_str()),
            Self::String(value) => f.write_str(value),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<Utf8PathBuf> for ParamValue {
    fn from(path: Utf8PathBuf) -> Self {
        Self::Path { path }
    }
}
