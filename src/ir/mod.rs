//! Intermediate representation of the task graph.
//!
//! Tasks are registered one at a time through [`GraphBuilder`], which
//! validates each declaration as it arrives. [`GraphBuilder::finalize`] then
//! links sources to producers, resolves aliases and rejects cycles, yielding
//! an immutable [`BuildGraph`] that planning and execution only read.
//!
//! # Examples
//!
//! ```
//! use simbuild::config::BuildConfig;
//! use simbuild::ir::{GraphBuilder, TaskDecl};
//!
//! let config = BuildConfig::new("/proj");
//! let mut builder = GraphBuilder::new(&config);
//! builder
//!     .register_task(TaskDecl::command(["geometry.cae"], ["touch ${TARGET}"]))
//!     .expect("register");
//! builder
//!     .register_task(
//!         TaskDecl::command(["mesh.inp"], ["mesher ${SOURCE} > ${TARGET}"])
//!             .with_sources(["geometry.cae"]),
//!     )
//!     .expect("register");
//! let graph = builder.finalize().expect("finalize");
//! assert_eq!(graph.tasks().len(), 2);
//! ```

mod builder;
mod cycle;
mod error;
mod from_manifest;
mod graph;
mod template;

pub use builder::{ActionSpec, GraphBuilder, TaskDecl, TaskHandle};
pub use error::GraphError;
pub use graph::{Action, BuildGraph, Node, Task, TaskId};
pub use template::{ActionTemplate, Builtin, Placeholder, RenderContext, TemplateError};
