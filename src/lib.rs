//! Simbuild core library.
//!
//! Simbuild turns a `Simbuildfile` of tasks (targets, sources, an action and
//! typed parameters) into an ordered, incrementally rebuilt execution plan.
//! Staleness is decided by content signatures rather than timestamps, tasks
//! whose programs are missing are ignored instead of failing, and a failed
//! task only stops its own downstream subtree.
//!
//! The pipeline is: [`manifest`] → [`ir`] (graph builder) → [`locate`] →
//! [`plan`] → [`executor`], with [`runner`] wiring it to the [`cli`].

pub mod ast;
pub mod cancel;
pub mod cli;
pub mod config;
pub mod dot;
pub mod executor;
pub mod hasher;
pub mod ir;
pub mod manifest;
pub mod output_mode;
pub mod params;
pub mod plan;
pub mod locate;
pub mod report;
pub mod runner;
pub mod scan;
pub mod staleness;
pub mod state;
pub mod status;
