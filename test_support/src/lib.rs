//! Test utilities for simbuild.
//!
//! Provides fake program stubs, manifest writers, a throwaway project
//! directory and guards that serialise and restore environment changes.

pub mod env_lock;
pub mod exec;
pub mod manifest;
pub mod path_guard;
pub mod project;

pub use env_lock::EnvLock;
pub use exec::{fake_program, make_executable, recording_program};
pub use manifest::{manifest_yaml, write_manifest};
pub use path_guard::PathGuard;
pub use project::Project;
