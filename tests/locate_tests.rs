//! Program probing against the process `PATH`.

use anyhow::{Context, Result, ensure};
use indexmap::IndexMap;
use rstest::rstest;
use serial_test::serial;
use simbuild::locate::{PathLocator, ProgramLocator, ProgramRegistry};
use test_support::{PathGuard, Project, fake_program};

mod common;
use common::project;

#[rstest]
#[serial]
fn first_available_candidate_wins(project: Project) -> Result<()> {
    let newer = fake_program(project.bin(), "abq2024", "exit 0")?;
    fake_program(project.bin(), "abaqus", "exit 0")?;
    let _path = PathGuard::only(project.bin());

    let declared = IndexMap::from([(
        "abaqus".to_owned(),
        vec!["abq2025".to_owned(), "abq2024".to_owned(), "abaqus".to_owned()],
    )]);
    let locator = PathLocator::from_env(project.root());
    let registry = ProgramRegistry::resolve(&declared, ["abaqus", "cubit"], &locator);

    ensure!(registry.path("abaqus") == Some(newer.as_path()));
    ensure!(!registry.is_available("cubit"));
    ensure!(registry.invocation("cubit") == "cubit");
    Ok(())
}

#[rstest]
#[serial]
fn prepended_directory_shadows_later_entries(project: Project) -> Result<()> {
    let other = Project::new();
    fake_program(other.bin(), "mesher", "exit 0")?;
    let ours = fake_program(project.bin(), "mesher", "exit 0")?;
    let _outer = PathGuard::prepend(other.bin());
    let _inner = PathGuard::prepend(project.bin());

    let locator = PathLocator::from_env(project.root());
    let found = locator.locate("mesher").context("mesher on PATH")?;
    ensure!(found == ours, "found {found}");
    Ok(())
}

#[cfg(unix)]
#[rstest]
#[serial]
fn non_executable_files_are_not_programs(project: Project) -> Result<()> {
    project.write("bin/solver", "#!/bin/sh\n");
    let _path = PathGuard::only(project.bin());
    let locator = PathLocator::from_env(project.root());
    ensure!(locator.locate("solver").is_none());
    Ok(())
}
