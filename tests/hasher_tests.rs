//! Signature stability and sensitivity.

use anyhow::{Context, Result, ensure};
use camino::Utf8PathBuf;
use rstest::rstest;
use simbuild::config::BuildConfig;
use simbuild::hasher::{Fingerprint, SignatureHasher};
use simbuild::ir::{BuildGraph, GraphBuilder, TaskDecl};
use simbuild::params::ParamValue;
use simbuild::locate::ProgramRegistry;

mod common;
use common::FixedLocator;

fn single(decl: TaskDecl) -> Result<BuildGraph> {
    let config = BuildConfig::new("/p");
    let mut builder = GraphBuilder::new(&config);
    builder.register_task(decl).context("register")?;
    builder.finalize().context("finalize")
}

fn signature_of(decl: TaskDecl, inputs: &[(Utf8PathBuf, Fingerprint)]) -> Result<Fingerprint> {
    let graph = single(decl)?;
    let task = graph.tasks().first().context("task")?;
    Ok(SignatureHasher::signature(
        task,
        &ProgramRegistry::default(),
        inputs,
    ))
}

#[rstest]
#[case(
    TaskDecl::command(["out"], ["touch ${TARGET}"]),
    "a1e4ac8c5b7f1cb172904e9a577c7d6164fcd2beafa641363e82a62cf9b85344"
)]
#[case(
    TaskDecl::command(["out"], ["touch ${TARGET} ${width}"])
        .with_param("width", ParamValue::Float(1.5)),
    "1fa8dd4239ea3ac934a906a10be019ba3a9eb9dfbac360907eb4323b426825f4"
)]
fn signatures_are_pinned(#[case] decl: TaskDecl, #[case] expected: &str) -> Result<()> {
    let signature = signature_of(decl, &[])?;
    ensure!(
        signature.as_str() == expected,
        "signature drifted: {}",
        signature.as_str()
    );
    Ok(())
}

#[rstest]
#[case(TaskDecl::command(["out"], ["touch ${TARGET} # changed"]))]
#[case(TaskDecl::command(["other"], ["touch ${TARGET}"]))]
#[case(TaskDecl::command(["out"], ["touch ${TARGET}", "true"]))]
fn action_and_targets_change_the_signature(#[case] changed: TaskDecl) -> Result<()> {
    let base = signature_of(TaskDecl::command(["out"], ["touch ${TARGET}"]), &[])?;
    let other = signature_of(changed, &[])?;
    ensure!(base != other, "signature ignored a change");
    Ok(())
}

#[test]
fn dropping_a_target_changes_the_signature() -> Result<()> {
    let both = signature_of(TaskDecl::command(["out", "out.log"], ["touch ${TARGETS}"]), &[])?;
    let one = signature_of(TaskDecl::command(["out"], ["touch ${TARGETS}"]), &[])?;
    ensure!(both != one, "target list was not hashed");
    Ok(())
}

#[test]
fn parameter_values_change_the_signature() -> Result<()> {
    let decl = |width: f64| {
        TaskDecl::command(["out"], ["touch ${TARGET} ${width}"])
            .with_param("width", ParamValue::Float(width))
    };
    ensure!(signature_of(decl(1.5), &[])? != signature_of(decl(2.5), &[])?);
    ensure!(signature_of(decl(1.5), &[])? == signature_of(decl(1.5), &[])?);
    Ok(())
}

#[test]
fn input_content_changes_the_signature() -> Result<()> {
    let decl = || TaskDecl::command(["out"], ["cp ${SOURCE} ${TARGET}"]).with_sources(["in.txt"]);
    let input = Utf8PathBuf::from("/p/in.txt");
    let first = signature_of(decl(), &[(input.clone(), Fingerprint::of_bytes(b"one"))])?;
    let second = signature_of(decl(), &[(input, Fingerprint::of_bytes(b"two"))])?;
    ensure!(first != second, "input content was not hashed");
    Ok(())
}

#[test]
fn resolved_program_path_changes_the_signature() -> Result<()> {
    let graph = single(
        TaskDecl::command(["out"], ["${program.mesher} ${TARGET}"]).requiring("mesher"),
    )?;
    let task = graph.tasks().first().context("task")?;
    let resolve = |path: &str| {
        let locator = FixedLocator::default().with("mesher", path);
        common::programs(&graph, &locator)
    };
    let old = SignatureHasher::signature(task, &resolve("/opt/v1/mesher"), &[]);
    let new = SignatureHasher::signature(task, &resolve("/opt/v2/mesher"), &[]);
    ensure!(old != new, "program path was not hashed");
    Ok(())
}

#[test]
fn empty_fingerprint_matches_sha256_of_nothing() {
    assert_eq!(
        Fingerprint::of_bytes(b"").as_str(),
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
}
