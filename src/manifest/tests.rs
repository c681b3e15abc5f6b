use super::*;
use rstest::{fixture, rstest};
use tempfile::TempDir;

#[fixture]
fn project() -> (TempDir, Utf8PathBuf) {
    let dir = TempDir::new().expect("temp dir");
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 root");
    fs::create_dir_all(root.join("source")).expect("mkdir");
    for name in ["b.py", "a.py", "notes.txt"] {
        fs::write(root.join("source").join(name), "").expect("write");
    }
    (dir, root)
}

const HEADER: &str = "simbuild_version: \"1.0.0\"\n";

#[test]
fn parses_minimal_manifest() {
    let manifest = from_str(HEADER).expect("parse");
    assert!(manifest.tasks.is_empty());
    assert!(manifest.defaults.is_empty());
}

#[rstest]
#[case("0.9.0")]
#[case("2.0.0")]
fn rejects_other_major_versions(#[case] version: &str) {
    let err = from_str(&format!("simbuild_version: \"{version}\"\n")).expect_err("version");
    assert!(matches!(err, ManifestError::UnsupportedVersion { .. }), "{err:?}");
}

#[test]
fn parse_errors_name_the_manifest() {
    let err = from_str("simbuild_version: [").expect_err("parse");
    assert!(matches!(err, ManifestError::Parse { ref name, .. } if name == MANIFEST_FILE_NAME));
}

#[test]
fn task_without_action_is_rejected() {
    let yaml = format!("{HEADER}tasks:\n  - targets: a\n");
    let err = from_str(&yaml).expect_err("no action");
    let ManifestError::Parse { source, .. } = err else {
        panic!("expected parse error");
    };
    assert!(source.to_string().contains("missing one of command"));
}

#[test]
fn misspelt_task_key_is_rejected_with_a_hint() {
    let yaml = format!(
        "{HEADER}tasks:\n  - targets: job.odb\n    command: \"${{program.abaqus}} job\"\n    requieres: abaqus\n"
    );
    let err = from_str(&yaml).expect_err("typo");
    let ManifestError::Parse { source, .. } = err else {
        panic!("expected parse error");
    };
    assert!(source.to_string().contains("unknown field `requieres`"), "{source}");
    let help = source.help().map(|h| h.to_string()).unwrap_or_default();
    assert!(help.contains("typos"), "{help}");
}

#[rstest]
fn expands_globs_sorted_and_relative(project: (TempDir, Utf8PathBuf)) {
    let (_dir, root) = project;
    let matches = glob_paths("source/*.py", &root).expect("glob");
    assert_eq!(matches, vec!["source/a.py", "source/b.py"]);
}

#[rstest]
fn empty_glob_is_an_error(project: (TempDir, Utf8PathBuf)) {
    let (_dir, root) = project;
    let err = glob_paths("source/*.f90", &root).expect_err("no match");
    assert!(matches!(err, ManifestError::EmptyGlob { ref pattern } if pattern == "source/*.f90"));
}

#[rstest]
fn invalid_glob_is_an_error(project: (TempDir, Utf8PathBuf)) {
    let (_dir, root) = project;
    let err = glob_paths("source/[", &root).expect_err("invalid");
    assert!(matches!(err, ManifestError::InvalidGlob { .. }));
}

#[rstest]
fn from_path_expands_task_sources(project: (TempDir, Utf8PathBuf)) {
    let (_dir, root) = project;
    let path = root.join(MANIFEST_FILE_NAME);
    fs::write(
        &path,
        format!(
            "{HEADER}tasks:\n  - targets: out\n    sources: [source/notes.txt, \"source/*.py\"]\n    command: \"cat ${{SOURCES}} > ${{TARGET}}\"\n"
        ),
    )
    .expect("write manifest");

    let manifest = from_path(&path, &root).expect("load");
    let task = manifest.tasks.first().expect("task");
    assert_eq!(
        task.sources.to_vec(),
        vec!["source/notes.txt", "source/a.py", "source/b.py"]
    );
}

#[test]
fn missing_file_is_a_read_error() {
    let err = from_path(Utf8Path::new("/definitely/not/here"), Utf8Path::new("/"))
        .expect_err("missing");
    assert!(matches!(err, ManifestError::Read { .. }));
}
