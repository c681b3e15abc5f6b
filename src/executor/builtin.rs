//! Actions implemented without spawning a process.

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};

use super::ExecError;
use crate::params::Parameters;

fn io_error(path: &Utf8Path) -> impl FnOnce(std::io::Error) -> ExecError + '_ {
    move |source| ExecError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Copy each source to the target at the same position.
pub(super) fn copy(sources: &[Utf8PathBuf], targets: &[&Utf8PathBuf]) -> Result<(), ExecError> {
    for (source, target) in sources.iter().zip(targets) {
        fs::copy(source, target).map_err(io_error(target))?;
    }
    Ok(())
}

/// Copy `source` to `target`, replacing `<prefix>key<postfix>` with the
/// rendered parameter value for every parameter.
pub(super) fn substitute(
    source: &Utf8Path,
    target: &Utf8Path,
    params: &Parameters,
    root: &Utf8Path,
    markers: (&str, &str),
) -> Result<(), ExecError> {
    let (prefix, postfix) = markers;
    let mut text = fs::read_to_string(source).map_err(io_error(source))?;
    for (key, value) in params {
        text = text.replace(&format!("{prefix}{key}{postfix}"), &value.render(root));
    }
    fs::write(target, text).map_err(io_error(target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParamValue;
    use tempfile::TempDir;

    fn root(dir: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8")
    }

    #[test]
    fn substitute_replaces_marked_keys() {
        let dir = TempDir::new().expect("tmp");
        let base = root(&dir);
        let source = base.join("in.inp.in");
        let target = base.join("in.inp");
        fs::write(&source, "width=@width@\nmesh=@mesh@\nkeep=@other@\n").expect("write");
        let mut params = Parameters::new();
        params.insert("width".into(), ParamValue::Float(1.5));
        params.insert("mesh".into(), ParamValue::from(Utf8PathBuf::from("mesh.inp")));

        substitute(&source, &target, &params, &base, ("@", "@")).expect("substitute");

        let text = fs::read_to_string(&target).expect("read");
        assert_eq!(
            text,
            format!("width=1.5\nmesh={base}/mesh.inp\nkeep=@other@\n")
        );
    }

    #[test]
    fn substitute_keeps_whole_floats_as_floats() {
        let dir = TempDir::new().expect("tmp");
        let base = root(&dir);
        let source = base.join("solver.inp.in");
        let target = base.join("solver.inp");
        fs::write(&source, "*STATIC\n@step@, @duration@\n").expect("write");
        let mut params = Parameters::new();
        params.insert("step".into(), ParamValue::Float(1.0));
        params.insert("duration".into(), ParamValue::Integer(10));

        substitute(&source, &target, &params, &base, ("@", "@")).expect("substitute");

        let text = fs::read_to_string(&target).expect("read");
        assert_eq!(text, "*STATIC\n1.0, 10\n");
    }

    #[test]
    fn copy_reports_missing_source() {
        let dir = TempDir::new().expect("tmp");
        let base = root(&dir);
        let target = base.join("b");
        let err = copy(&[base.join("absent")], &[&target]).expect_err("missing");
        assert!(matches!(err, ExecError::Io { ref path, .. } if *path == target));
    }
}
