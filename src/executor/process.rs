//! Shell command execution with output capture and interrupt handling.

use std::io::{self, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use camino::Utf8Path;
use tracing::debug;
use wait_timeout::ChildExt;

use crate::cancel::CancellationToken;
use crate::config::InterruptPolicy;

#[cfg(windows)]
const SHELL: &str = "cmd";
#[cfg(windows)]
const SHELL_ARGS: &[&str] = &["/C"];

#[cfg(not(windows))]
const SHELL: &str = "sh";
#[cfg(not(windows))]
const SHELL_ARGS: &[&str] = &["-c"];

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How a command ended.
#[derive(Debug)]
pub(super) enum Completion {
    Exited(ExitStatus),
    Terminated,
}

/// Result of one command: how it ended and everything it printed.
#[derive(Debug)]
pub(super) struct CommandRun {
    pub(super) completion: Completion,
    pub(super) output: Vec<u8>,
}

fn spawn_reader<R: Read + Send + 'static>(stream: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    stream.map(|mut reader| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            if let Err(err) = reader.read_to_end(&mut buf) {
                debug!("failed to read child output: {err}");
            }
            buf
        })
    })
}

fn join_reader(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

fn terminate_child(child: &mut Child) {
    if let Err(err) = child.kill()
        && err.kind() != io::ErrorKind::InvalidInput
    {
        debug!("failed to kill child after interrupt: {err}");
    }
    if let Err(err) = child.wait() {
        debug!("failed to reap child after interrupt: {err}");
    }
}

/// Run `command` through the platform shell in `cwd`, capturing stdout then
/// stderr.
///
/// While the command runs the cancellation token is polled; under
/// [`InterruptPolicy::Terminate`] a raised token kills the child.
pub(super) fn run_shell(
    command: &str,
    cwd: &Utf8Path,
    cancel: &CancellationToken,
    policy: InterruptPolicy,
) -> io::Result<CommandRun> {
    let mut child = Command::new(SHELL)
        .args(SHELL_ARGS)
        .arg(command)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;
    let stdout = spawn_reader(child.stdout.take());
    let stderr = spawn_reader(child.stderr.take());

    let completion = loop {
        if let Some(status) = child.wait_timeout(POLL_INTERVAL)? {
            break Completion::Exited(status);
        }
        if cancel.is_cancelled() && policy == InterruptPolicy::Terminate {
            terminate_child(&mut child);
            break Completion::Terminated;
        }
    };

    let mut output = join_reader(stdout);
    output.extend(join_reader(stderr));
    Ok(CommandRun { completion, output })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn captures_stdout_and_stderr() {
        let run = run_shell(
            "echo out; echo err >&2; pwd",
            Utf8Path::new("/"),
            &CancellationToken::new(),
            InterruptPolicy::Terminate,
        )
        .expect("run");
        assert!(matches!(run.completion, Completion::Exited(s) if s.success()));
        let text = String::from_utf8(run.output).expect("utf8");
        assert_eq!(text, "out\n/\nerr\n");
    }

    #[test]
    fn reports_non_zero_exit() {
        let run = run_shell(
            "exit 3",
            Utf8Path::new("/"),
            &CancellationToken::new(),
            InterruptPolicy::Terminate,
        )
        .expect("run");
        assert!(matches!(run.completion, Completion::Exited(s) if s.code() == Some(3)));
    }

    #[test]
    fn cancelled_token_terminates_running_command() {
        let token = CancellationToken::new();
        token.cancel();
        let started = Instant::now();
        let run = run_shell("sleep 5", Utf8Path::new("/"), &token, InterruptPolicy::Terminate)
            .expect("run");
        assert!(matches!(run.completion, Completion::Terminated));
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
