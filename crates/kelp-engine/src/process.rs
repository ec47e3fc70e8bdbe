//! Captured external-process execution.
//!
//! The captured mode blocks until the child exits, buffers everything it
//! writes, and hands the output back as text. The interactive counterpart
//! lives in [`crate::pty`].

use std::io::Write;
use std::process::{Command, ExitStatus, Stdio};

use thiserror::Error;

/// Failures from the external-process backend.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The child could not be spawned at all.
    #[error("could not run {command:?}: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
    /// The child exited non-zero; carries whatever it wrote to stderr.
    #[error("process exited with status {status}: {stderr}")]
    Failed { status: i32, stderr: String },
    /// Terminal or pseudo-terminal plumbing failed.
    #[error("terminal error: {0}")]
    Terminal(#[from] nix::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Run `command` through the shell, blocking until it exits.
///
/// Piped input, when given, is written to the child's stdin which is then
/// closed; otherwise the child inherits the session's stdin. Stdout is
/// collected and returned as text. A non-zero exit becomes
/// [`ProcessError::Failed`] carrying the status and captured stderr.
pub fn run_captured(command: &str, input: Option<&str>) -> Result<String, ProcessError> {
    tracing::debug!(command, piped = input.is_some(), "spawning captured process");

    let mut child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::inherit()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| ProcessError::Spawn {
            command: command.to_string(),
            source,
        })?;

    if let Some(text) = input {
        if let Some(mut stdin) = child.stdin.take() {
            // The child may exit without reading; a broken pipe is not an error.
            let _ = stdin.write_all(text.as_bytes());
        }
    }

    let output = child.wait_with_output()?;
    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    } else {
        Err(ProcessError::Failed {
            status: exit_code(output.status),
            stderr: String::from_utf8_lossy(&output.stderr).trim_end().to_string(),
        })
    }
}

/// Map an exit status to a shell-style code, folding signals into 128+N.
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    match status.code() {
        Some(code) => code,
        None => status.signal().map_or(-1, |signal| 128 + signal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_stdout() {
        let out = run_captured("echo hi", None).unwrap();
        assert_eq!(out, "hi\n");
    }

    #[test]
    fn pipes_input_to_the_child() {
        let out = run_captured("cat", Some("hello\n")).unwrap();
        assert_eq!(out, "hello\n");
    }

    #[test]
    fn nonzero_exit_is_a_failure_with_status() {
        match run_captured("exit 7", None) {
            Err(ProcessError::Failed { status, .. }) => assert_eq!(status, 7),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn failure_carries_stderr() {
        match run_captured("echo oops >&2; exit 1", None) {
            Err(ProcessError::Failed { stderr, .. }) => assert_eq!(stderr, "oops"),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn missing_command_fails_through_the_shell() {
        match run_captured("definitely-not-a-command-kelp", None) {
            Err(ProcessError::Failed { status, .. }) => assert_eq!(status, 127),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn multi_line_output_is_preserved() {
        let out = run_captured("printf 'a\\nb\\n'", None).unwrap();
        assert_eq!(out, "a\nb\n");
    }
}
