//! Interactive external-process execution.
//!
//! Runs one child attached to the subordinate side of a pseudo-terminal while
//! the session's real terminal sits in raw mode, so the child behaves as if
//! the user ran it directly: live echo, cursor addressing, password prompts.
//!
//! The two live descriptors — the real stdin and the controlling side of the
//! pseudo-terminal — are multiplexed by a single-threaded poll loop with a
//! short timeout. Bytes from the child are both accumulated and echoed to the
//! real stdout; bytes from the user are forwarded to the child, except a lone
//! ETX (Ctrl-C) which is intercepted and turned into SIGTERM for the child's
//! process group. No other control byte is intercepted.

use std::io::{self, IsTerminal, Write};
use std::os::fd::{AsFd, AsRawFd, OwnedFd};
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, Stdio};
use std::sync::LazyLock;

use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::pty::openpty;
use nix::sys::signal::{killpg, Signal};
use nix::sys::termios::{cfmakeraw, tcgetattr, tcsetattr, SetArg, Termios};
use nix::unistd::Pid;
use regex::Regex;

use crate::process::ProcessError;

/// The one control byte intercepted by the copy loop.
const ETX: u8 = 0x03;

/// Copy-loop poll timeout in milliseconds.
const POLL_INTERVAL_MS: u16 = 50;

/// VT100/ANSI escape sequences: ESC, a C1 introducer, parameter bytes,
/// intermediate bytes, final byte.
static ANSI_ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1B[@-_][0-?]*[ -/]*[@-~]").expect("escape pattern"));

/// True when the session's stdin and stdout are both attached to a terminal.
///
/// The dispatch engine only selects the interactive mode when this holds;
/// in a pipe or a test harness the captured mode is used instead.
pub fn stdio_is_terminal() -> bool {
    io::stdin().is_terminal() && io::stdout().is_terminal()
}

/// Saves the terminal attributes and restores them on drop, so the terminal
/// comes back from raw mode on every exit path.
struct RawModeGuard {
    saved: Termios,
}

impl RawModeGuard {
    fn new() -> Result<Self, ProcessError> {
        let saved = tcgetattr(io::stdin())?;
        let mut raw = saved.clone();
        cfmakeraw(&mut raw);
        tcsetattr(io::stdin(), SetArg::TCSADRAIN, &raw)?;
        Ok(Self { saved })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = tcsetattr(io::stdin(), SetArg::TCSADRAIN, &self.saved);
    }
}

/// Run `command` through the shell attached to a pseudo-terminal.
///
/// Piped input, when given, is written to the child's stdin which is then
/// closed; otherwise the real terminal's input flows through. Returns the
/// accumulated child output with escape sequences stripped and CRLF
/// normalized. The exit status is swallowed in this mode: the captured
/// buffer is all the caller can act on, and the user already saw the child's
/// own error output live.
pub fn run_interactive(command: &str, input: Option<&str>) -> Result<String, ProcessError> {
    tracing::debug!(command, piped = input.is_some(), "spawning interactive process");

    let pty = openpty(None, None)?;
    let raw_guard = RawModeGuard::new()?;

    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd.stdin(if input.is_some() {
        Stdio::piped()
    } else {
        Stdio::from(pty.slave.try_clone()?)
    });
    cmd.stdout(Stdio::from(pty.slave.try_clone()?));
    cmd.stderr(Stdio::from(pty.slave.try_clone()?));
    // New process group, so the ETX intercept can signal the child and
    // everything it spawned without touching our own session.
    cmd.process_group(0);

    let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
        command: command.to_string(),
        source,
    })?;
    // Keep only the controlling side open here; the child holds its own
    // copies of the subordinate side.
    drop(pty.slave);

    if let Some(text) = input {
        if let Some(mut stdin) = child.stdin.take() {
            let _ = stdin.write_all(text.as_bytes());
            // Dropping the handle closes the stream, signalling EOF.
        }
    }

    let collected = copy_loop(&mut child, &pty.master, input.is_none());
    drop(raw_guard);

    Ok(postprocess(&collected?))
}

/// Poll the real stdin and the controlling descriptor until the child exits.
fn copy_loop(
    child: &mut Child,
    master: &OwnedFd,
    forward_stdin: bool,
) -> Result<Vec<u8>, ProcessError> {
    let stdin = io::stdin();
    let mut collected = Vec::new();
    let mut buf = [0u8; 10240];

    while child.try_wait()?.is_none() {
        let mut fds = Vec::with_capacity(2);
        if forward_stdin {
            fds.push(PollFd::new(stdin.as_fd(), PollFlags::POLLIN));
        }
        fds.push(PollFd::new(master.as_fd(), PollFlags::POLLIN));

        let ready = match poll(&mut fds, PollTimeout::from(POLL_INTERVAL_MS)) {
            Ok(n) => n,
            Err(nix::Error::EINTR) => continue,
            Err(e) => return Err(e.into()),
        };
        if ready == 0 {
            continue;
        }

        let stdin_ready = forward_stdin
            && fds[0]
                .revents()
                .is_some_and(|events| events.intersects(PollFlags::POLLIN));
        let master_ready = fds[fds.len() - 1]
            .revents()
            .is_some_and(|events| !events.is_empty());

        if stdin_ready {
            let n = match nix::unistd::read(stdin.as_raw_fd(), &mut buf) {
                Ok(n) => n,
                Err(nix::Error::EINTR) => continue,
                Err(e) => return Err(e.into()),
            };
            if buf[..n] == [ETX] {
                // Ctrl-C: terminate the child's process group instead of
                // forwarding the byte.
                let _ = killpg(Pid::from_raw(child.id() as i32), Signal::SIGTERM);
            } else if n > 0 {
                let _ = nix::unistd::write(master, &buf[..n]);
            }
        } else if master_ready {
            match nix::unistd::read(master.as_raw_fd(), &mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    collected.extend_from_slice(&buf[..n]);
                    let _ = nix::unistd::write(io::stdout(), &buf[..n]);
                }
                // EIO means the subordinate side closed: the child is gone.
                Err(nix::Error::EIO) => break,
                Err(nix::Error::EINTR) => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    // Drain whatever the child wrote between the last poll and its exit.
    loop {
        let mut fds = [PollFd::new(master.as_fd(), PollFlags::POLLIN)];
        match poll(&mut fds, PollTimeout::ZERO) {
            Ok(0) | Err(_) => break,
            Ok(_) => match nix::unistd::read(master.as_raw_fd(), &mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    collected.extend_from_slice(&buf[..n]);
                    let _ = nix::unistd::write(io::stdout(), &buf[..n]);
                }
            },
        }
    }

    Ok(collected)
}

/// Strip escape sequences and normalize CRLF to LF.
fn postprocess(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    ANSI_ESCAPE.replace_all(&text, "").replace("\r\n", "\n")
}
