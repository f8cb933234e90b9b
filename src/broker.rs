use std::borrow::Cow;
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use log::debug;

/// Failure sentinel prefixed to captured stderr when an invocation fails.
/// This exact literal is the wire contract with the classifier and must be
/// preserved bit-for-exact.
pub const BIN_ERROR_SENTINEL: &str = "[bin-error]---";

/// Upper bound on a single invocation. The external tool can block
/// indefinitely on network-backed vault operations.
pub(crate) const DEFAULT_INVOKE_TIMEOUT_MS: u64 = 120_000;

const PROCESS_POLL_MS: u64 = 50;

/// Quote a value for embedding in a shell-composed command line. Values that
/// travel through the argv execution path never pass through here.
pub(crate) fn shell_quote(value: &str) -> String {
    let cleaned: Cow<'_, str> = if value.contains('\0') {
        Cow::Owned(value.replace('\0', ""))
    } else {
        Cow::Borrowed(value)
    };
    shlex::try_quote(&cleaned)
        .map(|quoted| quoted.into_owned())
        .unwrap_or_else(|_| "''".to_string())
}

/// Build a command with the child isolated into its own process group so the
/// whole tree can be terminated without touching the parent.
pub(crate) fn build_external_command(program: &str, args: &[String]) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(args);

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    cmd
}

/// Kill a child process and its entire process group: SIGTERM first, then
/// SIGKILL after a grace period.
#[cfg(unix)]
pub(crate) fn kill_process_tree(child: &mut Child) {
    let pid = child.id() as i32;
    unsafe {
        libc::kill(-pid, libc::SIGTERM);
    }
    thread::sleep(Duration::from_secs(2));
    match child.try_wait() {
        Ok(Some(_)) => {}
        _ => unsafe {
            libc::killpg(pid, libc::SIGKILL);
        },
    }
    let _ = child.wait();
}

#[cfg(not(unix))]
pub(crate) fn kill_process_tree(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn read_to_end(mut pipe: impl Read) -> Vec<u8> {
    let mut buf = Vec::new();
    let _ = pipe.read_to_end(&mut buf);
    buf
}

/// An in-flight external invocation. The pid is deliberately part of the
/// surface: cancellation is not supported mid-flight, so callers wanting it
/// must track the handle and terminate the process themselves.
pub struct Invocation {
    child: Child,
    stdout: Option<thread::JoinHandle<Vec<u8>>>,
    stderr: Option<thread::JoinHandle<Vec<u8>>>,
}

impl Invocation {
    /// Spawn the executable. With no `pre_step` this is a direct argv
    /// execution with no shell interpretation; with one, a shell pipeline
    /// feeds the pre-step's output into the invocation's stdin (used to
    /// supply a master password without placing it in argv or logs). Every
    /// value entering the pipeline string is quoted.
    pub fn spawn(
        executable: &Path,
        argv: &[String],
        pre_step: Option<&str>,
    ) -> std::io::Result<Invocation> {
        let mut cmd = match pre_step {
            None => build_external_command(&executable.to_string_lossy(), argv),
            Some(pre) => {
                let mut line = String::from(pre);
                line.push_str(" | ");
                line.push_str(&shell_quote(&executable.to_string_lossy()));
                for arg in argv {
                    line.push(' ');
                    line.push_str(&shell_quote(arg));
                }
                let shell = if cfg!(windows) {
                    vec!["cmd".to_string(), "/C".to_string(), line]
                } else {
                    vec!["sh".to_string(), "-c".to_string(), line]
                };
                build_external_command(&shell[0], &shell[1..])
            }
        };
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn()?;
        debug!("spawned {} (pid {})", executable.display(), child.id());
        let stdout = child.stdout.take().map(|pipe| thread::spawn(move || read_to_end(pipe)));
        let stderr = child.stderr.take().map(|pipe| thread::spawn(move || read_to_end(pipe)));
        Ok(Invocation {
            child,
            stdout,
            stderr,
        })
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Terminate the invocation's process group.
    pub fn kill(&mut self) {
        kill_process_tree(&mut self.child);
    }

    fn collect(handle: Option<thread::JoinHandle<Vec<u8>>>) -> String {
        let bytes = handle
            .and_then(|join| join.join().ok())
            .unwrap_or_default();
        String::from_utf8_lossy(&bytes).to_string()
    }

    /// Wait for completion and fold the outcome into the sentinel wire
    /// format: captured stdout (trailing newlines stripped) on success, a
    /// sentinel-prefixed stderr payload on any failure. Never panics across
    /// the boundary so the result can travel an untyped transport.
    pub fn wait(mut self, timeout_ms: u64) -> String {
        let pid = self.pid();
        let start = Instant::now();
        let timeout = Duration::from_millis(timeout_ms.max(1));

        let status = loop {
            if start.elapsed() >= timeout {
                kill_process_tree(&mut self.child);
                let stderr = Self::collect(self.stderr.take());
                debug!("invocation pid {pid} timed out after {timeout_ms}ms");
                let mut message = format!("invocation timed out after {timeout_ms}ms");
                if !stderr.trim().is_empty() {
                    message.push('\n');
                    message.push_str(stderr.trim_end());
                }
                return format!("{BIN_ERROR_SENTINEL}{message}");
            }
            match self.child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => thread::sleep(Duration::from_millis(PROCESS_POLL_MS)),
                Err(err) => {
                    kill_process_tree(&mut self.child);
                    return format!("{BIN_ERROR_SENTINEL}wait failed: {err}");
                }
            }
        };

        let stdout = Self::collect(self.stdout.take());
        let stderr = Self::collect(self.stderr.take());
        debug!("invocation pid {pid} exited with {status}");

        if status.success() {
            stdout.trim_end_matches(['\n', '\r']).to_string()
        } else if stderr.trim().is_empty() {
            format!("{BIN_ERROR_SENTINEL}exited with {status}")
        } else {
            format!("{BIN_ERROR_SENTINEL}{}", stderr.trim_end_matches(['\n', '\r']))
        }
    }
}

/// Spawn one external process (or shell pipeline) and return its combined
/// outcome in the sentinel wire format. Exactly one process per call; no
/// retries.
pub fn invoke(executable: &Path, argv: &[String], pre_step: Option<&str>) -> String {
    invoke_with_timeout(executable, argv, pre_step, DEFAULT_INVOKE_TIMEOUT_MS)
}

pub(crate) fn invoke_with_timeout(
    executable: &Path,
    argv: &[String],
    pre_step: Option<&str>,
    timeout_ms: u64,
) -> String {
    match Invocation::spawn(executable, argv, pre_step) {
        Ok(invocation) => invocation.wait(timeout_ms),
        Err(err) => format!("{BIN_ERROR_SENTINEL}spawn failed: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn shell_quote_preserves_single_quotes() {
        let quoted = shell_quote("it's");
        // the quoted form must survive a shell round-trip as one word
        assert!(quoted.contains("it"));
        assert_ne!(quoted, "it's");
    }

    #[cfg(unix)]
    #[test]
    fn invoke_captures_stdout_and_strips_trailing_newlines() {
        let out = invoke(
            &PathBuf::from("/bin/echo"),
            &["hello".to_string()],
            None,
        );
        assert_eq!(out, "hello");
    }

    #[cfg(unix)]
    #[test]
    fn invoke_failure_yields_sentinel() {
        let out = invoke(
            &PathBuf::from("/bin/sh"),
            &["-c".to_string(), "echo oops >&2; exit 3".to_string()],
            None,
        );
        assert!(out.starts_with(BIN_ERROR_SENTINEL));
        assert!(out.contains("oops"));
    }

    #[cfg(unix)]
    #[test]
    fn invoke_missing_executable_yields_sentinel() {
        let out = invoke(&PathBuf::from("/no/such/binary"), &[], None);
        assert!(out.starts_with(BIN_ERROR_SENTINEL));
    }

    #[cfg(unix)]
    #[test]
    fn pre_step_pipeline_feeds_stdin_with_quoting_intact() {
        // a password containing a single quote must cross the shell unharmed
        let pre = format!("echo {}", shell_quote("it's a 'secret'"));
        let out = invoke(&PathBuf::from("/bin/cat"), &[], Some(&pre));
        assert_eq!(out, "it's a 'secret'");
    }
}
