use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use gitvend_core::BuildEnv;
use nix::errno::Errno;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::RunnerError;

/// A shell command line, the directory it runs in, and the variables layered
/// over the inherited environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub line: String,
    pub cwd: PathBuf,
    pub env: BuildEnv,
}

impl CommandSpec {
    pub fn new(line: impl Into<String>, cwd: &Path, env: &BuildEnv) -> Self {
        Self {
            line: line.into(),
            cwd: cwd.to_path_buf(),
            env: env.clone(),
        }
    }
}

/// Captured output of a successful command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Abstraction over shell execution for testability.
///
/// Production code uses [`ShellRunner`], tests use mockall-generated mocks or
/// hand-written fakes.
#[allow(async_fn_in_trait)]
pub trait ProcessRunner: Send + Sync {
    /// Run a command line to completion and capture its output.
    ///
    /// A non-zero exit is an error. When `cancel` fires first the process is
    /// killed and [`RunnerError::Cancelled`] is returned.
    async fn run(
        &self,
        command: &CommandSpec,
        cancel: &CancellationToken,
    ) -> Result<CommandOutput, RunnerError>;
}

impl<T: ProcessRunner> ProcessRunner for &T {
    async fn run(
        &self,
        command: &CommandSpec,
        cancel: &CancellationToken,
    ) -> Result<CommandOutput, RunnerError> {
        (**self).run(command, cancel).await
    }
}

/// Time a cancelled process group gets to exit after `SIGTERM` before it is
/// sent `SIGKILL`.
const TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// Runs command lines through `/bin/sh -c`.
///
/// Each command leads its own process group, so cancelling it also stops
/// whatever the shell started (`make` jobs, compilers, `sudo` children).
pub struct ShellRunner {
    shell: PathBuf,
}

impl ShellRunner {
    pub fn new() -> Self {
        Self {
            shell: PathBuf::from("/bin/sh"),
        }
    }

    pub fn with_shell(shell: &Path) -> Self {
        Self {
            shell: shell.to_path_buf(),
        }
    }
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessRunner for ShellRunner {
    async fn run(
        &self,
        command: &CommandSpec,
        cancel: &CancellationToken,
    ) -> Result<CommandOutput, RunnerError> {
        debug!(command = %command.line, cwd = %command.cwd.display(), "spawning process");

        let child = tokio::process::Command::new(&self.shell)
            .arg("-c")
            .arg(&command.line)
            .current_dir(&command.cwd)
            .envs(command.env.iter())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RunnerError::Spawn {
                command: command.line.clone(),
                source: e,
            })?;

        let group = child.id().map(process_group);
        let wait = child.wait_with_output();
        tokio::pin!(wait);

        let output = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                if let Some(group) = group {
                    signal_group(group, Signal::SIGTERM);
                    if tokio::time::timeout(TERMINATE_GRACE, &mut wait).await.is_err() {
                        debug!(command = %command.line, "process ignored SIGTERM");
                    }
                    // The shell may be gone while its children linger.
                    signal_group(group, Signal::SIGKILL);
                }
                return Err(RunnerError::Cancelled {
                    command: command.line.clone(),
                });
            }
            output = &mut wait => output.map_err(|e| RunnerError::Spawn {
                command: command.line.clone(),
                source: e,
            })?,
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if output.status.success() {
            if !stdout.is_empty() {
                debug!(stdout = %stdout.trim_end(), "command output");
            }
            Ok(CommandOutput { stdout, stderr })
        } else {
            debug!(status = %output.status, stderr = %stderr.trim_end(), "command failed");
            Err(RunnerError::failed(
                &command.line,
                output.status,
                stdout,
                stderr,
            ))
        }
    }
}

/// The child was spawned with `process_group(0)`, so its pid is its group id.
fn process_group(pid: u32) -> Pid {
    Pid::from_raw(pid as i32)
}

fn signal_group(group: Pid, signal: Signal) {
    match killpg(group, signal) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(errno) => warn!(group = %group, ?signal, error = %errno, "failed to signal process group"),
    }
}
