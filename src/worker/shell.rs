use std::future::Future;
use std::io;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::Path;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tokio::fs::File;
use tokio::process::Command;

use super::outcome::{capture_stream, Capture, ExecutionOutcome};
use crate::config::ExecutionConfig;

/// Runs commands through a shell interpreter.
///
/// Every command gets its own process group so a timeout (or a dropped
/// request) takes down whatever the command forked, not just the shell.
/// Stdout is streamed into the task's log file and captured for the
/// response; stderr is captured only.
///
/// The command ends when the shell exits. Background processes it leaves
/// behind are left running once they release the output pipes; any still
/// holding them after the kill grace are killed with the group.
#[derive(Debug, Clone)]
pub struct ShellRunner {
    shell: String,
    max_output_bytes: usize,
    kill_grace: Duration,
}

impl ShellRunner {
    pub fn new(config: &ExecutionConfig) -> Self {
        Self {
            shell: config.shell.clone(),
            max_output_bytes: config.max_output_bytes,
            kill_grace: config.kill_grace(),
        }
    }

    pub async fn run(
        &self,
        command: &str,
        log_file: &Path,
        deadline: Option<Duration>,
    ) -> ExecutionOutcome {
        let mut sink = match File::create(log_file).await {
            Ok(file) => file,
            Err(e) => {
                return ExecutionOutcome::error(format!(
                    "failed to open log file {}: {}",
                    log_file.display(),
                    e
                ))
            }
        };

        let mut std_cmd = std::process::Command::new(&self.shell);
        std_cmd
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0);
        let mut cmd = Command::from(std_cmd);
        cmd.kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::error!(shell = %self.shell, error = %e, "Failed to spawn command");
                return ExecutionOutcome::error(format!("failed to spawn {}: {}", self.shell, e));
            }
        };

        let mut group = ProcessGroup::new(child.id());
        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return ExecutionOutcome::error("child process has no output pipes");
        };

        let limit = self.max_output_bytes;
        let mut stdout_buf = Capture::default();
        let mut stderr_buf = Capture::default();

        let ended = {
            let pipes = async {
                let (logged, _) = tokio::join!(
                    capture_stream(stdout, Some(&mut sink), limit, &mut stdout_buf),
                    capture_stream(stderr, None::<&mut File>, limit, &mut stderr_buf),
                );
                logged
            };
            tokio::pin!(pipes);

            let mut drained = None;
            let run = async {
                tokio::select! {
                    logged = &mut pipes => {
                        drained = Some(logged);
                        child.wait().await
                    }
                    status = child.wait() => status,
                }
            };
            let exited = match deadline {
                Some(bound) => tokio::time::timeout(bound, run).await.ok(),
                None => Some(run.await),
            };

            match exited {
                Some(status) => {
                    let logged = match drained {
                        Some(logged) => logged,
                        None => self.drain_leftovers(&mut pipes, &mut group).await,
                    };
                    Ended::Exited(status, logged)
                }
                None => {
                    group.kill();
                    if tokio::time::timeout(self.kill_grace, child.wait())
                        .await
                        .is_err()
                    {
                        tracing::warn!(
                            pid = ?child.id(),
                            "Timed out command was not reaped within grace period"
                        );
                    }
                    if drained.is_none() {
                        let _ = tokio::time::timeout(self.kill_grace, &mut pipes).await;
                    }
                    Ended::TimedOut
                }
            }
        };

        let status = match ended {
            Ended::Exited(status, logged) => {
                if let Err(e) = logged {
                    return ExecutionOutcome::error(format!("failed to write log file: {}", e));
                }
                status
            }
            Ended::TimedOut => {
                let secs = deadline.map(|d| d.as_secs()).unwrap_or_default();
                return ExecutionOutcome::timed_out(stdout_buf.into_string(), secs);
            }
        };
        let status = match status {
            Ok(status) => status,
            Err(e) => return ExecutionOutcome::error(format!("failed to wait for command: {}", e)),
        };
        group.disarm();

        let stdout = stdout_buf.into_string();
        let stderr = stderr_buf.into_string();

        if status.success() {
            ExecutionOutcome::success(stdout)
        } else {
            let code = match status.code() {
                Some(code) => i64::from(code),
                None => 128 + i64::from(status.signal().unwrap_or_default()),
            };
            ExecutionOutcome::failure(code, stdout, stderr.trim_end())
        }
    }

    /// The shell has exited but something it started still holds the output
    /// pipes. Wait up to the kill grace for them to close, then kill whatever
    /// is left in the process group.
    async fn drain_leftovers<F>(
        &self,
        pipes: &mut Pin<&mut F>,
        group: &mut ProcessGroup,
    ) -> io::Result<()>
    where
        F: Future<Output = io::Result<()>>,
    {
        if let Ok(logged) = tokio::time::timeout(self.kill_grace, &mut *pipes).await {
            return logged;
        }
        tracing::debug!(
            grace = ?self.kill_grace,
            "Killing background processes still holding the command's output"
        );
        group.kill();
        tokio::time::timeout(self.kill_grace, &mut *pipes)
            .await
            .unwrap_or(Ok(()))
    }
}

enum Ended {
    Exited(io::Result<ExitStatus>, io::Result<()>),
    TimedOut,
}

/// Kills a command's whole process group unless disarmed.
struct ProcessGroup {
    pgid: Option<Pid>,
    armed: bool,
}

impl ProcessGroup {
    fn new(pid: Option<u32>) -> Self {
        Self {
            pgid: pid.map(|p| Pid::from_raw(p as i32)),
            armed: true,
        }
    }

    fn kill(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            match killpg(pgid, Signal::SIGKILL) {
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(e) => tracing::warn!(pgid = %pgid, error = %e, "Failed to kill process group"),
            }
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        if self.armed {
            self.kill();
        }
    }
}
