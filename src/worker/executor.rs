use tokio_util::sync::CancellationToken;

use super::dispatcher::AssembledCommand;
use super::fetch::FetchRunner;
use super::outcome::ExecutionOutcome;
use super::shell::ShellRunner;
use super::strategy::Strategy;
use crate::config::ExecutionConfig;

/// Error text of an attempt whose caller went away.
pub const CANCELLED: &str = "cancelled by caller";

/// Runs an assembled command with the strategy it resolved to.
#[derive(Debug, Clone)]
pub struct Executor {
    shell: ShellRunner,
    fetch: FetchRunner,
}

impl Executor {
    pub fn new(config: &ExecutionConfig) -> Self {
        Self {
            shell: ShellRunner::new(config),
            fetch: FetchRunner::new(config),
        }
    }

    pub fn with_runners(shell: ShellRunner, fetch: FetchRunner) -> Self {
        Self { shell, fetch }
    }

    /// Execute `cmd` within its deadline.
    ///
    /// Never fails: spawn, transport and timeout problems are reported in the
    /// returned outcome. Empty commands are rejected without spawning.
    pub async fn run(&self, cmd: &AssembledCommand) -> ExecutionOutcome {
        if cmd.command.trim().is_empty() {
            tracing::warn!(strategy = %cmd.strategy, "Rejecting empty command");
            return ExecutionOutcome::error("empty command");
        }

        tracing::info!(
            strategy = %cmd.strategy,
            command = %cmd.command_line(),
            deadline = ?cmd.deadline,
            "Executing command"
        );

        let outcome = match cmd.strategy {
            Strategy::Shell => {
                self.shell
                    .run(&cmd.command, &cmd.log_file, cmd.deadline)
                    .await
            }
            Strategy::Fetch => {
                self.fetch
                    .run(&cmd.command, &cmd.log_file, cmd.deadline)
                    .await
            }
        };

        if outcome.is_success() {
            tracing::debug!(strategy = %cmd.strategy, "Command succeeded");
        } else {
            tracing::warn!(
                strategy = %cmd.strategy,
                status = outcome.code,
                error = outcome.err_text(),
                "Command failed"
            );
        }
        outcome
    }

    /// Like [`Executor::run`], but gives up when `cancel` fires.
    ///
    /// Dropping the running strategy kills the command's process group, so
    /// nothing outlives a cancelled attempt.
    pub async fn run_until(
        &self,
        cmd: &AssembledCommand,
        cancel: &CancellationToken,
    ) -> ExecutionOutcome {
        tokio::select! {
            outcome = self.run(cmd) => outcome,
            _ = cancel.cancelled() => {
                tracing::warn!(
                    strategy = %cmd.strategy,
                    log_file = %cmd.log_file.display(),
                    "Command cancelled by caller"
                );
                ExecutionOutcome::error(CANCELLED)
            }
        }
    }
}
