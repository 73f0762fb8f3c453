use std::path::PathBuf;
use std::time::Duration;

use chrono::{Local, NaiveDate};

use super::strategy::Strategy;
use crate::error::{Result, WorkerError};
use crate::proto::TaskRequest;

/// Per-day log directory layout: `<root>/log/cronlog/<YYYY-MM-DD>/`.
#[derive(Debug, Clone)]
pub struct LogLayout {
    root: PathBuf,
}

impl LogLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn day_dir(&self, day: NaiveDate) -> PathBuf {
        self.root
            .join("log")
            .join("cronlog")
            .join(day.format("%Y-%m-%d").to_string())
    }

    pub fn log_file(&self, job_id: i64, task_id: i64, day: NaiveDate) -> PathBuf {
        self.day_dir(day)
            .join(format!("cron-task-{}-{}-log.log", job_id, task_id))
    }
}

/// A request resolved into what to run, how, and where its output goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledCommand {
    pub strategy: Strategy,
    pub command: String,
    pub log_file: PathBuf,
    pub deadline: Option<Duration>,
}

impl AssembledCommand {
    /// The command with its output redirection, as recorded in the node's logs.
    pub fn command_line(&self) -> String {
        format!("{} > {}", self.command, self.log_file.display())
    }
}

/// Non-positive timeouts mean the command runs unbounded.
pub fn deadline_from_secs(timeout: i64) -> Option<Duration> {
    u64::try_from(timeout)
        .ok()
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}

/// Resolves the strategy and log target for a request. Runs nothing.
#[derive(Debug, Clone)]
pub struct CommandDispatcher {
    layout: LogLayout,
}

impl CommandDispatcher {
    pub fn new(layout: LogLayout) -> Self {
        Self { layout }
    }

    pub async fn assemble(&self, request: &TaskRequest) -> Result<AssembledCommand> {
        self.assemble_on(request, Local::now().date_naive()).await
    }

    /// Assemble against an explicit day bucket, creating it if absent.
    ///
    /// Creation is idempotent, so concurrent tasks landing in the same day
    /// bucket do not race each other into an error.
    pub async fn assemble_on(
        &self,
        request: &TaskRequest,
        day: NaiveDate,
    ) -> Result<AssembledCommand> {
        let dir = self.layout.day_dir(day);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| WorkerError::LogDirectory {
                path: dir.clone(),
                source,
            })?;

        Ok(AssembledCommand {
            strategy: Strategy::from_query_type(&request.querytype),
            command: request.command.clone(),
            log_file: self.layout.log_file(request.jobid, request.taskid, day),
            deadline: deadline_from_secs(request.timeout),
        })
    }
}
