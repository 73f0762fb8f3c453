use std::sync::Arc;

use chrono::Local;

use super::alerts::{Alert, AlertPool};
use crate::proto::TaskRequest;
use crate::store::{PersistedTaskResult, TaskLog, SUCCESS_SENTINEL};
use crate::worker::ExecutionOutcome;

/// Completion timestamp format shared by the task log and the RPC response.
pub const END_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Records each finished attempt and raises an alert when it failed.
///
/// Persistence is awaited, its failure only logged. Alerting is handed to the
/// [`AlertPool`] and never awaited.
pub struct ResultPipeline {
    task_log: Arc<dyn TaskLog>,
    alerts: Arc<AlertPool>,
}

impl ResultPipeline {
    pub fn new(task_log: Arc<dyn TaskLog>, alerts: Arc<AlertPool>) -> Self {
        Self { task_log, alerts }
    }

    /// Build the task-log record for an outcome.
    pub fn record(
        outcome: &ExecutionOutcome,
        request: &TaskRequest,
        end_time: String,
    ) -> PersistedTaskResult {
        let success = outcome.is_success();
        PersistedTaskResult {
            task_id: request.taskid,
            job_id: request.jobid,
            result: outcome.result.clone(),
            host: outcome.host.clone(),
            status: outcome.code,
            end_time,
            err: match &outcome.err {
                Some(err) => err.clone(),
                None => SUCCESS_SENTINEL.to_string(),
            },
            success,
        }
    }

    pub async fn complete(
        &self,
        outcome: &ExecutionOutcome,
        request: &TaskRequest,
    ) -> PersistedTaskResult {
        let end_time = Local::now().format(END_TIME_FORMAT).to_string();
        let record = Self::record(outcome, request, end_time);

        match self
            .task_log
            .update_task_result(request.taskid, &record)
            .await
        {
            Ok(updated) => {
                tracing::debug!(task_id = request.taskid, updated, "Task result persisted")
            }
            Err(e) => tracing::error!(
                task_id = request.taskid,
                job_id = request.jobid,
                error = %e,
                "Failed to persist task result"
            ),
        }

        if !record.success {
            self.alerts.submit(Alert {
                job_id: request.jobid,
                result: record.clone(),
            });
        }
        record
    }
}
