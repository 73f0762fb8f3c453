//! Failure alert delivery.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{Result, WorkerError};
use crate::store::{JobRecord, PersistedTaskResult};

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_failure_alert(&self, result: &PersistedTaskResult, job: &JobRecord)
        -> Result<()>;
}

/// Body of a failure alert.
#[derive(Debug, Serialize)]
pub struct FailureAlert<'a> {
    pub job_id: i64,
    pub job_name: &'a str,
    pub owners: &'a [String],
    pub task_id: i64,
    pub host: &'a str,
    pub status: i64,
    pub error: &'a str,
    pub output: &'a str,
    pub end_time: &'a str,
}

impl<'a> FailureAlert<'a> {
    pub fn new(result: &'a PersistedTaskResult, job: &'a JobRecord) -> Self {
        Self {
            job_id: job.id,
            job_name: &job.name,
            owners: &job.owners,
            task_id: result.task_id,
            host: &result.host,
            status: result.status,
            error: &result.err,
            output: &result.result,
            end_time: &result.end_time,
        }
    }
}

/// Writes alerts to the node's log.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_failure_alert(
        &self,
        result: &PersistedTaskResult,
        job: &JobRecord,
    ) -> Result<()> {
        tracing::warn!(
            job_id = job.id,
            job_name = %job.name,
            owners = ?job.owners,
            task_id = result.task_id,
            status = result.status,
            error = %result.err,
            "Task failed"
        );
        Ok(())
    }
}

/// Posts alerts as JSON to a webhook.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send_failure_alert(
        &self,
        result: &PersistedTaskResult,
        job: &JobRecord,
    ) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(&FailureAlert::new(result, job))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(WorkerError::Notify(format!(
                "webhook {} answered {}",
                self.url,
                response.status()
            )));
        }
        Ok(())
    }
}
