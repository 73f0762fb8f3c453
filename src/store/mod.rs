//! Task-log and job-store collaborators.
//!
//! The node only writes one result per task attempt and reads job metadata
//! for alerting; storage itself belongs to the fleet. Implementations must be
//! safe to call from many task completions at once.

pub mod catalog;
pub mod jsonl;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use catalog::JobCatalog;
pub use jsonl::JsonlTaskLog;
pub use memory::MemoryStore;

/// Written on the `err` field of a successful result.
pub const SUCCESS_SENTINEL: &str = "success";

/// Outcome of one task attempt as recorded in the task log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedTaskResult {
    pub task_id: i64,
    pub job_id: i64,
    pub result: String,
    pub host: String,
    pub status: i64,
    pub end_time: String,
    /// Error text, or [`SUCCESS_SENTINEL`] when the attempt succeeded
    pub err: String,
    pub success: bool,
}

/// Metadata of a recurring job, as far as alerting needs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: i64,
    pub name: String,
    pub command: String,
    /// Who gets failure alerts
    #[serde(default)]
    pub owners: Vec<String>,
    /// Set to false to silence failure alerts for this job
    #[serde(default = "default_true")]
    pub notify_on_failure: bool,
}

fn default_true() -> bool {
    true
}

#[async_trait]
pub trait TaskLog: Send + Sync {
    /// Record the result of `task_id`. Returns the number of records updated.
    async fn update_task_result(&self, task_id: i64, result: &PersistedTaskResult) -> Result<u64>;
}

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Records for `job_id`; callers use the first one.
    async fn get_job_info(&self, job_id: i64) -> Result<Vec<JobRecord>>;
}
