use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{JobRecord, JobStore, PersistedTaskResult, TaskLog};
use crate::error::Result;

/// In-process task log and job store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    results: RwLock<HashMap<i64, Vec<PersistedTaskResult>>>,
    jobs: RwLock<HashMap<i64, JobRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_job(&self, job: JobRecord) {
        self.jobs.write().await.insert(job.id, job);
    }

    /// Every write recorded for `task_id`, oldest first.
    pub async fn writes_for(&self, task_id: i64) -> Vec<PersistedTaskResult> {
        self.results
            .read()
            .await
            .get(&task_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn latest(&self, task_id: i64) -> Option<PersistedTaskResult> {
        self.results
            .read()
            .await
            .get(&task_id)
            .and_then(|writes| writes.last().cloned())
    }

    pub async fn task_count(&self) -> usize {
        self.results.read().await.len()
    }
}

#[async_trait]
impl TaskLog for MemoryStore {
    async fn update_task_result(&self, task_id: i64, result: &PersistedTaskResult) -> Result<u64> {
        self.results
            .write()
            .await
            .entry(task_id)
            .or_default()
            .push(result.clone());
        Ok(1)
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn get_job_info(&self, job_id: i64) -> Result<Vec<JobRecord>> {
        Ok(self.jobs.read().await.get(&job_id).cloned().into_iter().collect())
    }
}
