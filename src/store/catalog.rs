use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;

use super::{JobRecord, JobStore};
use crate::error::Result;

/// Read-only job metadata loaded once at startup.
#[derive(Debug, Default, Clone)]
pub struct JobCatalog {
    jobs: HashMap<i64, JobRecord>,
}

impl JobCatalog {
    pub fn new(jobs: impl IntoIterator<Item = JobRecord>) -> Self {
        Self {
            jobs: jobs.into_iter().map(|job| (job.id, job)).collect(),
        }
    }

    /// Load a JSON array of job records.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = tokio::fs::read(path.as_ref()).await?;
        let jobs: Vec<JobRecord> = serde_json::from_slice(&raw)?;
        tracing::info!(path = %path.as_ref().display(), jobs = jobs.len(), "Loaded job catalog");
        Ok(Self::new(jobs))
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[async_trait]
impl JobStore for JobCatalog {
    async fn get_job_info(&self, job_id: i64) -> Result<Vec<JobRecord>> {
        Ok(self.jobs.get(&job_id).cloned().into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        std::fs::write(
            &path,
            r#"[
                {"id": 1, "name": "rotate", "command": "logrotate", "owners": ["ops@example.com"]},
                {"id": 2, "name": "ping", "command": "http://127.0.0.1/ping", "notify_on_failure": false}
            ]"#,
        )
        .unwrap();

        let catalog = JobCatalog::load(&path).await.unwrap();
        assert_eq!(catalog.len(), 2);
        let job = catalog.get_job_info(2).await.unwrap();
        assert!(!job[0].notify_on_failure);
        assert!(catalog.get_job_info(3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn load_rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(JobCatalog::load(&path).await.is_err());
    }
}
