use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::{PersistedTaskResult, TaskLog};
use crate::error::{Result, WorkerError};

/// Append-only task log, one JSON object per line.
///
/// Writes are serialized so concurrent completions never interleave lines.
#[derive(Debug)]
pub struct JsonlTaskLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlTaskLog {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TaskLog for JsonlTaskLog {
    async fn update_task_result(&self, task_id: i64, result: &PersistedTaskResult) -> Result<u64> {
        let mut line = serde_json::to_vec(result)?;
        line.push(b'\n');

        let mut file = self.file.lock().await;
        file.write_all(&line)
            .await
            .map_err(|e| WorkerError::Store(format!("task {}: {}", task_id, e)))?;
        file.flush()
            .await
            .map_err(|e| WorkerError::Store(format!("task {}: {}", task_id, e)))?;
        Ok(1)
    }
}
