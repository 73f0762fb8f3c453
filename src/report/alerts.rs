use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::AlertConfig;
use crate::notify::Notifier;
use crate::store::{JobStore, PersistedTaskResult};

/// A failed task attempt waiting to be reported.
#[derive(Debug, Clone)]
pub struct Alert {
    pub job_id: i64,
    pub result: PersistedTaskResult,
}

/// Fixed set of workers delivering failure alerts off the request path.
///
/// The queue is bounded; alerts submitted while it is full are dropped with a
/// warning. [`AlertPool::shutdown`] stops intake and gives queued alerts a
/// bounded amount of time to go out.
pub struct AlertPool {
    tx: mpsc::Sender<Alert>,
    closing: CancellationToken,
    workers: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl AlertPool {
    /// Spawn the workers. Must be called within a tokio runtime.
    pub fn start(
        config: &AlertConfig,
        jobs: Arc<dyn JobStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let closing = CancellationToken::new();

        let workers = (0..config.workers.max(1))
            .map(|worker| {
                tokio::spawn(Self::worker_loop(
                    worker,
                    rx.clone(),
                    jobs.clone(),
                    notifier.clone(),
                    closing.clone(),
                ))
            })
            .collect();

        Self {
            tx,
            closing,
            workers: std::sync::Mutex::new(workers),
        }
    }

    /// Queue an alert without waiting. Returns false if it was dropped.
    pub fn submit(&self, alert: Alert) -> bool {
        if self.closing.is_cancelled() {
            tracing::warn!(task_id = alert.result.task_id, "Alert pool closed, dropping alert");
            return false;
        }
        match self.tx.try_send(alert) {
            Ok(()) => true,
            Err(TrySendError::Full(alert)) => {
                tracing::warn!(
                    task_id = alert.result.task_id,
                    job_id = alert.job_id,
                    "Alert queue full, dropping alert"
                );
                false
            }
            Err(TrySendError::Closed(alert)) => {
                tracing::warn!(task_id = alert.result.task_id, "Alert queue closed, dropping alert");
                false
            }
        }
    }

    /// Stop intake and wait up to `grace` for queued alerts to be delivered.
    ///
    /// Returns false if workers had to be aborted.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.closing.cancel();
        let handles = match self.workers.lock() {
            Ok(mut workers) => std::mem::take(&mut *workers),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };

        let deadline = tokio::time::Instant::now() + grace;
        let mut drained = true;
        for mut handle in handles {
            if tokio::time::timeout_at(deadline, &mut handle).await.is_err() {
                handle.abort();
                drained = false;
            }
        }
        if !drained {
            tracing::warn!(grace = ?grace, "Alert workers did not drain in time");
        }
        drained
    }

    async fn worker_loop(
        worker: usize,
        rx: Arc<Mutex<mpsc::Receiver<Alert>>>,
        jobs: Arc<dyn JobStore>,
        notifier: Arc<dyn Notifier>,
        closing: CancellationToken,
    ) {
        loop {
            let next = {
                let mut rx = rx.lock().await;
                tokio::select! {
                    biased;
                    alert = rx.recv() => alert,
                    // Closing: keep draining whatever is already queued
                    _ = closing.cancelled() => rx.try_recv().ok(),
                }
            };
            let Some(alert) = next else {
                break;
            };
            deliver(jobs.as_ref(), notifier.as_ref(), alert).await;
        }
        tracing::debug!(worker, "Alert worker stopped");
    }
}

async fn deliver(jobs: &dyn JobStore, notifier: &dyn Notifier, alert: Alert) {
    let task_id = alert.result.task_id;
    let job = match jobs.get_job_info(alert.job_id).await {
        Ok(records) => match records.into_iter().next() {
            Some(job) => job,
            None => {
                tracing::warn!(job_id = alert.job_id, task_id, "No job record for failed task, alert dropped");
                return;
            }
        },
        Err(e) => {
            tracing::error!(job_id = alert.job_id, task_id, error = %e, "Job lookup failed, alert dropped");
            return;
        }
    };

    if !job.notify_on_failure {
        tracing::debug!(job_id = job.id, task_id, "Failure alerts disabled for job");
        return;
    }

    if let Err(e) = notifier.send_failure_alert(&alert.result, &job).await {
        tracing::error!(job_id = job.id, task_id, error = %e, "Failed to send failure alert");
    }
}
