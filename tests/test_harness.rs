//! Shared helpers for cron-worker integration tests.
//!
//! Provides collaborator doubles (recording notifier, flaky registry, failing
//! task log), a ready-made task service and an in-process worker node.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use cron_worker::config::WorkerConfig;
use cron_worker::error::{Result, WorkerError};
use cron_worker::grpc::TaskService;
use cron_worker::node::{Collaborators, WorkerNode};
use cron_worker::notify::Notifier;
use cron_worker::proto::TaskRequest;
use cron_worker::registry::{MemoryRegistry, Registry};
use cron_worker::report::{AlertPool, ResultPipeline};
use cron_worker::shutdown::ShutdownSignal;
use cron_worker::store::{JobRecord, JobStore, MemoryStore, PersistedTaskResult, TaskLog};

/// Address the test node reports as its own.
pub const ADVERTISE_ADDR: &str = "10.9.8.7:8973";

/// Node configuration with short intervals for faster tests
pub fn test_config(log_root: &Path) -> WorkerConfig {
    let mut config = WorkerConfig::new("127.0.0.1:0".parse().unwrap())
        .with_advertise_addr(ADVERTISE_ADDR.parse().unwrap())
        .with_log_root(log_root);
    config.registry.lease_ttl_secs = 3;
    config.registry.renew_interval_secs = 1;
    config.registry.deregister_timeout_ms = 1000;
    config.execution.kill_grace_ms = 1000;
    config.alerts.drain_timeout_ms = 1000;
    config
}

pub fn task_request(command: &str, task_id: i64, job_id: i64, timeout: i64) -> TaskRequest {
    TaskRequest {
        command: command.to_string(),
        timeout,
        taskid: task_id,
        jobid: job_id,
        querytype: "shell".to_string(),
    }
}

pub fn job(id: i64) -> JobRecord {
    JobRecord {
        id,
        name: format!("job-{}", id),
        command: "true".to_string(),
        owners: vec!["ops@example.com".to_string()],
        notify_on_failure: true,
    }
}

// =============================================================================
// Collaborator doubles
// =============================================================================

/// Notifier that records every alert it is asked to send.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(PersistedTaskResult, JobRecord)>>,
    delay: Option<Duration>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier that takes `delay` to deliver each alert.
    pub fn slow(delay: Duration) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            delay: Some(delay),
        }
    }

    pub fn sent(&self) -> Vec<(PersistedTaskResult, JobRecord)> {
        self.sent.lock().unwrap().clone()
    }

    /// Poll until at least `count` alerts were sent.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if self.sent.lock().unwrap().len() >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.sent.lock().unwrap().len() >= count
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_failure_alert(
        &self,
        result: &PersistedTaskResult,
        job: &JobRecord,
    ) -> Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.sent
            .lock()
            .unwrap()
            .push((result.clone(), job.clone()));
        Ok(())
    }
}

/// Task log that always fails.
pub struct FailingTaskLog;

#[async_trait]
impl TaskLog for FailingTaskLog {
    async fn update_task_result(&self, task_id: i64, _result: &PersistedTaskResult) -> Result<u64> {
        Err(WorkerError::Store(format!("task {}: database unavailable", task_id)))
    }
}

/// Registry whose `register` calls fail on the given (0-based) call numbers.
pub struct FlakyRegistry {
    pub inner: MemoryRegistry,
    failing_calls: Vec<usize>,
    calls: AtomicUsize,
}

impl FlakyRegistry {
    pub fn new(failing_calls: Vec<usize>) -> Self {
        Self {
            inner: MemoryRegistry::new(),
            failing_calls,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Registry for FlakyRegistry {
    async fn register(&self, service: &str, address: &str, ttl_secs: u64) -> Result<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_calls.contains(&call) {
            return Err(WorkerError::Registry("connection refused".to_string()));
        }
        self.inner.register(service, address, ttl_secs).await
    }

    async fn deregister(&self, service: &str, address: &str) -> Result<()> {
        self.inner.deregister(service, address).await
    }
}

/// Registry whose deregistration never completes.
pub struct HangingRegistry {
    pub inner: MemoryRegistry,
}

#[async_trait]
impl Registry for HangingRegistry {
    async fn register(&self, service: &str, address: &str, ttl_secs: u64) -> Result<()> {
        self.inner.register(service, address, ttl_secs).await
    }

    async fn deregister(&self, _service: &str, _address: &str) -> Result<()> {
        std::future::pending().await
    }
}

// =============================================================================
// Service and node fixtures
// =============================================================================

/// Task service wired to in-memory collaborators
pub struct TestService {
    pub service: TaskService,
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub alerts: Arc<AlertPool>,
    pub log_root: tempfile::TempDir,
}

impl TestService {
    pub async fn new() -> Self {
        Self::with_notifier(RecordingNotifier::new()).await
    }

    pub async fn with_notifier(notifier: RecordingNotifier) -> Self {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(notifier);
        Self::build(store.clone(), store, notifier)
    }

    pub fn build(
        store: Arc<MemoryStore>,
        task_log: Arc<dyn TaskLog>,
        notifier: Arc<RecordingNotifier>,
    ) -> Self {
        let log_root = tempfile::tempdir().unwrap();
        let config = test_config(log_root.path());
        let jobs: Arc<dyn JobStore> = store.clone();
        let alerts = Arc::new(AlertPool::start(&config.alerts, jobs, notifier.clone()));
        let pipeline = Arc::new(ResultPipeline::new(task_log, alerts.clone()));
        let service = TaskService::from_config(&config, pipeline);
        Self {
            service,
            store,
            notifier,
            alerts,
            log_root,
        }
    }

    pub fn log_root(&self) -> PathBuf {
        self.log_root.path().to_path_buf()
    }
}

/// A worker node running in the background on an ephemeral port
pub struct TestNode {
    pub addr: SocketAddr,
    pub config: WorkerConfig,
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub shutdown: ShutdownSignal,
    pub handle: JoinHandle<Result<i32>>,
    pub log_root: tempfile::TempDir,
}

impl TestNode {
    pub async fn start(registry: Arc<dyn Registry>) -> Self {
        let log_root = tempfile::tempdir().unwrap();
        let config = test_config(log_root.path());
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::new());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let collaborators = Collaborators {
            registry,
            task_log: store.clone(),
            jobs: store.clone(),
            notifier: notifier.clone(),
        };
        let shutdown = ShutdownSignal::new();
        let node = WorkerNode::new(config.clone(), collaborators);
        let node_shutdown = shutdown.clone();
        let handle =
            tokio::spawn(async move { node.run_with_listener(listener, node_shutdown).await });

        Self {
            addr,
            config,
            store,
            notifier,
            shutdown,
            handle,
            log_root,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

/// Poll `check` until it holds or `timeout` elapses.
pub async fn wait_until<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check().await
}

/// Whether `pid` is gone (or only a zombie waiting to be reaped).
pub fn process_gone(pid: i32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid), None) {
        Err(Errno::ESRCH) => true,
        _ => std::fs::read_to_string(format!("/proc/{}/stat", pid))
            .map(|stat| {
                stat.rsplit(')')
                    .next()
                    .map(|rest| rest.trim_start().starts_with('Z'))
                    .unwrap_or(false)
            })
            .unwrap_or(true),
    }
}
