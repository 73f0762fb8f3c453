use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::WorkerConfig;
use crate::error::{Result, WorkerError};
use crate::grpc::{GrpcServer, TaskService};
use crate::notify::Notifier;
use crate::registry::{MembershipManager, Registry};
use crate::report::{AlertPool, ResultPipeline};
use crate::shutdown::ShutdownSignal;
use crate::store::{JobStore, TaskLog};

/// External services a worker node depends on.
#[derive(Clone)]
pub struct Collaborators {
    pub registry: Arc<dyn Registry>,
    pub task_log: Arc<dyn TaskLog>,
    pub jobs: Arc<dyn JobStore>,
    pub notifier: Arc<dyn Notifier>,
}

/// Main node that orchestrates all components
pub struct WorkerNode {
    pub config: Arc<WorkerConfig>,
    collaborators: Collaborators,
}

impl WorkerNode {
    pub fn new(config: WorkerConfig, collaborators: Collaborators) -> Self {
        Self {
            config: Arc::new(config),
            collaborators,
        }
    }

    /// Bind the configured listen address and run until shutdown.
    pub async fn run(self, shutdown: ShutdownSignal) -> Result<i32> {
        let listener = TcpListener::bind(self.config.listen_addr).await?;
        self.run_with_listener(listener, shutdown).await
    }

    /// Run the node on a bound listener.
    ///
    /// 1. Starts the alert workers
    /// 2. Spawns the membership loop (register + renew)
    /// 3. Serves `Task.Run` until the membership loop has finished
    ///
    /// On shutdown the registry entry is removed first, then the server stops
    /// accepting calls and drains in-flight ones, then queued alerts get a
    /// bounded chance to go out. Returns the process exit code: the signal
    /// number that caused the shutdown, or 0.
    ///
    /// # Errors
    ///
    /// Returns an error if the gRPC server fails. The registry entry is still
    /// removed in that case.
    pub async fn run_with_listener(
        self,
        listener: TcpListener,
        shutdown: ShutdownSignal,
    ) -> Result<i32> {
        let config = self.config;
        let Collaborators {
            registry,
            task_log,
            jobs,
            notifier,
        } = self.collaborators;

        let alerts = Arc::new(AlertPool::start(&config.alerts, jobs, notifier));
        let pipeline = Arc::new(ResultPipeline::new(task_log, alerts.clone()));
        let service = TaskService::from_config(&config, pipeline);

        tracing::info!(
            listen_addr = ?listener.local_addr().ok(),
            advertise_addr = %config.advertise_addr,
            service = %config.registry.service_name,
            "Starting worker node"
        );

        // Spawn membership loop; the server keeps running until it has deregistered
        let membership = MembershipManager::new(
            registry,
            &config.registry,
            config.advertise_addr.to_string(),
        );
        let serve_stop = CancellationToken::new();
        let membership_handle = {
            let shutdown_token = shutdown.token();
            let serve_stop = serve_stop.clone();
            tokio::spawn(async move {
                membership.run(shutdown_token).await;
                serve_stop.cancel();
            })
        };

        // Run gRPC server (blocks)
        let served = GrpcServer::new(service)
            .run_with_listener(listener, serve_stop)
            .await;
        if let Err(ref e) = served {
            tracing::error!(error = %e, "gRPC server failed");
            shutdown.trigger(None);
        }

        membership_handle
            .await
            .map_err(|e| WorkerError::Internal(format!("membership task failed: {}", e)))?;
        alerts.shutdown(config.alerts.drain_timeout()).await;
        served?;

        let code = shutdown.exit_code();
        tracing::info!(exit_code = code, "Worker node stopped");
        Ok(code)
    }
}
