use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};

use crate::config::WorkerConfig;
use crate::proto::task_server::Task;
use crate::proto::{TaskRequest, TaskResponse};
use crate::report::ResultPipeline;
use crate::worker::{CommandDispatcher, ExecutionOutcome, Executor, LogLayout};

/// gRPC `Task` service: runs one command per call and reports the outcome.
///
/// Stateless between calls. Execution problems are answered with a
/// well-formed response carrying a non-zero status; no call fails at the
/// RPC level because of what the command did.
#[derive(Clone)]
pub struct TaskService {
    host: String,
    dispatcher: CommandDispatcher,
    executor: Executor,
    pipeline: Arc<ResultPipeline>,
}

impl TaskService {
    pub fn new(
        host: String,
        dispatcher: CommandDispatcher,
        executor: Executor,
        pipeline: Arc<ResultPipeline>,
    ) -> Self {
        Self {
            host,
            dispatcher,
            executor,
            pipeline,
        }
    }

    pub fn from_config(config: &WorkerConfig, pipeline: Arc<ResultPipeline>) -> Self {
        Self::new(
            config.host(),
            CommandDispatcher::new(LogLayout::new(config.execution.log_root.clone())),
            Executor::new(&config.execution),
            pipeline,
        )
    }

    /// Dispatch, execute and record `request`.
    pub async fn execute(&self, request: &TaskRequest) -> TaskResponse {
        self.execute_until(request, &CancellationToken::new()).await
    }

    /// Same as [`TaskService::execute`], stopping the command when `cancel`
    /// fires. A cancelled attempt is still recorded.
    pub async fn execute_until(
        &self,
        request: &TaskRequest,
        cancel: &CancellationToken,
    ) -> TaskResponse {
        tracing::debug!(
            task_id = request.taskid,
            job_id = request.jobid,
            query_type = %request.querytype,
            "Received task"
        );

        let outcome = match self.dispatcher.assemble(request).await {
            Ok(cmd) => self.executor.run_until(&cmd, cancel).await,
            Err(e) => {
                tracing::error!(task_id = request.taskid, error = %e, "Failed to prepare task");
                ExecutionOutcome::error(e.to_string())
            }
        }
        .with_host(self.host.as_str());

        let record = self.pipeline.complete(&outcome, request).await;

        tracing::info!(
            task_id = request.taskid,
            job_id = request.jobid,
            status = outcome.code,
            error = outcome.err_text(),
            "Task finished"
        );

        TaskResponse {
            err: outcome.err_text().to_string(),
            output: outcome.result,
            status: outcome.code,
            host: outcome.host,
            endtime: record.end_time,
        }
    }
}

#[tonic::async_trait]
impl Task for TaskService {
    /// Runs the attempt on its own task so it is recorded even if the caller
    /// disconnects; the drop guard cancels the command in that case.
    async fn run(&self, request: Request<TaskRequest>) -> Result<Response<TaskResponse>, Status> {
        let req = request.into_inner();
        let cancel = CancellationToken::new();
        let guard = cancel.clone().drop_guard();

        let service = self.clone();
        let attempt = tokio::spawn(async move { service.execute_until(&req, &cancel).await });
        let response = attempt.await.map_err(|e| {
            tracing::error!(error = %e, "Task attempt aborted");
            Status::internal(format!("task attempt aborted: {}", e))
        })?;

        guard.disarm();
        Ok(Response::new(response))
    }
}
