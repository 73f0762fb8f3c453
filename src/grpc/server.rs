use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;

use crate::grpc::task_service::TaskService;
use crate::proto::task_server::TaskServer;

pub struct GrpcServer {
    service: TaskService,
}

impl GrpcServer {
    pub fn new(service: TaskService) -> Self {
        Self { service }
    }

    /// Serve on `listener` until `shutdown` fires, then finish in-flight calls.
    pub async fn run_with_listener(
        self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<(), tonic::transport::Error> {
        tracing::info!(addr = ?listener.local_addr().ok(), "Starting gRPC server");

        Server::builder()
            .add_service(TaskServer::new(self.service))
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async move {
                shutdown.cancelled().await
            })
            .await
    }
}
