use clap::{Parser, ValueEnum};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use cron_worker::config::{AlertConfig, ExecutionConfig, RegistryConfig, WorkerConfig};
use cron_worker::node::{Collaborators, WorkerNode};
use cron_worker::notify::{LogNotifier, Notifier, WebhookNotifier};
use cron_worker::proto::task_client::TaskClient;
use cron_worker::proto::TaskRequest;
use cron_worker::registry::EtcdRegistry;
use cron_worker::shutdown::install_shutdown_handler;
use cron_worker::store::{JobCatalog, JsonlTaskLog};

#[derive(Parser, Debug)]
#[command(name = "cron-worker")]
#[command(version)]
#[command(about = "Task execution node for a distributed cron fleet")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start a worker node
    Server(ServerArgs),

    /// Task commands against a running node
    Task {
        #[command(flatten)]
        client: ClientArgs,

        #[command(subcommand)]
        command: TaskCommands,
    },
}

// =============================================================================
// Server Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ServerArgs {
    /// Address to listen on for gRPC
    #[arg(long, env = "CRON_WORKER_ADDR", default_value = "127.0.0.1:8973")]
    addr: SocketAddr,

    /// Address published to the registry (defaults to --addr, required when --addr is a wildcard)
    #[arg(long, env = "CRON_WORKER_ADVERTISE_ADDR")]
    advertise_addr: Option<SocketAddr>,

    /// etcd address (JSON gateway)
    #[arg(long, env = "CRON_WORKER_ETCD_ADDR", default_value = "127.0.0.1:2379")]
    etcd_addr: String,

    /// Service name to register under
    #[arg(long, env = "CRON_WORKER_SERVICE_NAME", default_value = "task")]
    service_name: String,

    /// Registry lease TTL in seconds
    #[arg(long, default_value = "15")]
    lease_ttl: u64,

    /// Registry renewal interval in seconds
    #[arg(long, default_value = "5")]
    renew_interval: u64,

    /// Root directory for per-task logs (log/cronlog/<date>/...)
    #[arg(long, env = "CRON_WORKER_LOG_ROOT", default_value = ".")]
    log_root: PathBuf,

    /// Shell used to run commands
    #[arg(long, default_value = "/bin/sh")]
    shell: String,

    /// Bytes of output kept per stream in responses
    #[arg(long, default_value = "1048576")]
    max_output_bytes: usize,

    /// Task result log (JSON lines). Defaults to <log-root>/log/task-results.jsonl
    #[arg(long)]
    task_log: Option<PathBuf>,

    /// Job catalog (JSON array of job records) used for failure alerts
    #[arg(long)]
    jobs: Option<PathBuf>,

    /// Webhook receiving failure alerts. Alerts are only logged when unset.
    #[arg(long, env = "CRON_WORKER_ALERT_WEBHOOK")]
    alert_webhook: Option<String>,

    /// Number of alert workers
    #[arg(long, default_value = "2")]
    alert_workers: usize,
}

impl ServerArgs {
    fn to_config(&self) -> WorkerConfig {
        WorkerConfig {
            listen_addr: self.addr,
            advertise_addr: self.advertise_addr.unwrap_or(self.addr),
            registry: RegistryConfig {
                endpoint: self.etcd_addr.clone(),
                service_name: self.service_name.clone(),
                lease_ttl_secs: self.lease_ttl,
                renew_interval_secs: self.renew_interval,
                ..RegistryConfig::default()
            },
            execution: ExecutionConfig {
                log_root: self.log_root.clone(),
                shell: self.shell.clone(),
                max_output_bytes: self.max_output_bytes,
                ..ExecutionConfig::default()
            },
            alerts: AlertConfig {
                workers: self.alert_workers,
                webhook_url: self.alert_webhook.clone(),
                ..AlertConfig::default()
            },
        }
    }
}

// =============================================================================
// Client Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ClientArgs {
    /// Worker address
    #[arg(long, short = 'a', default_value = "http://127.0.0.1:8973")]
    addr: String,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(clap::Subcommand, Debug)]
enum TaskCommands {
    /// Run a command on the worker and wait for its result
    Run {
        /// The command to execute (a URL for curl/wget)
        #[arg(long, short = 'c')]
        command: String,

        /// Timeout in seconds (0 = unbounded)
        #[arg(long, default_value = "0")]
        timeout: i64,

        #[arg(long, default_value = "0")]
        task_id: i64,

        #[arg(long, default_value = "0")]
        job_id: i64,

        /// Execution type: shell, curl or wget
        #[arg(long, default_value = "shell")]
        query_type: String,
    },
}

#[derive(Serialize)]
struct TaskRunOutput {
    output: String,
    err: String,
    status: i64,
    host: String,
    end_time: String,
}

// =============================================================================
// Server Implementation
// =============================================================================

async fn run_server(args: ServerArgs) -> Result<i32, Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = args.to_config();
    config.validate()?;

    let task_log_path = args.task_log.clone().unwrap_or_else(|| {
        config
            .execution
            .log_root
            .join("log")
            .join("task-results.jsonl")
    });
    let task_log = JsonlTaskLog::open(&task_log_path).await?;
    let jobs = match &args.jobs {
        Some(path) => JobCatalog::load(path).await?,
        None => {
            tracing::warn!("No job catalog configured, failure alerts will be dropped");
            JobCatalog::default()
        }
    };
    let notifier: Arc<dyn Notifier> = match &config.alerts.webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(url.clone())),
        None => Arc::new(LogNotifier),
    };

    tracing::info!(
        listen_addr = %config.listen_addr,
        advertise_addr = %config.advertise_addr,
        etcd = %config.registry.endpoint,
        service = %config.registry.service_name,
        log_root = %config.execution.log_root.display(),
        task_log = %task_log_path.display(),
        "Starting cron-worker"
    );

    let collaborators = Collaborators {
        registry: Arc::new(EtcdRegistry::new(config.registry.endpoint.clone())),
        task_log: Arc::new(task_log),
        jobs: Arc::new(jobs),
        notifier,
    };

    let shutdown = install_shutdown_handler()?;
    let node = WorkerNode::new(config, collaborators);
    Ok(node.run(shutdown).await?)
}

// =============================================================================
// Client Command Handlers
// =============================================================================

async fn handle_task_run(
    client: &ClientArgs,
    request: TaskRequest,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut grpc_client = TaskClient::connect(client.addr.clone()).await?;
    let response = grpc_client.run(request).await?.into_inner();

    match client.output {
        OutputFormat::Json => {
            let output = TaskRunOutput {
                output: response.output,
                err: response.err,
                status: response.status,
                host: response.host,
                end_time: response.endtime,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => {
            println!("Host:     {}", response.host);
            println!("Status:   {}", response.status);
            println!("Finished: {}", response.endtime);
            if !response.output.is_empty() {
                println!("Output:");
                for line in response.output.lines() {
                    println!("  {}", line);
                }
            }
            if !response.err.is_empty() {
                println!("Error:");
                for line in response.err.lines() {
                    println!("  {}", line);
                }
            }
        }
    }

    if response.status != 0 {
        std::process::exit(1);
    }
    Ok(())
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.command {
        Commands::Server(server_args) => {
            let code = run_server(server_args).await?;
            std::process::exit(code);
        }
        Commands::Task { client, command } => match command {
            TaskCommands::Run {
                command,
                timeout,
                task_id,
                job_id,
                query_type,
            } => {
                let request = TaskRequest {
                    command,
                    timeout,
                    taskid: task_id,
                    jobid: job_id,
                    querytype: query_type,
                };
                handle_task_run(&client, request).await?;
            }
        },
    }

    Ok(())
}
