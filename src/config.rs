use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, WorkerError};

/// Service registry membership settings.
///
/// The node keeps a leased key `/<service_name>/<address>` alive in the
/// registry. The lease must outlive at least one missed renewal, so
/// `lease_ttl_secs` has to be larger than `renew_interval_secs`.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Base URL of the registry's HTTP gateway (e.g. "http://127.0.0.1:2379")
    pub endpoint: String,
    /// Logical service name the node registers under
    pub service_name: String,
    /// Lease time-to-live in seconds
    pub lease_ttl_secs: u64,
    /// Renewal period in seconds
    pub renew_interval_secs: u64,
    /// Upper bound on the deregistration round-trip during shutdown
    pub deregister_timeout_ms: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:2379".to_string(),
            service_name: "task".to_string(),
            lease_ttl_secs: 15,
            renew_interval_secs: 5,
            deregister_timeout_ms: 3000,
        }
    }
}

impl RegistryConfig {
    pub fn renew_interval(&self) -> Duration {
        Duration::from_secs(self.renew_interval_secs)
    }

    pub fn deregister_timeout(&self) -> Duration {
        Duration::from_millis(self.deregister_timeout_ms)
    }
}

/// Command execution settings shared by every strategy.
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Root under which `log/cronlog/<YYYY-MM-DD>/` day buckets are created
    pub log_root: PathBuf,
    /// Interpreter used by the shell strategy (invoked as `<shell> -c <command>`)
    pub shell: String,
    /// Maximum bytes kept in memory per captured stream
    pub max_output_bytes: usize,
    /// How long to wait for a killed process group to be reaped
    pub kill_grace_ms: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            log_root: PathBuf::from("."),
            shell: "/bin/sh".to_string(),
            max_output_bytes: 1024 * 1024,
            kill_grace_ms: 2000,
        }
    }
}

impl ExecutionConfig {
    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }
}

/// Failure alert delivery settings.
#[derive(Debug, Clone)]
pub struct AlertConfig {
    /// Number of alert workers
    pub workers: usize,
    /// Alerts queued beyond this are dropped
    pub queue_capacity: usize,
    /// Upper bound on draining queued alerts at shutdown
    pub drain_timeout_ms: u64,
    /// Optional webhook receiving JSON alerts. Alerts are only logged when unset.
    pub webhook_url: Option<String>,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            queue_capacity: 256,
            drain_timeout_ms: 5000,
            webhook_url: None,
        }
    }
}

impl AlertConfig {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

/// Immutable node configuration, built once at startup.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub listen_addr: SocketAddr,
    /// Address published to the registry and reported as the executing host
    pub advertise_addr: SocketAddr,
    pub registry: RegistryConfig,
    pub execution: ExecutionConfig,
    pub alerts: AlertConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        let addr = SocketAddr::from(([127, 0, 0, 1], 8973));
        Self {
            listen_addr: addr,
            advertise_addr: addr,
            registry: RegistryConfig::default(),
            execution: ExecutionConfig::default(),
            alerts: AlertConfig::default(),
        }
    }
}

impl WorkerConfig {
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            advertise_addr: listen_addr,
            ..Default::default()
        }
    }

    pub fn with_advertise_addr(mut self, addr: SocketAddr) -> Self {
        self.advertise_addr = addr;
        self
    }

    pub fn with_log_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.execution.log_root = root.into();
        self
    }

    /// Host identity reported in every task response and result record.
    pub fn host(&self) -> String {
        self.advertise_addr.ip().to_string()
    }

    /// Reject settings the node cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.advertise_addr.ip().is_unspecified() {
            return Err(WorkerError::Config(format!(
                "advertise address {} is a wildcard; set an address other nodes can reach",
                self.advertise_addr
            )));
        }
        if self.registry.service_name.trim().is_empty() {
            return Err(WorkerError::Config("service name must not be empty".into()));
        }
        if self.registry.renew_interval_secs == 0 {
            return Err(WorkerError::Config(
                "renew interval must be at least one second".into(),
            ));
        }
        if self.registry.lease_ttl_secs <= self.registry.renew_interval_secs {
            return Err(WorkerError::Config(format!(
                "lease ttl ({}s) must exceed renew interval ({}s)",
                self.registry.lease_ttl_secs, self.registry.renew_interval_secs
            )));
        }
        if self.alerts.workers == 0 || self.alerts.queue_capacity == 0 {
            return Err(WorkerError::Config(
                "alert pool needs at least one worker and one queue slot".into(),
            ));
        }
        Ok(())
    }
}
