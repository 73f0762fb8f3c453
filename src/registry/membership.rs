use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::Registry;
use crate::config::RegistryConfig;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipState {
    Unregistered,
    Registering,
    Registered,
    Deregistering,
}

impl std::fmt::Display for MembershipState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MembershipState::Unregistered => write!(f, "unregistered"),
            MembershipState::Registering => write!(f, "registering"),
            MembershipState::Registered => write!(f, "registered"),
            MembershipState::Deregistering => write!(f, "deregistering"),
        }
    }
}

/// Keeps this node's entry alive in the service registry.
///
/// The registry is the only authority on liveness: a renewal that fails is
/// logged and retried on the next tick, and the node keeps serving. When the
/// shutdown token fires the entry is removed, bounded by the configured
/// deregistration timeout.
pub struct MembershipManager {
    registry: Arc<dyn Registry>,
    service_name: String,
    address: String,
    lease_ttl_secs: u64,
    renew_interval: Duration,
    deregister_timeout: Duration,
    state: watch::Sender<MembershipState>,
}

impl MembershipManager {
    pub fn new(registry: Arc<dyn Registry>, config: &RegistryConfig, address: String) -> Self {
        let (state, _) = watch::channel(MembershipState::Unregistered);
        Self {
            registry,
            service_name: config.service_name.clone(),
            address,
            lease_ttl_secs: config.lease_ttl_secs,
            renew_interval: config.renew_interval(),
            deregister_timeout: config.deregister_timeout(),
            state,
        }
    }

    pub fn state(&self) -> MembershipState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<MembershipState> {
        self.state.subscribe()
    }

    /// One registration round-trip. Leaves the state untouched on failure.
    pub async fn renew(&self) -> Result<()> {
        self.registry
            .register(&self.service_name, &self.address, self.lease_ttl_secs)
            .await?;
        if self.state.send_replace(MembershipState::Registered) != MembershipState::Registered {
            tracing::info!(
                service = %self.service_name,
                address = %self.address,
                ttl_secs = self.lease_ttl_secs,
                "Registered in service registry"
            );
        }
        Ok(())
    }

    /// Register, renew every interval until `shutdown` fires, then deregister.
    pub async fn run(&self, shutdown: CancellationToken) {
        self.state.send_replace(MembershipState::Registering);
        let mut ticker = tokio::time::interval(self.renew_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.renew().await {
                        tracing::warn!(
                            service = %self.service_name,
                            address = %self.address,
                            state = %self.state(),
                            error = %e,
                            "Registry renewal failed, retrying next interval"
                        );
                    }
                }
            }
        }

        self.deregister().await;
    }

    /// Remove the entry. Returns whether the registry confirmed it in time.
    pub async fn deregister(&self) -> bool {
        self.state.send_replace(MembershipState::Deregistering);
        let confirmed = match tokio::time::timeout(
            self.deregister_timeout,
            self.registry.deregister(&self.service_name, &self.address),
        )
        .await
        {
            Ok(Ok(())) => {
                tracing::info!(
                    service = %self.service_name,
                    address = %self.address,
                    "Deregistered from service registry"
                );
                true
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Deregistration failed, entry will expire with its lease");
                false
            }
            Err(_) => {
                tracing::warn!(
                    timeout = ?self.deregister_timeout,
                    "Deregistration timed out, entry will expire with its lease"
                );
                false
            }
        };
        self.state.send_replace(MembershipState::Unregistered);
        confirmed
    }
}
