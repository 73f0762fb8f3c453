//! Service registry membership.
//!
//! This node publishes `/<service>/<address>` under a lease and keeps it
//! alive from a background loop ([`MembershipManager`]). The registry itself
//! is an external lease-based key service; [`EtcdRegistry`] talks to etcd's
//! v3 JSON gateway and [`MemoryRegistry`] is an in-process stand-in.

pub mod etcd;
pub mod membership;
pub mod memory;

use async_trait::async_trait;

use crate::error::Result;

pub use etcd::EtcdRegistry;
pub use membership::{MembershipManager, MembershipState};
pub use memory::MemoryRegistry;

#[async_trait]
pub trait Registry: Send + Sync {
    /// Establish or refresh the leased entry. Must be idempotent.
    async fn register(&self, service: &str, address: &str, ttl_secs: u64) -> Result<()>;

    /// Remove the entry.
    async fn deregister(&self, service: &str, address: &str) -> Result<()>;
}

pub fn registry_key(service: &str, address: &str) -> String {
    format!("/{}/{}", service, address)
}
