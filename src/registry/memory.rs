use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::{registry_key, Registry};
use crate::error::Result;

/// In-process registry with lease expiry.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    entries: RwLock<HashMap<String, Instant>>,
    registrations: AtomicU64,
    deregistrations: AtomicU64,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the entry exists and its lease has not run out.
    pub async fn is_registered(&self, service: &str, address: &str) -> bool {
        self.entries
            .read()
            .await
            .get(&registry_key(service, address))
            .is_some_and(|expires| *expires > Instant::now())
    }

    /// Live addresses registered under `service`.
    pub async fn members(&self, service: &str) -> Vec<String> {
        let prefix = format!("/{}/", service);
        let now = Instant::now();
        let mut members: Vec<String> = self
            .entries
            .read()
            .await
            .iter()
            .filter(|(_, expires)| **expires > now)
            .filter_map(|(key, _)| key.strip_prefix(&prefix).map(str::to_string))
            .collect();
        members.sort();
        members
    }

    pub fn registrations(&self) -> u64 {
        self.registrations.load(Ordering::Relaxed)
    }

    pub fn deregistrations(&self) -> u64 {
        self.deregistrations.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn register(&self, service: &str, address: &str, ttl_secs: u64) -> Result<()> {
        let expires = Instant::now() + Duration::from_secs(ttl_secs);
        self.entries
            .write()
            .await
            .insert(registry_key(service, address), expires);
        self.registrations.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn deregister(&self, service: &str, address: &str) -> Result<()> {
        self.entries
            .write()
            .await
            .remove(&registry_key(service, address));
        self.deregistrations.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_and_deregister() {
        let registry = MemoryRegistry::new();
        registry.register("task", "10.0.0.1:8973", 10).await.unwrap();
        registry.register("task", "10.0.0.2:8973", 10).await.unwrap();

        assert!(registry.is_registered("task", "10.0.0.1:8973").await);
        assert_eq!(
            registry.members("task").await,
            vec!["10.0.0.1:8973".to_string(), "10.0.0.2:8973".to_string()]
        );

        registry.deregister("task", "10.0.0.1:8973").await.unwrap();
        assert!(!registry.is_registered("task", "10.0.0.1:8973").await);
        assert_eq!(registry.registrations(), 2);
        assert_eq!(registry.deregistrations(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn lease_expires_without_renewal() {
        let registry = MemoryRegistry::new();
        registry.register("task", "10.0.0.1:8973", 5).await.unwrap();

        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(registry.is_registered("task", "10.0.0.1:8973").await);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!registry.is_registered("task", "10.0.0.1:8973").await);
        assert!(registry.members("task").await.is_empty());
    }
}
