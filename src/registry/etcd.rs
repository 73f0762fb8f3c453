use std::collections::HashMap;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use tokio::sync::Mutex;

use super::{registry_key, Registry};
use crate::error::{Result, WorkerError};

/// Registry client for etcd's v3 JSON gateway.
///
/// The entry is a key bound to a lease. The first `register` grants the lease
/// and writes the key; later calls keep the lease alive and start over when
/// etcd reports it gone.
#[derive(Debug)]
pub struct EtcdRegistry {
    client: reqwest::Client,
    endpoint: String,
    leases: Mutex<HashMap<String, i64>>,
}

#[derive(Serialize)]
struct LeaseGrantRequest {
    #[serde(rename = "TTL")]
    ttl: u64,
}

#[derive(Serialize)]
struct LeaseIdRequest {
    #[serde(rename = "ID")]
    id: i64,
}

#[derive(Deserialize)]
struct LeaseGrantResponse {
    #[serde(rename = "ID", deserialize_with = "etcd_int")]
    id: i64,
}

#[derive(Deserialize)]
struct KeepAliveResponse {
    #[serde(default)]
    result: Option<KeepAliveResult>,
}

#[derive(Deserialize)]
struct KeepAliveResult {
    #[serde(rename = "TTL", default, deserialize_with = "etcd_int")]
    ttl: i64,
}

#[derive(Serialize)]
struct PutRequest {
    key: String,
    value: String,
    lease: i64,
}

#[derive(Serialize)]
struct DeleteRangeRequest {
    key: String,
}

/// The gateway encodes int64 as JSON strings.
fn etcd_int<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Int {
        Num(i64),
        Str(String),
    }

    match Int::deserialize(deserializer)? {
        Int::Num(n) => Ok(n),
        Int::Str(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

impl EtcdRegistry {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        let endpoint = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint
        } else {
            format!("http://{}", endpoint)
        };
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            leases: Mutex::new(HashMap::new()),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn call<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.endpoint, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| WorkerError::Registry(format!("{}: {}", url, e)))?;
        if !response.status().is_success() {
            return Err(WorkerError::Registry(format!(
                "{} answered {}",
                url,
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| WorkerError::Registry(format!("{}: invalid response: {}", url, e)))
    }

    async fn grant(&self, ttl_secs: u64) -> Result<i64> {
        let grant: LeaseGrantResponse = self
            .call("/v3/lease/grant", &LeaseGrantRequest { ttl: ttl_secs })
            .await?;
        Ok(grant.id)
    }

    /// Returns false when the lease no longer exists.
    async fn keep_alive(&self, lease: i64) -> Result<bool> {
        let response: KeepAliveResponse = self
            .call("/v3/lease/keepalive", &LeaseIdRequest { id: lease })
            .await?;
        Ok(response.result.is_some_and(|r| r.ttl > 0))
    }
}

#[async_trait]
impl Registry for EtcdRegistry {
    async fn register(&self, service: &str, address: &str, ttl_secs: u64) -> Result<()> {
        let key = registry_key(service, address);

        let held = self.leases.lock().await.get(&key).copied();
        if let Some(lease) = held {
            if self.keep_alive(lease).await? {
                tracing::trace!(key = %key, lease, "Lease renewed");
                return Ok(());
            }
            tracing::info!(key = %key, lease, "Lease expired, registering again");
        }

        let lease = self.grant(ttl_secs).await?;
        let _: serde_json::Value = self
            .call(
                "/v3/kv/put",
                &PutRequest {
                    key: BASE64.encode(&key),
                    value: BASE64.encode(address),
                    lease,
                },
            )
            .await?;
        self.leases.lock().await.insert(key.clone(), lease);
        tracing::info!(key = %key, lease, ttl_secs, "Registered with etcd");
        Ok(())
    }

    async fn deregister(&self, service: &str, address: &str) -> Result<()> {
        let key = registry_key(service, address);
        let _: serde_json::Value = self
            .call(
                "/v3/kv/deleterange",
                &DeleteRangeRequest {
                    key: BASE64.encode(&key),
                },
            )
            .await?;

        let lease = self.leases.lock().await.remove(&key);
        if let Some(lease) = lease {
            let _: serde_json::Value = self
                .call("/v3/lease/revoke", &LeaseIdRequest { id: lease })
                .await?;
        }
        tracing::info!(key = %key, "Deregistered from etcd");
        Ok(())
    }
}
