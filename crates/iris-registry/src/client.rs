//! HTTP client of the registry RPC.

use std::time::Duration;

use iris_config::RegistryConfig;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::Instant;

use crate::error::{RegistryError, RegistryResult};
use crate::registry::{BoxFuture, RegistryKey, ServiceRegistry};

/// Exponential backoff used while waiting for the registry to come up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// First delay.
    pub initial: Duration,
    /// Largest delay.
    pub max: Duration,
    /// Overall deadline.
    pub deadline: Duration,
}

impl RetryPolicy {
    /// Reads the policy from registry configuration.
    #[must_use]
    pub fn from_config(config: &RegistryConfig) -> Self {
        Self {
            initial: Duration::from_millis(config.retry_initial_ms),
            max: Duration::from_millis(config.retry_max_ms),
            deadline: Duration::from_millis(config.connect_timeout_ms),
        }
    }

    /// Delay following `previous`.
    #[must_use]
    pub fn next_delay(&self, previous: Duration) -> Duration {
        (previous * 2).min(self.max)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RegistryConfig::default())
    }
}

#[derive(Debug, Deserialize)]
struct FindReply {
    uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PingReply {
    pong: bool,
}

/// A [`ServiceRegistry`] reached over the registry RPC.
#[derive(Debug, Clone)]
pub struct RemoteRegistry {
    client: Client,
    addr: String,
    base_url: String,
}

impl RemoteRegistry {
    /// Creates a client for the registry at `addr` (`host:port`) without
    /// contacting it.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::Config` if the HTTP client cannot be built.
    pub fn new(addr: impl Into<String>, request_timeout: Duration) -> RegistryResult<Self> {
        let addr = addr.into();
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| RegistryError::config(format!("failed to create client: {e}")))?;

        Ok(Self {
            client,
            base_url: format!("http://{addr}"),
            addr,
        })
    }

    /// Creates a client and waits for the registry to answer a ping,
    /// retrying with backoff.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::Unavailable` if no ping succeeds before the
    /// policy's deadline.
    pub async fn connect(config: &RegistryConfig) -> RegistryResult<Self> {
        let registry = Self::new(
            config.addr.clone(),
            Duration::from_millis(config.request_timeout_ms),
        )?;
        registry
            .wait_until_ready(RetryPolicy::from_config(config))
            .await?;
        Ok(registry)
    }

    /// Pings until the registry answers or the deadline passes.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::Unavailable` with the last failure seen.
    pub async fn wait_until_ready(&self, policy: RetryPolicy) -> RegistryResult<()> {
        let deadline = Instant::now() + policy.deadline;
        let mut delay = policy.initial;

        loop {
            let failure = match self.ping_rpc().await {
                Ok(true) => {
                    tracing::debug!(addr = %self.addr, "Registry reachable");
                    return Ok(());
                }
                Ok(false) => "registry answered ping with pong=false".to_string(),
                Err(e) => e.to_string(),
            };

            let now = Instant::now();
            if now >= deadline {
                return Err(RegistryError::unavailable(&self.addr, failure));
            }

            tracing::debug!(addr = %self.addr, retry_in_ms = delay.as_millis() as u64, "Registry not ready");
            tokio::time::sleep(delay.min(deadline - now)).await;
            delay = policy.next_delay(delay);
        }
    }

    /// The registry address.
    #[must_use]
    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn ping_rpc(&self) -> RegistryResult<bool> {
        let reply: PingReply = self.call("/ping", Value::Null).await?;
        Ok(reply.pong)
    }

    async fn call<T: DeserializeOwned>(&self, path: &str, body: Value) -> RegistryResult<T> {
        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RegistryError::rpc(format!("{path} answered {status}")));
        }

        Ok(response.json::<T>().await?)
    }
}

impl ServiceRegistry for RemoteRegistry {
    fn add<'a>(&'a self, key: &'a RegistryKey, uri: &'a str) -> BoxFuture<'a, RegistryResult<()>> {
        Box::pin(async move {
            let body = json!({"resource": key.resource, "version": key.version, "uri": uri});
            let _: Value = self.call("/add", body).await?;
            Ok(())
        })
    }

    fn find<'a>(&'a self, key: &'a RegistryKey) -> BoxFuture<'a, RegistryResult<Option<String>>> {
        Box::pin(async move {
            let body = json!({"resource": key.resource, "version": key.version});
            let reply: FindReply = self.call("/find", body).await?;
            Ok(reply.uri)
        })
    }

    fn ping(&self) -> BoxFuture<'_, RegistryResult<bool>> {
        Box::pin(self.ping_rpc())
    }

    fn stop(&self) -> BoxFuture<'_, RegistryResult<()>> {
        Box::pin(async move {
            let _: Value = self.call("/stop", Value::Null).await?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_up_to_max() {
        let policy = RetryPolicy {
            initial: Duration::from_millis(50),
            max: Duration::from_millis(150),
            deadline: Duration::from_secs(1),
        };
        let second = policy.next_delay(policy.initial);
        assert_eq!(second, Duration::from_millis(100));
        assert_eq!(policy.next_delay(second), Duration::from_millis(150));
    }

    #[test]
    fn test_policy_from_config() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.initial, Duration::from_millis(50));
        assert_eq!(policy.deadline, Duration::from_millis(5000));
    }

    #[tokio::test]
    async fn test_connect_refused_is_unavailable() {
        // Bind then drop to get a port nothing listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = RegistryConfig {
            addr: addr.to_string(),
            connect_timeout_ms: 100,
            retry_initial_ms: 10,
            retry_max_ms: 20,
            ..RegistryConfig::default()
        };

        let result = RemoteRegistry::connect(&config).await;
        assert!(matches!(result, Err(RegistryError::Unavailable { .. })));
    }
}
