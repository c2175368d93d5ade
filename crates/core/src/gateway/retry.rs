//! Retry and timeout policy for gateway calls
//!
//! Every call gets a deadline. Transient failures back off exponentially up
//! to a cap; verdicts like "not found" return immediately.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{sleep, timeout};
use tracing::warn;
use uuid::Uuid;

use super::{
    ContentCatalog, GatewayError, GatewayResult, IdentityGateway, PackInfo, PackValidation,
    UserIdentity,
};
use crate::config::RetryConfig;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
    call_timeout: Duration,
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        initial_backoff: Duration,
        max_backoff: Duration,
        call_timeout: Duration,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff,
            call_timeout,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.initial_backoff_ms),
            Duration::from_millis(config.max_backoff_ms),
            Duration::from_secs(config.call_timeout_secs),
        )
    }

    /// Run a retriable call to completion under the policy
    pub async fn run<T, F, Fut>(&self, op: &'static str, mut call: F) -> GatewayResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = GatewayResult<T>>,
    {
        let mut backoff = self.initial_backoff;
        let mut attempt = 1;
        loop {
            let outcome = self.deadline(op, call()).await;
            match outcome {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    warn!(op, attempt, error = %e, "transient gateway failure, retrying");
                    sleep(backoff).await;
                    backoff = (backoff * 2).min(self.max_backoff);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Apply only the deadline, for calls with side effects that must not
    /// repeat
    pub async fn run_once<T, Fut>(&self, op: &'static str, call: Fut) -> GatewayResult<T>
    where
        Fut: Future<Output = GatewayResult<T>>,
    {
        self.deadline(op, call).await
    }

    async fn deadline<T, Fut>(&self, op: &'static str, call: Fut) -> GatewayResult<T>
    where
        Fut: Future<Output = GatewayResult<T>>,
    {
        match timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::DeadlineExceeded(format!(
                "{op} exceeded {:?}",
                self.call_timeout
            ))),
        }
    }
}

/// Identity gateway wrapped in the retry policy
pub struct RetryingIdentity {
    inner: Arc<dyn IdentityGateway>,
    policy: RetryPolicy,
}

impl RetryingIdentity {
    pub fn new(inner: Arc<dyn IdentityGateway>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl IdentityGateway for RetryingIdentity {
    async fn resolve(&self, user_id: Uuid) -> GatewayResult<UserIdentity> {
        self.policy
            .run("identity.resolve", || self.inner.resolve(user_id))
            .await
    }

    async fn verify(&self, credential: &str) -> GatewayResult<UserIdentity> {
        self.policy
            .run("identity.verify", || self.inner.verify(credential))
            .await
    }
}

/// Catalog gateway wrapped in the retry policy
pub struct RetryingCatalog {
    inner: Arc<dyn ContentCatalog>,
    policy: RetryPolicy,
}

impl RetryingCatalog {
    pub fn new(inner: Arc<dyn ContentCatalog>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl ContentCatalog for RetryingCatalog {
    async fn validate(&self, pack_id: Uuid, user_id: Uuid) -> GatewayResult<PackValidation> {
        self.policy
            .run("catalog.validate", || self.inner.validate(pack_id, user_id))
            .await
    }

    async fn describe(&self, pack_id: Uuid) -> GatewayResult<PackInfo> {
        self.policy
            .run("catalog.describe", || self.inner.describe(pack_id))
            .await
    }
}
