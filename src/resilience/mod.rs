//! Retry and circuit breaking around object-store calls.
//!
//! A [`ResiliencePolicy`] owns one retry configuration and one
//! [`CircuitBreaker`]. [`ResilientStore`] routes every [`ObjectStore`]
//! operation of the wrapped client through the same policy, so failures of
//! one operation type count against all the others.
//!
//! Each attempt is admitted by the breaker first. When the breaker rejects,
//! the call fails with [`StoreError::CircuitOpen`] without reaching the
//! backend. Only transient failures ([`StoreError::is_transient`]) are
//! retried and recorded as breaker failures; definitive answers such as
//! `NotFound` are returned as-is.

mod breaker;

pub use breaker::{BreakerConfig, CircuitBreaker, CircuitState, Permit};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::contract::{ListPage, ListQuery, ObjectAcl, ObjectStore};
use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Upper bound on a single attempt.
    pub attempt_timeout: Duration,
    /// Pause between a failed attempt and the next one.
    pub retry_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(30),
            retry_delay: Duration::from_millis(200),
        }
    }
}

#[derive(Debug)]
pub struct ResiliencePolicy {
    retry: RetryConfig,
    breaker: CircuitBreaker,
}

impl Default for ResiliencePolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default(), BreakerConfig::default())
    }
}

impl ResiliencePolicy {
    pub fn new(retry: RetryConfig, breaker: BreakerConfig) -> Self {
        Self {
            retry: RetryConfig {
                max_attempts: retry.max_attempts.max(1),
                ..retry
            },
            breaker: CircuitBreaker::new(breaker),
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Run `op` under the retry and breaker rules.
    ///
    /// `op` is invoked from scratch for every attempt.
    pub async fn call<T, F, Fut>(&self, operation: &'static str, op: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        self.call_with_timeout(operation, self.retry.attempt_timeout, op)
            .await
    }

    /// Like [`Self::call`], with `attempt_timeout` bounding each attempt
    /// instead of the configured one.
    pub async fn call_with_timeout<T, F, Fut>(
        &self,
        operation: &'static str,
        attempt_timeout: Duration,
        mut op: F,
    ) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let max_attempts = self.retry.max_attempts;
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            let Some(permit) = self.breaker.admit() else {
                warn!(operation, attempt, "Circuit open, rejecting call");
                return Err(StoreError::CircuitOpen { operation });
            };

            match tokio::time::timeout(attempt_timeout, op()).await {
                Ok(Ok(value)) => {
                    permit.success();
                    if attempt > 1 {
                        debug!(operation, attempt, "Call succeeded after retry");
                    }
                    return Ok(value);
                }
                Ok(Err(err)) if !err.is_transient() => {
                    permit.success();
                    return Err(err);
                }
                Ok(Err(err)) => {
                    permit.failure();
                    warn!(operation, attempt, max_attempts, error = %err, "Attempt failed");
                    last_error = Some(err);
                }
                Err(_) => {
                    permit.failure();
                    warn!(
                        operation,
                        attempt,
                        max_attempts,
                        timeout = ?attempt_timeout,
                        "Attempt timed out"
                    );
                    last_error = Some(StoreError::backend(
                        operation,
                        format!("attempt timed out after {attempt_timeout:?}"),
                    ));
                }
            }

            if attempt < max_attempts && !self.retry.retry_delay.is_zero() {
                tokio::time::sleep(self.retry.retry_delay).await;
            }
        }

        let source = last_error.unwrap_or_else(|| StoreError::backend(operation, "no attempt made"));
        Err(StoreError::OperationFailed {
            operation,
            attempts: max_attempts,
            source: Box::new(source),
        })
    }
}

/// [`ObjectStore`] decorator applying one shared [`ResiliencePolicy`].
#[derive(Debug)]
pub struct ResilientStore<S> {
    inner: S,
    policy: Arc<ResiliencePolicy>,
}

impl<S: ObjectStore> ResilientStore<S> {
    pub fn new(inner: S, policy: Arc<ResiliencePolicy>) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &ResiliencePolicy {
        &self.policy
    }
}

#[async_trait]
impl<S: ObjectStore> ObjectStore for ResilientStore<S> {
    async fn create_bucket(&self, bucket: &str) -> Result<(), StoreError> {
        self.policy
            .call("create_bucket", || self.inner.create_bucket(bucket))
            .await
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<(), StoreError> {
        self.policy
            .call("delete_bucket", || self.inner.delete_bucket(bucket))
            .await
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        bytes: &[u8],
        acl: Option<ObjectAcl>,
    ) -> Result<(), StoreError> {
        self.policy
            .call("put_object", || self.inner.put_object(bucket, key, bytes, acl))
            .await
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        self.policy
            .call("get_object", || self.inner.get_object(bucket, key))
            .await
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        self.policy
            .call("delete_object", || self.inner.delete_object(bucket, key))
            .await
    }

    async fn list_objects(&self, bucket: &str, query: &ListQuery) -> Result<ListPage, StoreError> {
        self.policy
            .call("list_objects", || self.inner.list_objects(bucket, query))
            .await
    }

    async fn wait_for_absence(
        &self,
        bucket: &str,
        key: &str,
        timeout: Duration,
    ) -> Result<(), StoreError> {
        // A present key keeps the inner wait busy for the full `timeout`.
        let attempt_timeout = self.policy.retry.attempt_timeout.saturating_add(timeout);
        self.policy
            .call_with_timeout("wait_for_absence", attempt_timeout, || {
                self.inner.wait_for_absence(bucket, key, timeout)
            })
            .await
    }
}
