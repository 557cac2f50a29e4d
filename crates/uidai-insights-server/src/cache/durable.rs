// SPDX-License-Identifier: Apache-2.0

use super::CacheError;
use async_trait::async_trait;
use redis::AsyncCommands;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::timeout;

/// Shared key/value tier that survives restarts. Values are opaque bytes
/// written with a time-to-live.
#[async_trait]
pub trait DurableCache: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError>;

    /// Counters for health reporting; `None` when the backend keeps none.
    fn metrics(&self) -> Option<DurableCacheMetricsSnapshot> {
        None
    }
}

#[derive(Clone, Debug)]
pub struct RedisPolicy {
    pub timeout: Duration,
    pub retry_attempts: usize,
    pub breaker_failure_threshold: u32,
    pub breaker_open_duration: Duration,
    pub max_key_bytes: usize,
    pub max_value_bytes: usize,
    pub max_ttl: Duration,
}

impl Default for RedisPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(500),
            retry_attempts: 2,
            breaker_failure_threshold: 8,
            breaker_open_duration: Duration::from_millis(3000),
            max_key_bytes: 256,
            max_value_bytes: 1024 * 1024,
            max_ttl: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

#[derive(Default)]
struct BreakerState {
    failure_count: u32,
    open_until: Option<Instant>,
}

#[derive(Default)]
struct DurableCacheMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    read_fallbacks: AtomicU64,
    write_fallbacks: AtomicU64,
    breaker_open_total: AtomicU64,
    breaker_reject_total: AtomicU64,
    policy_reject_total: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DurableCacheMetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub read_fallbacks: u64,
    pub write_fallbacks: u64,
    pub breaker_open_total: u64,
    pub breaker_reject_total: u64,
    pub policy_reject_total: u64,
}

#[derive(Clone)]
pub struct RedisDurableCache {
    client: redis::Client,
    prefix: String,
    policy: RedisPolicy,
    breaker: Arc<Mutex<BreakerState>>,
    metrics: Arc<DurableCacheMetrics>,
}

impl RedisDurableCache {
    /// Opening the client does not connect; an unreachable server surfaces
    /// on the first read or write.
    pub fn new(url: &str, prefix: &str, policy: RedisPolicy) -> Result<Self, CacheError> {
        let client = redis::Client::open(url).map_err(|e| CacheError(e.to_string()))?;
        Ok(Self {
            client,
            prefix: prefix.to_string(),
            policy,
            breaker: Arc::new(Mutex::new(BreakerState::default())),
            metrics: Arc::new(DurableCacheMetrics::default()),
        })
    }

    #[must_use]
    pub fn metrics_snapshot(&self) -> DurableCacheMetricsSnapshot {
        DurableCacheMetricsSnapshot {
            hits: self.metrics.hits.load(Ordering::Relaxed),
            misses: self.metrics.misses.load(Ordering::Relaxed),
            read_fallbacks: self.metrics.read_fallbacks.load(Ordering::Relaxed),
            write_fallbacks: self.metrics.write_fallbacks.load(Ordering::Relaxed),
            breaker_open_total: self.metrics.breaker_open_total.load(Ordering::Relaxed),
            breaker_reject_total: self.metrics.breaker_reject_total.load(Ordering::Relaxed),
            policy_reject_total: self.metrics.policy_reject_total.load(Ordering::Relaxed),
        }
    }

    fn storage_key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}:{key}", self.prefix)
        }
    }

    async fn breaker_check(&self) -> Result<(), CacheError> {
        let lock = self.breaker.lock().await;
        if let Some(until) = lock.open_until {
            if Instant::now() < until {
                self.metrics
                    .breaker_reject_total
                    .fetch_add(1, Ordering::Relaxed);
                return Err(CacheError("redis breaker open".to_string()));
            }
        }
        Ok(())
    }

    async fn record_failure(&self, fallback_counter: &AtomicU64, msg: String) -> CacheError {
        fallback_counter.fetch_add(1, Ordering::Relaxed);
        let mut lock = self.breaker.lock().await;
        lock.failure_count += 1;
        if lock.failure_count >= self.policy.breaker_failure_threshold {
            lock.open_until = Some(Instant::now() + self.policy.breaker_open_duration);
            self.metrics
                .breaker_open_total
                .fetch_add(1, Ordering::Relaxed);
        }
        CacheError(msg)
    }

    async fn record_success(&self) {
        let mut lock = self.breaker.lock().await;
        lock.failure_count = 0;
        lock.open_until = None;
    }

    async fn with_retry<T, Fut, F>(&self, mut op: F) -> Result<T, String>
    where
        F: FnMut() -> Fut + Send,
        Fut: std::future::Future<Output = Result<T, String>> + Send,
        T: Send,
    {
        let attempts = self.policy.retry_attempts.max(1);
        let mut last = None;
        for i in 0..attempts {
            match timeout(self.policy.timeout, op()).await {
                Ok(Ok(v)) => return Ok(v),
                Ok(Err(e)) => last = Some(e),
                Err(_) => last = Some("redis timeout".to_string()),
            }
            if i + 1 < attempts {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }
        Err(last.unwrap_or_else(|| "redis failure".to_string()))
    }
}

#[async_trait]
impl DurableCache for RedisDurableCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.breaker_check().await?;
        let storage_key = self.storage_key(key);
        let client = self.client.clone();
        let result = self
            .with_retry(move || {
                let client = client.clone();
                let storage_key = storage_key.clone();
                async move {
                    let mut conn = client
                        .get_multiplexed_async_connection()
                        .await
                        .map_err(|e| e.to_string())?;
                    let value: Option<Vec<u8>> =
                        conn.get(storage_key).await.map_err(|e| e.to_string())?;
                    Ok(value)
                }
            })
            .await;
        match result {
            Ok(Some(v)) => {
                self.metrics.hits.fetch_add(1, Ordering::Relaxed);
                self.record_success().await;
                Ok(Some(v))
            }
            Ok(None) => {
                self.metrics.misses.fetch_add(1, Ordering::Relaxed);
                self.record_success().await;
                Ok(None)
            }
            Err(e) => Err(self.record_failure(&self.metrics.read_fallbacks, e).await),
        }
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        self.breaker_check().await?;
        let storage_key = self.storage_key(key);
        if storage_key.len() > self.policy.max_key_bytes {
            self.metrics
                .policy_reject_total
                .fetch_add(1, Ordering::Relaxed);
            return Err(CacheError(
                "redis key rejected by max key size policy".to_string(),
            ));
        }
        if value.len() > self.policy.max_value_bytes {
            self.metrics
                .policy_reject_total
                .fetch_add(1, Ordering::Relaxed);
            return Err(CacheError(format!(
                "redis value of {} bytes rejected by max value size policy",
                value.len()
            )));
        }
        let ttl_secs = ttl.as_secs().clamp(1, self.policy.max_ttl.as_secs().max(1));
        let payload = value.to_vec();
        let client = self.client.clone();
        let result = self
            .with_retry(move || {
                let client = client.clone();
                let storage_key = storage_key.clone();
                let payload = payload.clone();
                async move {
                    let mut conn = client
                        .get_multiplexed_async_connection()
                        .await
                        .map_err(|e| e.to_string())?;
                    let _: () = conn
                        .set_ex(storage_key, payload, ttl_secs)
                        .await
                        .map_err(|e| e.to_string())?;
                    Ok(())
                }
            })
            .await;
        match result {
            Ok(()) => {
                self.record_success().await;
                Ok(())
            }
            Err(e) => Err(self.record_failure(&self.metrics.write_fallbacks, e).await),
        }
    }

    fn metrics(&self) -> Option<DurableCacheMetricsSnapshot> {
        Some(self.metrics_snapshot())
    }
}
