// SPDX-License-Identifier: Apache-2.0

use super::durable::{DurableCache, DurableCacheMetricsSnapshot};
use super::CacheError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

/// In-memory durable tier for tests and local runs without Redis. Counts
/// calls and can be told to fail reads or writes.
#[derive(Default)]
pub struct FakeDurableCache {
    pub entries: Mutex<HashMap<String, Vec<u8>>>,
    pub ttls: Mutex<HashMap<String, Duration>>,
    pub get_calls: AtomicU64,
    pub set_calls: AtomicU64,
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub fail_reads: bool,
    pub fail_writes: bool,
}

impl FakeDurableCache {
    #[must_use]
    pub fn failing_writes() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing_reads() -> Self {
        Self {
            fail_reads: true,
            ..Self::default()
        }
    }

    pub async fn seed(&self, key: &str, value: Vec<u8>) {
        self.entries.lock().await.insert(key.to_string(), value);
    }

    pub async fn stored(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.lock().await.get(key).cloned()
    }

    pub async fn ttl_of(&self, key: &str) -> Option<Duration> {
        self.ttls.lock().await.get(key).copied()
    }

    pub fn get_count(&self) -> u64 {
        self.get_calls.load(Ordering::Relaxed)
    }

    pub fn set_count(&self) -> u64 {
        self.set_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl DurableCache for FakeDurableCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.get_calls.fetch_add(1, Ordering::Relaxed);
        if self.fail_reads {
            return Err(CacheError("fake durable read failure".to_string()));
        }
        let found = self.entries.lock().await.get(key).cloned();
        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(found)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        self.set_calls.fetch_add(1, Ordering::Relaxed);
        if self.fail_writes {
            return Err(CacheError("fake durable write rejected: value too large".to_string()));
        }
        self.entries
            .lock()
            .await
            .insert(key.to_string(), value.to_vec());
        self.ttls.lock().await.insert(key.to_string(), ttl);
        Ok(())
    }

    fn metrics(&self) -> Option<DurableCacheMetricsSnapshot> {
        Some(DurableCacheMetricsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            ..DurableCacheMetricsSnapshot::default()
        })
    }
}
