// SPDX-License-Identifier: Apache-2.0

use crate::InsightsError;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::sync::watch;
use tokio::task::AbortHandle;

type Outcome<V> = Option<Result<V, InsightsError>>;
type Registry<K, V> = Arc<Mutex<HashMap<K, Registration<K, V>>>>;

struct Registration<K: Eq + Hash, V> {
    id: u64,
    shared: Weak<SharedComputation<K, V>>,
    outcome: watch::Receiver<Outcome<V>>,
}

/// Held by every waiter of one computation. When the last waiter lets go
/// before the result lands, the task is aborted and the key freed.
struct SharedComputation<K: Eq + Hash, V> {
    key: K,
    id: u64,
    task: AbortHandle,
    registry: Registry<K, V>,
}

impl<K: Eq + Hash, V> Drop for SharedComputation<K, V> {
    fn drop(&mut self) {
        self.task.abort();
        deregister(&self.registry, &self.key, self.id);
    }
}

fn deregister<K: Eq + Hash, V>(registry: &Registry<K, V>, key: &K, id: u64) {
    let removed = {
        let mut map = registry.lock().unwrap_or_else(PoisonError::into_inner);
        if map.get(key).is_some_and(|r| r.id == id) {
            map.remove(key)
        } else {
            None
        }
    };
    // Dropped outside the lock.
    drop(removed);
}

/// Single-flight table: at most one computation per key is in flight, and
/// every concurrent caller for that key receives a clone of its outcome.
/// Nothing is remembered once a computation settles, so a failure is
/// retried by the next caller.
pub struct Coalescer<K: Eq + Hash, V> {
    registry: Registry<K, V>,
    next_id: AtomicU64,
}

impl<K: Eq + Hash, V> Default for Coalescer<K, V> {
    fn default() -> Self {
        Self {
            registry: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }
}

impl<K, V> Coalescer<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Joins the computation in flight for `key`, or starts `compute` on a
    /// new task when there is none. `compute` is only invoked when this
    /// call becomes the leader.
    pub async fn get_or_compute<F, Fut>(&self, key: K, compute: F) -> Result<V, InsightsError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, InsightsError>> + Send + 'static,
    {
        let (shared, mut outcome) = self.join_or_start(key, compute);
        let result = match outcome.wait_for(Option::is_some).await {
            Ok(settled) => {
                let settled: Outcome<V> = (*settled).clone();
                settled.unwrap_or_else(|| {
                    Err(InsightsError::internal(
                        "coalesced computation settled without a result",
                    ))
                })
            }
            Err(_) => Err(InsightsError::internal(
                "coalesced computation ended without a result",
            )),
        };
        drop(shared);
        result
    }

    #[must_use]
    pub fn inflight_len(&self) -> usize {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn join_or_start<F, Fut>(
        &self,
        key: K,
        compute: F,
    ) -> (Arc<SharedComputation<K, V>>, watch::Receiver<Outcome<V>>)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, InsightsError>> + Send + 'static,
    {
        let mut map = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = map.get(&key) {
            if let Some(shared) = existing.shared.upgrade() {
                return (shared, existing.outcome.clone());
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = watch::channel(None);
        let registry = Arc::clone(&self.registry);
        let task_key = key.clone();
        let fut = compute();
        let task = tokio::spawn(async move {
            let result = fut.await;
            deregister(&registry, &task_key, id);
            let _ = tx.send(Some(result));
        });
        let shared = Arc::new(SharedComputation {
            key: key.clone(),
            id,
            task: task.abort_handle(),
            registry: Arc::clone(&self.registry),
        });
        let stale = map.insert(
            key,
            Registration {
                id,
                shared: Arc::downgrade(&shared),
                outcome: rx.clone(),
            },
        );
        drop(map);
        drop(stale);
        (shared, rx)
    }
}
