// SPDX-License-Identifier: Apache-2.0

use crate::cache::coalesce::Coalescer;
use crate::cache::durable::{DurableCache, DurableCacheMetricsSnapshot};
use crate::cache::memory::MemoryCache;
use crate::config::InsightsConfig;
use crate::source::SourceResolver;
use crate::InsightsError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uidai_insights_ingest::{aggregate_file, AggregateOptions, NormalizationTables};
use uidai_insights_model::{
    parse_dataset_kind, AggregateResult, CacheKey, DatasetKind, YearScope,
};

/// Entry point for every insights request. Looks results up in memory, then
/// in the durable tier, and only then resolves and aggregates the source
/// file. Concurrent misses for one key share a single computation.
pub struct InsightsService {
    tables: Arc<NormalizationTables>,
    resolver: SourceResolver,
    memory: MemoryCache,
    durable: Option<Arc<dyn DurableCache>>,
    coalescer: Coalescer<CacheKey, Arc<AggregateResult>>,
    options: AggregateOptions,
    cache_ttl: Duration,
    prewarm_datasets: Vec<DatasetKind>,
    prewarm_scope: YearScope,
    engine_runs: AtomicU64,
}

impl InsightsService {
    pub fn new(
        cfg: &InsightsConfig,
        tables: NormalizationTables,
        durable: Option<Arc<dyn DurableCache>>,
    ) -> Result<Arc<Self>, InsightsError> {
        Ok(Arc::new(Self {
            tables: Arc::new(tables),
            resolver: SourceResolver::new(cfg)?,
            memory: MemoryCache::new(),
            durable,
            coalescer: Coalescer::new(),
            options: AggregateOptions {
                chunk_rows: cfg.chunk_rows,
            },
            cache_ttl: cfg.cache_ttl,
            prewarm_datasets: cfg.prewarm_datasets.clone(),
            prewarm_scope: cfg.prewarm_scope,
            engine_runs: AtomicU64::new(0),
        }))
    }

    /// Parses raw request parameters and returns the aggregate for them.
    pub async fn aggregate_insights(
        self: &Arc<Self>,
        dataset: &str,
        year: &str,
    ) -> Result<Arc<AggregateResult>, InsightsError> {
        let kind = parse_dataset_kind(dataset)?;
        let scope = YearScope::parse(year)?;
        self.insights_for(kind, scope).await
    }

    pub async fn insights_for(
        self: &Arc<Self>,
        kind: DatasetKind,
        scope: YearScope,
    ) -> Result<Arc<AggregateResult>, InsightsError> {
        let key = CacheKey::new(kind, scope);
        if let Some(hit) = self.memory.get(&key).await {
            debug!(key = %key, "memory cache hit");
            return Ok(hit);
        }
        let this = Arc::clone(self);
        self.coalescer
            .get_or_compute(key, move || async move { this.fill(key).await })
            .await
    }

    /// Computes every configured prewarm dataset concurrently. Failures are
    /// logged and never propagate. Returns how many entries were warmed.
    pub async fn prewarm(self: &Arc<Self>) -> usize {
        let mut tasks = JoinSet::new();
        for kind in self.prewarm_datasets.iter().copied() {
            let this = Arc::clone(self);
            let scope = self.prewarm_scope;
            tasks.spawn(async move { (kind, this.insights_for(kind, scope).await) });
        }
        let mut warmed = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((kind, Ok(_))) => {
                    warmed += 1;
                    info!(dataset = %kind, scope = %self.prewarm_scope, "cache prewarmed");
                }
                Ok((kind, Err(e))) => {
                    warn!(dataset = %kind, scope = %self.prewarm_scope, error = %e, "cache prewarm failed");
                }
                Err(e) => warn!(error = %e, "cache prewarm task failed"),
            }
        }
        warmed
    }

    /// Number of times the aggregation engine has been started.
    #[must_use]
    pub fn engine_runs(&self) -> u64 {
        self.engine_runs.load(Ordering::Relaxed)
    }

    pub async fn memory_entries(&self) -> usize {
        self.memory.len().await
    }

    #[must_use]
    pub fn inflight(&self) -> usize {
        self.coalescer.inflight_len()
    }

    /// Durable tier counters, or `None` without a durable tier.
    #[must_use]
    pub fn durable_metrics(&self) -> Option<DurableCacheMetricsSnapshot> {
        self.durable.as_ref().and_then(|durable| durable.metrics())
    }

    async fn fill(&self, key: CacheKey) -> Result<Arc<AggregateResult>, InsightsError> {
        if let Some(hit) = self.memory.get(&key).await {
            return Ok(hit);
        }
        let key_string = key.key_string();
        if let Some(hit) = self.read_durable(&key_string).await {
            let hit = Arc::new(hit);
            self.memory.insert(key, Arc::clone(&hit)).await;
            return Ok(hit);
        }
        let computed = Arc::new(self.compute(key).await?);
        self.write_durable(&key_string, &computed).await;
        self.memory.insert(key, Arc::clone(&computed)).await;
        Ok(computed)
    }

    async fn read_durable(&self, key: &str) -> Option<AggregateResult> {
        let durable = self.durable.as_ref()?;
        match durable.get(key).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<AggregateResult>(&bytes) {
                Ok(value) => {
                    info!(key, "durable cache hit");
                    Some(value)
                }
                Err(e) => {
                    warn!(key, error = %e, "durable cache entry unreadable, recomputing");
                    None
                }
            },
            Ok(None) => {
                debug!(key, "durable cache miss");
                None
            }
            Err(e) => {
                warn!(key, error = %e, "durable cache read failed, treating as miss");
                None
            }
        }
    }

    async fn write_durable(&self, key: &str, value: &AggregateResult) {
        let Some(durable) = self.durable.as_ref() else {
            return;
        };
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key, error = %e, "aggregate serialization failed, skipping durable write");
                return;
            }
        };
        if let Err(e) = durable.set(key, &bytes, self.cache_ttl).await {
            warn!(key, bytes = bytes.len(), error = %e, "durable cache write failed, result kept in memory only");
        }
    }

    async fn compute(&self, key: CacheKey) -> Result<AggregateResult, InsightsError> {
        let source = self.resolver.resolve(key.dataset, key.scope).await?;
        self.engine_runs.fetch_add(1, Ordering::Relaxed);
        let tables = Arc::clone(&self.tables);
        let options = self.options;
        let kind = key.dataset;
        let started = Instant::now();
        let outcome = tokio::task::spawn_blocking(move || {
            let outcome = aggregate_file(kind, source.path(), &tables, options);
            source.release();
            outcome
        })
        .await
        .map_err(|e| InsightsError::internal(format!("aggregation task failed: {e}")))?;
        let (result, stats) = outcome.map_err(|e| InsightsError::processing(e.0))?;
        info!(
            key = %key,
            rows_read = stats.rows_read,
            rows_kept = stats.rows_kept,
            rows_dropped_unresolved_state = stats.rows_dropped_unresolved_state,
            chunks = stats.chunks,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "aggregation complete"
        );
        Ok(result)
    }
}
