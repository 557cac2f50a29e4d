// SPDX-License-Identifier: Apache-2.0

use crate::cache::durable::RedisPolicy;
use std::path::PathBuf;
use std::time::Duration;
use uidai_insights_ingest::{TablePaths, DEFAULT_CHUNK_ROWS};
use uidai_insights_model::{DatasetKind, YearScope};

pub const DEFAULT_REMOTE_BASE_URL: &str =
    "https://github.com/sreecharan-desu/uidai-data-sync/releases/download/dataset-latest";
pub const DEFAULT_LOCAL_ROOT: &str = "public/datasets";
pub const DEFAULT_PREWARM_YEAR: u16 = 2025;

#[derive(Debug, Clone)]
pub struct InsightsConfig {
    /// Searched in order before falling back to the remote archive.
    pub local_roots: Vec<PathBuf>,
    pub remote_base_url: Option<String>,
    pub temp_root: PathBuf,
    pub temp_max_age: Duration,
    pub download_timeout: Duration,
    pub chunk_rows: usize,
    pub cache_ttl: Duration,
    pub redis_url: Option<String>,
    pub redis_prefix: String,
    pub redis_timeout: Duration,
    pub redis_retry_attempts: usize,
    pub redis_breaker_failure_threshold: u32,
    pub redis_breaker_open: Duration,
    pub redis_max_value_bytes: usize,
    pub tables: TablePaths,
    pub prewarm_datasets: Vec<DatasetKind>,
    pub prewarm_scope: YearScope,
}

impl Default for InsightsConfig {
    fn default() -> Self {
        let redis = RedisPolicy::default();
        Self {
            local_roots: vec![PathBuf::from(DEFAULT_LOCAL_ROOT)],
            remote_base_url: Some(DEFAULT_REMOTE_BASE_URL.to_string()),
            temp_root: std::env::temp_dir().join("uidai-insights"),
            temp_max_age: Duration::from_secs(600),
            download_timeout: Duration::from_secs(60),
            chunk_rows: DEFAULT_CHUNK_ROWS,
            cache_ttl: Duration::from_secs(24 * 60 * 60),
            redis_url: None,
            redis_prefix: String::new(),
            redis_timeout: redis.timeout,
            redis_retry_attempts: redis.retry_attempts,
            redis_breaker_failure_threshold: redis.breaker_failure_threshold,
            redis_breaker_open: redis.breaker_open_duration,
            redis_max_value_bytes: redis.max_value_bytes,
            tables: TablePaths::default(),
            prewarm_datasets: DatasetKind::ALL.to_vec(),
            prewarm_scope: YearScope::Year(DEFAULT_PREWARM_YEAR),
        }
    }
}

impl InsightsConfig {
    #[must_use]
    pub fn redis_policy(&self) -> RedisPolicy {
        RedisPolicy {
            timeout: self.redis_timeout,
            retry_attempts: self.redis_retry_attempts,
            breaker_failure_threshold: self.redis_breaker_failure_threshold,
            breaker_open_duration: self.redis_breaker_open,
            max_value_bytes: self.redis_max_value_bytes,
            ..RedisPolicy::default()
        }
    }
}

pub fn validate_startup_config_contract(cfg: &InsightsConfig) -> Result<(), String> {
    if cfg.chunk_rows == 0 {
        return Err("chunk rows must be > 0".to_string());
    }
    if cfg.download_timeout.is_zero() || cfg.redis_timeout.is_zero() {
        return Err("timeouts must be > 0".to_string());
    }
    if cfg.cache_ttl.as_secs() == 0 {
        return Err("cache ttl must be at least one second".to_string());
    }
    let no_remote = cfg
        .remote_base_url
        .as_deref()
        .is_none_or(|u| u.trim().is_empty());
    if cfg.local_roots.is_empty() && no_remote {
        return Err("at least one local root or a remote base url is required".to_string());
    }
    if cfg.redis_url.as_deref().is_some_and(|u| u.trim().is_empty()) {
        return Err("redis url must not be empty when set".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_startup_validation() {
        let cfg = InsightsConfig::default();
        validate_startup_config_contract(&cfg).expect("defaults valid");
        assert_eq!(cfg.chunk_rows, 50_000);
        assert_eq!(cfg.cache_ttl, Duration::from_secs(86_400));
        assert_eq!(cfg.temp_max_age, Duration::from_secs(600));
        assert_eq!(cfg.prewarm_scope, YearScope::Year(2025));
    }

    #[test]
    fn startup_validation_rejects_zero_chunk_size() {
        let cfg = InsightsConfig {
            chunk_rows: 0,
            ..InsightsConfig::default()
        };
        let err = validate_startup_config_contract(&cfg).expect_err("zero chunk");
        assert!(err.contains("chunk rows"));
    }

    #[test]
    fn startup_validation_requires_some_source() {
        let cfg = InsightsConfig {
            local_roots: Vec::new(),
            remote_base_url: Some("  ".to_string()),
            ..InsightsConfig::default()
        };
        assert!(validate_startup_config_contract(&cfg).is_err());

        let remote_only = InsightsConfig {
            local_roots: Vec::new(),
            ..InsightsConfig::default()
        };
        assert!(validate_startup_config_contract(&remote_only).is_ok());
    }

    #[test]
    fn startup_validation_rejects_zero_ttl_and_timeouts() {
        let ttl = InsightsConfig {
            cache_ttl: Duration::from_millis(500),
            ..InsightsConfig::default()
        };
        assert!(validate_startup_config_contract(&ttl).is_err());
        let timeout = InsightsConfig {
            download_timeout: Duration::ZERO,
            ..InsightsConfig::default()
        };
        assert!(validate_startup_config_contract(&timeout).is_err());
    }

    #[test]
    fn redis_policy_carries_configured_limits() {
        let cfg = InsightsConfig {
            redis_timeout: Duration::from_millis(75),
            redis_retry_attempts: 4,
            ..InsightsConfig::default()
        };
        let policy = cfg.redis_policy();
        assert_eq!(policy.timeout, Duration::from_millis(75));
        assert_eq!(policy.retry_attempts, 4);
        assert_eq!(policy.max_key_bytes, RedisPolicy::default().max_key_bytes);
    }
}
