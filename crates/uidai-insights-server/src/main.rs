// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uidai_insights_ingest::{NormalizationTables, TablePaths};
use uidai_insights_model::{parse_dataset_kind, DatasetKind, YearScope};
use uidai_insights_server::{
    build_router, validate_startup_config_contract, AppState, DurableCache, InsightsConfig,
    InsightsService, RedisDurableCache,
};

const PINCODE_MAP_CANDIDATES: [&str; 2] =
    ["src/config/pincodeMap.json", "app/config/pincodeMap.json"];

fn env_bool(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .and_then(|v| match v.as_str() {
            "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
            "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default)
}

fn env_duration_ms(name: &str, default: Duration) -> Duration {
    let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
    Duration::from_millis(env_u64(name, default_ms))
}

fn env_nonempty(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_path_list(name: &str, default: &[PathBuf]) -> Vec<PathBuf> {
    match env::var(name) {
        Ok(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .collect(),
        Err(_) => default.to_vec(),
    }
}

fn env_dataset_list(name: &str, default: &[DatasetKind]) -> Result<Vec<DatasetKind>, String> {
    let Ok(raw) = env::var(name) else {
        return Ok(default.to_vec());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| parse_dataset_kind(s).map_err(|e| format!("{name}: {e}")))
        .collect()
}

fn pincode_map_path() -> Option<PathBuf> {
    if let Some(explicit) = env_nonempty("INSIGHTS_PINCODE_MAP") {
        return Some(PathBuf::from(explicit));
    }
    PINCODE_MAP_CANDIDATES
        .iter()
        .map(PathBuf::from)
        .find(|p| p.is_file())
}

fn config_from_env() -> Result<InsightsConfig, String> {
    let defaults = InsightsConfig::default();
    let prewarm_scope = match env::var("INSIGHTS_PREWARM_YEAR") {
        Ok(raw) => YearScope::parse(&raw).map_err(|e| format!("INSIGHTS_PREWARM_YEAR: {e}"))?,
        Err(_) => defaults.prewarm_scope,
    };
    Ok(InsightsConfig {
        local_roots: env_path_list("INSIGHTS_LOCAL_ROOTS", &defaults.local_roots),
        remote_base_url: match env::var("INSIGHTS_REMOTE_BASE_URL") {
            Ok(raw) => Some(raw.trim().to_string()).filter(|u| !u.is_empty()),
            Err(_) => defaults.remote_base_url.clone(),
        },
        temp_root: env_nonempty("INSIGHTS_TEMP_ROOT")
            .map_or_else(|| defaults.temp_root.clone(), PathBuf::from),
        temp_max_age: Duration::from_secs(env_u64(
            "INSIGHTS_TEMP_MAX_AGE_SECS",
            defaults.temp_max_age.as_secs(),
        )),
        download_timeout: env_duration_ms("INSIGHTS_DOWNLOAD_TIMEOUT_MS", defaults.download_timeout),
        chunk_rows: env_usize("INSIGHTS_CHUNK_ROWS", defaults.chunk_rows),
        cache_ttl: Duration::from_secs(env_u64(
            "INSIGHTS_CACHE_TTL_SECS",
            defaults.cache_ttl.as_secs(),
        )),
        redis_url: env_nonempty("INSIGHTS_REDIS_URL"),
        redis_prefix: env::var("INSIGHTS_REDIS_PREFIX")
            .map(|p| p.trim().to_string())
            .unwrap_or_default(),
        redis_timeout: env_duration_ms("INSIGHTS_REDIS_TIMEOUT_MS", defaults.redis_timeout),
        redis_retry_attempts: env_usize(
            "INSIGHTS_REDIS_RETRY_ATTEMPTS",
            defaults.redis_retry_attempts,
        ),
        tables: TablePaths {
            pincode_map: pincode_map_path(),
            district_aliases: env_nonempty("INSIGHTS_DISTRICT_ALIASES").map(PathBuf::from),
        },
        prewarm_datasets: env_dataset_list("INSIGHTS_PREWARM", &defaults.prewarm_datasets)?,
        prewarm_scope,
        ..defaults
    })
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let (Ok(mut sigterm), Ok(mut sigint)) = (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) else {
            warn!("signal handlers unavailable, falling back to ctrl-c");
            let _ = tokio::signal::ctrl_c().await;
            return;
        };
        tokio::select! {
            _ = sigterm.recv() => {}
            _ = sigint.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if env_bool("INSIGHTS_LOG_JSON", true) {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), String> {
    init_tracing();

    let bind_addr = env::var("INSIGHTS_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let cfg = config_from_env()?;
    validate_startup_config_contract(&cfg)?;

    let tables = NormalizationTables::load(&cfg.tables);
    let durable: Option<Arc<dyn DurableCache>> = match cfg.redis_url.as_deref() {
        Some(url) => match RedisDurableCache::new(url, &cfg.redis_prefix, cfg.redis_policy()) {
            Ok(redis) => Some(Arc::new(redis)),
            Err(e) => {
                warn!(error = %e, "redis client unavailable, durable cache disabled");
                None
            }
        },
        None => {
            info!("no redis url configured, durable cache disabled");
            None
        }
    };
    let service = InsightsService::new(&cfg, tables, durable).map_err(|e| e.to_string())?;

    if !cfg.prewarm_datasets.is_empty() {
        let prewarm = Arc::clone(&service);
        tokio::spawn(async move {
            let warmed = prewarm.prewarm().await;
            info!(warmed, "cache prewarm finished");
        });
    }

    let app = build_router(AppState::new(service));
    let listener = TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| format!("bind {bind_addr} failed: {e}"))?;
    info!("uidai-insights-server listening on {bind_addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown_signal())
        .await
        .map_err(|e| format!("server failed: {e}"))
}
