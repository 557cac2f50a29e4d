// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

use std::fmt::{Display, Formatter};
use uidai_insights_model::ValidationError;

mod cache;
mod config;
mod http;
mod service;
mod source;

pub const CRATE_NAME: &str = "uidai-insights-server";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum InsightsErrorCode {
    Validation,
    Resolution,
    Processing,
    Internal,
}

impl InsightsErrorCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation_error",
            Self::Resolution => "resolution_error",
            Self::Processing => "processing_error",
            Self::Internal => "internal_error",
        }
    }
}

/// Failure surfaced to callers of the insights service. Cloned to every
/// waiter of a coalesced computation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsightsError {
    pub code: InsightsErrorCode,
    pub message: String,
}

impl InsightsError {
    #[must_use]
    pub fn new(code: InsightsErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(InsightsErrorCode::Validation, message)
    }

    #[must_use]
    pub fn resolution(message: impl Into<String>) -> Self {
        Self::new(InsightsErrorCode::Resolution, message)
    }

    #[must_use]
    pub fn processing(message: impl Into<String>) -> Self {
        Self::new(InsightsErrorCode::Processing, message)
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(InsightsErrorCode::Internal, message)
    }

    /// Resolution and processing failures are never cached; the same request
    /// may simply be issued again.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self.code,
            InsightsErrorCode::Resolution | InsightsErrorCode::Processing
        )
    }
}

impl Display for InsightsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for InsightsError {}

impl From<ValidationError> for InsightsError {
    fn from(e: ValidationError) -> Self {
        Self::validation(e.0)
    }
}

pub use cache::coalesce::Coalescer;
pub use cache::durable::{
    DurableCache, DurableCacheMetricsSnapshot, RedisDurableCache, RedisPolicy,
};
pub use cache::fake::FakeDurableCache;
pub use cache::memory::MemoryCache;
pub use cache::CacheError;
pub use config::{
    validate_startup_config_contract, InsightsConfig, DEFAULT_LOCAL_ROOT, DEFAULT_PREWARM_YEAR,
    DEFAULT_REMOTE_BASE_URL,
};
pub use http::{build_router, AppState};
pub use service::InsightsService;
pub use source::{ResolvedSource, SourceResolver, TEMP_FILE_PREFIX};
