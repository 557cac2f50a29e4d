use crate::dataset::{DatasetKind, YearScope};
use std::fmt::{Display, Formatter};

/// Version of the serialized aggregate layout. Bumping it orphans every
/// previously cached entry.
pub const AGGREGATE_SCHEMA_VERSION: u32 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    pub schema_version: u32,
    pub dataset: DatasetKind,
    pub scope: YearScope,
}

impl CacheKey {
    #[must_use]
    pub const fn new(dataset: DatasetKind, scope: YearScope) -> Self {
        Self {
            schema_version: AGGREGATE_SCHEMA_VERSION,
            dataset,
            scope,
        }
    }

    #[must_use]
    pub fn key_string(&self) -> String {
        format!("agg_v{}:{}:{}", self.schema_version, self.dataset, self.scope)
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key_string())
    }
}
