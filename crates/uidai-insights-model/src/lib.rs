// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

mod aggregate;
mod dataset;
mod key;

pub const CRATE_NAME: &str = "uidai-insights-model";

pub use aggregate::{AggregateResult, StateBreakdown, UNKNOWN_LABEL};
pub use dataset::{
    dataset_spec, parse_dataset_kind, AgeBucket, DatasetKind, DatasetSpec, ValidationError,
    YearScope, DATASET_SPECS, DATE_COLUMN, DISTRICT_COLUMN, PINCODE_COLUMN, STATE_COLUMN,
};
pub use key::{CacheKey, AGGREGATE_SCHEMA_VERSION};
