// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

mod engine;
mod normalize;
mod tables;

pub const CRATE_NAME: &str = "uidai-insights-ingest";

pub use engine::{
    aggregate, aggregate_file, aggregate_with_options, AggregateError, AggregateOptions,
    AggregateStats, DEFAULT_CHUNK_ROWS,
};
pub use normalize::{
    extract_month, normalize_district_text, normalize_state_text, parse_count, pincode_prefix,
    resolve_district, resolve_state, title_case,
};
pub use tables::{NormalizationTables, TablePaths, TablesError};
