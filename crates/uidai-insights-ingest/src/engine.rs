// SPDX-License-Identifier: Apache-2.0

use crate::normalize::{extract_month, parse_count, resolve_district, resolve_state};
use crate::tables::NormalizationTables;
use csv::{ReaderBuilder, StringRecord, Trim};
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::debug;
use uidai_insights_model::{
    AggregateResult, DatasetKind, DatasetSpec, DATE_COLUMN, DISTRICT_COLUMN, PINCODE_COLUMN,
    STATE_COLUMN,
};

pub const DEFAULT_CHUNK_ROWS: usize = 50_000;

#[derive(Debug)]
pub struct AggregateError(pub String);

impl Display for AggregateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for AggregateError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateOptions {
    pub chunk_rows: usize,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            chunk_rows: DEFAULT_CHUNK_ROWS,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregateStats {
    pub rows_read: u64,
    pub rows_kept: u64,
    pub rows_dropped_unresolved_state: u64,
    pub chunks: u64,
}

struct ColumnLayout {
    state: usize,
    district: usize,
    date: usize,
    pincode: usize,
    buckets: Vec<(&'static str, usize)>,
}

impl ColumnLayout {
    fn resolve(spec: &DatasetSpec, headers: &StringRecord) -> Result<Self, AggregateError> {
        let mut found = HashMap::new();
        for column in spec.required_columns() {
            let position = headers.iter().position(|h| h == column).ok_or_else(|| {
                AggregateError(format!(
                    "{} dataset is missing required column '{column}'",
                    spec.name
                ))
            })?;
            found.insert(column, position);
        }
        // Every required column was located above.
        let index = |name: &str| found.get(name).copied().unwrap_or_default();
        Ok(Self {
            state: index(STATE_COLUMN),
            district: index(DISTRICT_COLUMN),
            date: index(DATE_COLUMN),
            pincode: index(PINCODE_COLUMN),
            buckets: spec
                .buckets
                .iter()
                .map(|bucket| (bucket.label, index(bucket.column)))
                .collect(),
        })
    }
}

pub fn aggregate<R: Read>(
    kind: DatasetKind,
    source: R,
    tables: &NormalizationTables,
) -> Result<AggregateResult, AggregateError> {
    aggregate_with_options(kind, source, tables, AggregateOptions::default()).map(|(r, _)| r)
}

pub fn aggregate_file(
    kind: DatasetKind,
    path: &Path,
    tables: &NormalizationTables,
    options: AggregateOptions,
) -> Result<(AggregateResult, AggregateStats), AggregateError> {
    let file = File::open(path)
        .map_err(|e| AggregateError(format!("open {} failed: {e}", path.display())))?;
    aggregate_with_options(kind, BufReader::new(file), tables, options)
}

/// Streams `source` in chunks of `options.chunk_rows` records, folding each
/// chunk's totals into one running result. Any read or parse failure aborts
/// the whole run; no partial result is returned.
pub fn aggregate_with_options<R: Read>(
    kind: DatasetKind,
    source: R,
    tables: &NormalizationTables,
    options: AggregateOptions,
) -> Result<(AggregateResult, AggregateStats), AggregateError> {
    let spec = kind.spec();
    let chunk_rows = options.chunk_rows.max(1);
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::Headers)
        .from_reader(source);
    let headers = reader
        .headers()
        .map_err(|e| AggregateError(format!("read header failed: {e}")))?
        .clone();
    let layout = ColumnLayout::resolve(spec, &headers)?;

    let mut result = AggregateResult::new();
    let mut stats = AggregateStats::default();
    let mut buffer: Vec<StringRecord> = Vec::new();
    loop {
        let filled = fill_chunk(&mut reader, &mut buffer, chunk_rows)?;
        if filled == 0 {
            break;
        }
        let part = aggregate_chunk(&layout, &buffer[..filled], tables, &mut stats);
        result.merge(part);
        stats.chunks += 1;
        debug!(
            dataset = spec.name,
            chunk = stats.chunks,
            rows = filled,
            rows_read = stats.rows_read,
            "aggregated chunk"
        );
        if filled < chunk_rows {
            break;
        }
    }
    Ok((result, stats))
}

fn fill_chunk<R: Read>(
    reader: &mut csv::Reader<R>,
    buffer: &mut Vec<StringRecord>,
    chunk_rows: usize,
) -> Result<usize, AggregateError> {
    for filled in 0..chunk_rows {
        if filled == buffer.len() {
            buffer.push(StringRecord::new());
        }
        let more = reader
            .read_record(&mut buffer[filled])
            .map_err(|e| AggregateError(format!("read record failed: {e}")))?;
        if !more {
            return Ok(filled);
        }
    }
    Ok(chunk_rows)
}

fn aggregate_chunk(
    layout: &ColumnLayout,
    rows: &[StringRecord],
    tables: &NormalizationTables,
    stats: &mut AggregateStats,
) -> AggregateResult {
    let mut part = AggregateResult::new();
    let mut counts: Vec<(&str, i64)> = Vec::with_capacity(layout.buckets.len());
    for row in rows {
        stats.rows_read += 1;
        let field = |idx: usize| row.get(idx).unwrap_or("");
        let Some(state) = resolve_state(tables, field(layout.state), field(layout.pincode)) else {
            stats.rows_dropped_unresolved_state += 1;
            continue;
        };
        let district = resolve_district(tables, field(layout.district));
        let month = extract_month(field(layout.date));
        counts.clear();
        counts.extend(
            layout
                .buckets
                .iter()
                .map(|(label, idx)| (*label, parse_count(field(*idx)))),
        );
        part.add_record(state, &district, month.as_deref(), &counts);
        stats.rows_kept += 1;
    }
    part
}
