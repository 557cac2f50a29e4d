// SPDX-License-Identifier: Apache-2.0

use crate::tables::NormalizationTables;
use uidai_insights_model::UNKNOWN_LABEL;

/// Lower-cases, replaces everything outside `[a-z0-9 ]` with a space and
/// collapses whitespace. Empty input yields an empty string.
#[must_use]
pub fn normalize_state_text(raw: &str) -> String {
    let replaced: String = raw
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() {
                c
            } else {
                ' '
            }
        })
        .collect();
    collapse_whitespace(&replaced)
}

/// Drops asterisks and any character that is not alphanumeric, whitespace,
/// or one of `( ) - .`, then collapses whitespace. Returns `"Unknown"` when
/// nothing is left.
#[must_use]
pub fn normalize_district_text(raw: &str) -> String {
    let kept: String = raw
        .chars()
        .filter(|c| *c != '*')
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || matches!(c, '(' | ')' | '-' | '.'))
        .collect();
    let collapsed = collapse_whitespace(&kept);
    if collapsed.is_empty() {
        UNKNOWN_LABEL.to_string()
    } else {
        collapsed
    }
}

/// Digits before the first decimal point; pincodes sometimes arrive as
/// floats such as `500001.0`.
#[must_use]
pub fn pincode_prefix(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed.split('.').next().unwrap_or(trimmed)
}

/// Canonical state for a record: exact match of the cleaned text, then the
/// pincode fallback. `None` means the record must be excluded.
#[must_use]
pub fn resolve_state<'t>(
    tables: &'t NormalizationTables,
    raw_state: &str,
    raw_pincode: &str,
) -> Option<&'t str> {
    let cleaned = normalize_state_text(raw_state);
    if let Some(state) = tables.canonical_state(&cleaned) {
        if tables.is_valid_state(state) {
            return Some(state);
        }
    }
    let pincode = pincode_prefix(raw_pincode);
    if pincode.is_empty() {
        return None;
    }
    tables
        .state_for_pincode(pincode)
        .filter(|state| tables.is_valid_state(state))
}

/// Canonical district label. Never fails; unusable input maps to `"Unknown"`.
#[must_use]
pub fn resolve_district(tables: &NormalizationTables, raw: &str) -> String {
    let cleaned = normalize_district_text(raw);
    if cleaned == UNKNOWN_LABEL {
        return cleaned;
    }
    match tables.district_alias(&cleaned.to_lowercase()) {
        Some(canonical) => title_case(canonical),
        None => title_case(&cleaned),
    }
}

/// Two-digit month of a `YYYY-MM-DD` or `DD-MM-YYYY` date (`-` or `/`
/// separated). Anything that is not one of those layouts with a month in
/// `1..=12` yields `None`.
#[must_use]
pub fn extract_month(raw: &str) -> Option<String> {
    let date = raw.split_whitespace().next()?;
    let parts: Vec<&str> = date.split(['-', '/']).collect();
    if parts.len() != 3 {
        return None;
    }
    if !parts
        .iter()
        .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
    {
        return None;
    }
    let (year, day) = if parts[0].len() == 4 {
        (parts[0], parts[2])
    } else if parts[2].len() == 4 {
        (parts[2], parts[0])
    } else {
        return None;
    };
    if year.len() != 4 || day.len() > 2 || parts[1].len() > 2 {
        return None;
    }
    let month: u8 = parts[1].parse().ok()?;
    if !(1..=12).contains(&month) {
        return None;
    }
    Some(format!("{month:02}"))
}

// Floats at or beyond 2^63 in magnitude do not fit an i64.
const COUNT_FLOAT_LIMIT: f64 = 9_223_372_036_854_775_808.0;

/// Numeric cell value; anything unparsable or outside the `i64` range
/// counts as zero.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn parse_count(raw: &str) -> i64 {
    let s = raw.trim();
    if s.is_empty() {
        return 0;
    }
    if let Ok(v) = s.parse::<i64>() {
        return v;
    }
    match s.parse::<f64>() {
        Ok(v) if v.is_finite() && v.abs() < COUNT_FLOAT_LIMIT => v.trunc() as i64,
        _ => 0,
    }
}

/// Upper-cases the first letter of every word and lower-cases the rest.
/// A word starts after any character that is not alphanumeric.
#[must_use]
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alnum = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_alnum {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
        } else {
            out.push(c);
        }
        prev_alnum = c.is_alphanumeric();
    }
    out
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
