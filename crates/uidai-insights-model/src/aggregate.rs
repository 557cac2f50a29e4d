use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sentinel used for districts and months that could not be determined.
pub const UNKNOWN_LABEL: &str = "Unknown";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateBreakdown {
    pub by_age_group: BTreeMap<String, i64>,
    pub by_month: BTreeMap<String, i64>,
}

/// Aggregated counts for one dataset scope.
///
/// Every map is keyed by canonical labels and every contribution is additive,
/// so two results built from disjoint row sets combine with [`merge`].
///
/// [`merge`]: AggregateResult::merge
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateResult {
    pub total_updates: i64,
    pub by_state: BTreeMap<String, i64>,
    pub by_age_group: BTreeMap<String, i64>,
    pub by_month: BTreeMap<String, i64>,
    pub by_district: BTreeMap<String, BTreeMap<String, i64>>,
    pub state_breakdown: BTreeMap<String, StateBreakdown>,
}

impl AggregateResult {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one resolved record. `month` of `None` keeps the record out of the
    /// month maps only; `buckets` pairs each age label with its count.
    pub fn add_record(
        &mut self,
        state: &str,
        district: &str,
        month: Option<&str>,
        buckets: &[(&str, i64)],
    ) {
        let total = buckets
            .iter()
            .fold(0_i64, |acc, (_, v)| acc.saturating_add(*v));
        self.total_updates = self.total_updates.saturating_add(total);
        bump(&mut self.by_state, state, total);
        bump(
            self.by_district.entry(state.to_string()).or_default(),
            district,
            total,
        );

        let breakdown = self.state_breakdown.entry(state.to_string()).or_default();
        for (label, value) in buckets {
            bump(&mut self.by_age_group, label, *value);
            bump(&mut breakdown.by_age_group, label, *value);
        }
        if let Some(month) = month {
            bump(&mut self.by_month, month, total);
            bump(&mut breakdown.by_month, month, total);
        }
    }

    /// Folds `other` into `self` by addition on matching keys.
    pub fn merge(&mut self, other: Self) {
        self.total_updates = self.total_updates.saturating_add(other.total_updates);
        add_counts(&mut self.by_state, other.by_state);
        add_counts(&mut self.by_age_group, other.by_age_group);
        add_counts(&mut self.by_month, other.by_month);
        for (state, districts) in other.by_district {
            add_counts(self.by_district.entry(state).or_default(), districts);
        }
        for (state, breakdown) in other.state_breakdown {
            let target = self.state_breakdown.entry(state).or_default();
            add_counts(&mut target.by_age_group, breakdown.by_age_group);
            add_counts(&mut target.by_month, breakdown.by_month);
        }
    }

    #[must_use]
    pub fn by_state_sum(&self) -> i64 {
        self.by_state
            .values()
            .fold(0_i64, |acc, v| acc.saturating_add(*v))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_state.is_empty()
    }
}

// Counts saturate at the i64 bounds instead of wrapping.
fn bump(target: &mut BTreeMap<String, i64>, key: &str, value: i64) {
    let slot = target.entry(key.to_string()).or_insert(0);
    *slot = slot.saturating_add(value);
}

fn add_counts(target: &mut BTreeMap<String, i64>, source: BTreeMap<String, i64>) {
    for (k, v) in source {
        let slot = target.entry(k).or_insert(0);
        *slot = slot.saturating_add(v);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(state: &str, district: &str, month: Option<&str>, n: i64) -> AggregateResult {
        let mut out = AggregateResult::new();
        out.add_record(state, district, month, &[("5-17", n), ("18+", 2 * n)]);
        out
    }

    #[test]
    fn add_record_fills_every_map() {
        let r = sample("Kerala", "Ernakulam", Some("04"), 1);
        assert_eq!(r.total_updates, 3);
        assert_eq!(r.by_state["Kerala"], 3);
        assert_eq!(r.by_age_group["18+"], 2);
        assert_eq!(r.by_month["04"], 3);
        assert_eq!(r.by_district["Kerala"]["Ernakulam"], 3);
        assert_eq!(r.state_breakdown["Kerala"].by_age_group["5-17"], 1);
        assert_eq!(r.state_breakdown["Kerala"].by_month["04"], 3);
    }

    #[test]
    fn unknown_month_counts_toward_totals_but_not_month_maps() {
        let r = sample("Goa", "North Goa", None, 5);
        assert_eq!(r.total_updates, 15);
        assert!(r.by_month.is_empty());
        assert!(r.state_breakdown["Goa"].by_month.is_empty());
    }

    #[test]
    fn merge_adds_matching_keys() {
        let mut a = sample("Goa", "North Goa", Some("01"), 1);
        a.merge(sample("Goa", "North Goa", Some("01"), 2));
        a.merge(sample("Goa", "South Goa", Some("02"), 1));
        assert_eq!(a.total_updates, 12);
        assert_eq!(a.by_district["Goa"]["North Goa"], 9);
        assert_eq!(a.by_district["Goa"]["South Goa"], 3);
        assert_eq!(a.by_month["01"], 9);
        assert_eq!(a.state_breakdown["Goa"].by_month["02"], 3);
        assert_eq!(a.total_updates, a.by_state_sum());
    }

    #[test]
    fn huge_counts_saturate_instead_of_overflowing() {
        let mut a = AggregateResult::new();
        a.add_record("Goa", "x", Some("01"), &[("5-17", i64::MAX), ("18+", i64::MAX)]);
        assert_eq!(a.total_updates, i64::MAX);
        assert_eq!(a.by_month["01"], i64::MAX);
        a.merge(sample("Goa", "x", Some("01"), 1));
        assert_eq!(a.total_updates, i64::MAX);
        assert_eq!(a.by_state["Goa"], i64::MAX);
        assert_eq!(a.by_district["Goa"]["x"], i64::MAX);
        assert_eq!(a.state_breakdown["Goa"].by_age_group["18+"], i64::MAX);
    }

    #[test]
    fn serialized_shape_uses_documented_keys() {
        let r = sample("Goa", "North Goa", Some("01"), 1);
        let value = serde_json::to_value(&r).expect("serialize");
        for key in [
            "total_updates",
            "by_state",
            "by_age_group",
            "by_month",
            "by_district",
            "state_breakdown",
        ] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
        assert_eq!(value["state_breakdown"]["Goa"]["by_month"]["01"], 3);
        let back: AggregateResult = serde_json::from_value(value).expect("deserialize");
        assert_eq!(back, r);
    }
}
