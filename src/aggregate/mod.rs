//! Per-server pre-aggregation and the wire format it is serialized to.
//!
//! One group's running state is a small vector of per-select accumulators
//! keyed by the select list's alias. `Avg` never accumulates an average
//! directly — averaging averages across servers is wrong — it carries its
//! running sum and sample count on the wire and is only divided down to a
//! number at render time, after the client has summed every server's
//! contribution (see [`crate::client::render`]).

pub mod engine;
pub mod merge;

use crate::query::{SelectOp, SelectSpec};
use indexmap::IndexMap;

/// Delimiter between a group's sections (`samples≔n`, each select's value).
pub const SECTION_DELIM: char = '∥';
/// Delimiter between a key and its value within one section.
pub const KV_DELIM: char = '≔';
/// Delimiter joining multiple `GROUP BY` field values into one group key.
pub const GROUP_KEY_DELIM: char = ',';

/// One select entry's running accumulator for one group.
#[derive(Debug, Clone, PartialEq)]
pub enum Acc {
    Count(u64),
    Sum(f64),
    Min(f64),
    Max(f64),
    /// Running sum and count backing an `avg`; never collapsed to a ratio
    /// until render time.
    Avg { sum: f64, count: u64 },
    Last(String),
}

impl Acc {
    fn new(op: SelectOp) -> Acc {
        match op {
            SelectOp::Count => Acc::Count(0),
            SelectOp::Sum => Acc::Sum(0.0),
            SelectOp::Min => Acc::Min(f64::INFINITY),
            SelectOp::Max => Acc::Max(f64::NEG_INFINITY),
            SelectOp::Avg => Acc::Avg { sum: 0.0, count: 0 },
            SelectOp::Last => Acc::Last(String::new()),
        }
    }

    /// Fold `raw` into this accumulator. Returns whether it actually
    /// contributed a value, as opposed to finding nothing usable (an absent
    /// or unparseable field) and leaving its state untouched.
    fn update(&mut self, raw: Option<&str>) -> bool {
        match self {
            Acc::Count(n) => {
                *n += 1;
                true
            }
            Acc::Sum(total) => match raw.and_then(|s| s.parse::<f64>().ok()) {
                Some(v) => {
                    *total += v;
                    true
                }
                None => false,
            },
            Acc::Min(min) => match raw.and_then(|s| s.parse::<f64>().ok()) {
                Some(v) => {
                    if v < *min {
                        *min = v;
                    }
                    true
                }
                None => false,
            },
            Acc::Max(max) => match raw.and_then(|s| s.parse::<f64>().ok()) {
                Some(v) => {
                    if v > *max {
                        *max = v;
                    }
                    true
                }
                None => false,
            },
            Acc::Avg { sum, count } => match raw.and_then(|s| s.parse::<f64>().ok()) {
                Some(v) => {
                    *sum += v;
                    *count += 1;
                    true
                }
                None => false,
            },
            Acc::Last(last) => match raw {
                Some(v) => {
                    *last = v.to_string();
                    true
                }
                None => false,
            },
        }
    }

    /// Render this accumulator's wire key/value pair(s) under `alias`.
    fn wire_pairs(&self, alias: &str) -> Vec<(String, String)> {
        match self {
            Acc::Count(n) => vec![(alias.to_string(), n.to_string())],
            Acc::Sum(v) => vec![(alias.to_string(), v.to_string())],
            Acc::Min(v) => vec![(alias.to_string(), v.to_string())],
            Acc::Max(v) => vec![(alias.to_string(), v.to_string())],
            Acc::Avg { sum, count } => vec![
                (format!("{}_sum", alias), sum.to_string()),
                (format!("{}_count", alias), count.to_string()),
            ],
            Acc::Last(v) => vec![(alias.to_string(), v.clone())],
        }
    }
}

/// Running state for one `GROUP BY` key.
#[derive(Debug, Clone)]
pub struct GroupAccumulator {
    pub samples: u64,
    values: IndexMap<String, Acc>,
}

impl GroupAccumulator {
    fn new(select: &[SelectSpec]) -> GroupAccumulator {
        let mut values = IndexMap::new();
        for spec in select {
            values.insert(spec.alias.clone(), Acc::new(spec.op));
        }
        GroupAccumulator { samples: 0, values }
    }

    fn apply(&mut self, select: &[SelectSpec], fields: &IndexMap<String, String>) {
        let mut aggregated_any = false;
        for spec in select {
            let raw = spec.field.as_ref().and_then(|f| fields.get(f)).map(String::as_str);
            if let Some(acc) = self.values.get_mut(&spec.alias) {
                if acc.update(raw) {
                    aggregated_any = true;
                }
            }
        }
        if aggregated_any {
            self.samples += 1;
        }
    }

    /// Serialize this group's current snapshot to the wire form
    /// `<group_key>∥samples≔<n>∥<alias>≔<value>…`.
    pub fn serialize(&self, group_key: &str) -> String {
        let mut sections = vec![group_key.to_string(), format!("samples{}{}", KV_DELIM, self.samples)];
        for (alias, acc) in &self.values {
            for (key, value) in acc.wire_pairs(alias) {
                sections.push(format!("{}{}{}", key, KV_DELIM, value));
            }
        }
        sections.join(&SECTION_DELIM.to_string())
    }
}

/// Join `GROUP BY` field values into one wire group key.
pub fn group_key(group_by: &[String], fields: &IndexMap<String, String>) -> String {
    group_by
        .iter()
        .map(|f| fields.get(f).map(String::as_str).unwrap_or(""))
        .collect::<Vec<_>>()
        .join(&GROUP_KEY_DELIM.to_string())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::query::SelectSpec;

    fn select(op: SelectOp, field: Option<&str>) -> SelectSpec {
        let field = field.map(String::from);
        let alias = match &field {
            Some(f) => format!("{}_{}", op.as_str(), f),
            None => op.as_str().to_string(),
        };
        SelectSpec { op, field, alias }
    }

    #[test]
    fn count_tracks_every_line_regardless_of_field() {
        let specs = vec![select(SelectOp::Count, None)];
        let mut group = GroupAccumulator::new(&specs);
        let fields = IndexMap::new();
        group.apply(&specs, &fields);
        group.apply(&specs, &fields);
        assert_eq!(group.samples, 2);
        assert!(matches!(group.values["count"], Acc::Count(2)));
    }

    #[test]
    fn samples_only_bumps_when_a_field_actually_aggregated() {
        let specs = vec![select(SelectOp::Sum, Some("latency"))];
        let mut group = GroupAccumulator::new(&specs);
        let mut present = IndexMap::new();
        present.insert("latency".to_string(), "10".to_string());
        group.apply(&specs, &present);
        group.apply(&specs, &IndexMap::new());
        assert_eq!(group.samples, 1);
    }

    #[test]
    fn sum_ignores_unparseable_values() {
        let specs = vec![select(SelectOp::Sum, Some("latency"))];
        let mut group = GroupAccumulator::new(&specs);
        let mut f1 = IndexMap::new();
        f1.insert("latency".to_string(), "10".to_string());
        let mut f2 = IndexMap::new();
        f2.insert("latency".to_string(), "not a number".to_string());
        group.apply(&specs, &f1);
        group.apply(&specs, &f2);
        assert!(matches!(group.values["sum_latency"], Acc::Sum(v) if v == 10.0));
    }

    #[test]
    fn avg_keeps_sum_and_count_separate() {
        let specs = vec![select(SelectOp::Avg, Some("latency"))];
        let mut group = GroupAccumulator::new(&specs);
        for v in ["10", "20", "30"] {
            let mut f = IndexMap::new();
            f.insert("latency".to_string(), v.to_string());
            group.apply(&specs, &f);
        }
        assert!(matches!(group.values["avg_latency"], Acc::Avg { sum, count } if sum == 60.0 && count == 3));
    }

    #[test]
    fn serialize_includes_group_key_and_samples() {
        let specs = vec![select(SelectOp::Count, None)];
        let mut group = GroupAccumulator::new(&specs);
        group.apply(&specs, &IndexMap::new());
        let line = group.serialize("hostA");
        assert!(line.starts_with("hostA∥samples≔1∥count≔1"));
    }

    #[test]
    fn group_key_joins_group_by_fields_with_comma() {
        let mut fields = IndexMap::new();
        fields.insert("host".to_string(), "a".to_string());
        fields.insert("status".to_string(), "500".to_string());
        let key = group_key(&["host".to_string(), "status".to_string()], &fields);
        assert_eq!(key, "a,500");
    }
}
