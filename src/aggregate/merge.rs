//! Client-side merge of per-server aggregate snapshots into one cross-fleet
//! view. `Sum`/`Count` add, `Min`/`Max` take the extreme, `Last` keeps
//! whichever value arrived most recently, and `Avg` is never merged as a
//! ratio — its underlying sum and count are added separately and only
//! divided at render time.

use crate::aggregate::{GROUP_KEY_DELIM, KV_DELIM, SECTION_DELIM};
use crate::query::{SelectOp, SelectSpec};
use indexmap::IndexMap;

/// Parse one server's serialized snapshot line into its group key, sample
/// count and the rest of its key/value pairs.
pub fn parse_line(line: &str) -> Option<(String, u64, IndexMap<String, String>)> {
    let mut sections = line.split(SECTION_DELIM);
    let group_key = sections.next()?.to_string();
    let mut samples = 0u64;
    let mut kvs = IndexMap::new();
    for section in sections {
        let mut kv = section.splitn(2, KV_DELIM);
        let key = kv.next()?;
        let value = kv.next()?;
        if key == "samples" {
            samples = value.parse().ok()?;
        } else {
            kvs.insert(key.to_string(), value.to_string());
        }
    }
    Some((group_key, samples, kvs))
}

#[derive(Default, Clone)]
struct GroupMerge {
    samples: u64,
    numeric: IndexMap<String, f64>,
    last: IndexMap<String, String>,
}

/// Accumulates one query's merged state across every server that reported
/// in.
pub struct Merger {
    select: Vec<SelectSpec>,
    groups: IndexMap<String, GroupMerge>,
}

impl Merger {
    pub fn new(select: Vec<SelectSpec>) -> Merger {
        Merger {
            select,
            groups: IndexMap::new(),
        }
    }

    /// Fold one server's serialized snapshot line into the running merge.
    pub fn ingest(&mut self, line: &str) {
        let (group_key, samples, kvs) = match parse_line(line) {
            Some(parsed) => parsed,
            None => return,
        };
        let entry = self.groups.entry(group_key).or_default();
        entry.samples += samples;
        for spec in &self.select {
            match spec.op {
                SelectOp::Count | SelectOp::Sum => merge_add(&mut entry.numeric, &spec.alias, &kvs),
                SelectOp::Min => merge_extreme(&mut entry.numeric, &spec.alias, &kvs, f64::min),
                SelectOp::Max => merge_extreme(&mut entry.numeric, &spec.alias, &kvs, f64::max),
                SelectOp::Avg => {
                    merge_add(&mut entry.numeric, &format!("{}_sum", spec.alias), &kvs);
                    merge_add(&mut entry.numeric, &format!("{}_count", spec.alias), &kvs);
                }
                SelectOp::Last => {
                    if let Some(v) = kvs.get(&spec.alias) {
                        entry.last.insert(spec.alias.clone(), v.clone());
                    }
                }
            }
        }
    }

    /// The merged value for `spec` within `group_key`, rendered as text.
    /// `Avg` is divided down from its merged sum/count here, never earlier.
    pub fn render_value(&self, group_key: &str, spec: &SelectSpec) -> Option<String> {
        let group = self.groups.get(group_key)?;
        match spec.op {
            SelectOp::Avg => {
                let sum = group
                    .numeric
                    .get(&format!("{}_sum", spec.alias))
                    .copied()
                    .unwrap_or(0.0);
                let count = group
                    .numeric
                    .get(&format!("{}_count", spec.alias))
                    .copied()
                    .unwrap_or(0.0);
                if count == 0.0 {
                    Some("0".to_string())
                } else {
                    Some((sum / count).to_string())
                }
            }
            SelectOp::Last => group.last.get(&spec.alias).cloned(),
            _ => group.numeric.get(&spec.alias).map(f64::to_string),
        }
    }

    pub fn group_keys(&self) -> Vec<String> {
        self.groups.keys().cloned().collect()
    }

    pub fn samples(&self, group_key: &str) -> u64 {
        self.groups.get(group_key).map(|g| g.samples).unwrap_or(0)
    }

    /// Split a group key back into its `GROUP BY` field values.
    pub fn split_group_key(group_key: &str) -> Vec<&str> {
        group_key.split(GROUP_KEY_DELIM).collect()
    }
}

fn merge_add(values: &mut IndexMap<String, f64>, alias: &str, kvs: &IndexMap<String, String>) {
    if let Some(v) = kvs.get(alias).and_then(|s| s.parse::<f64>().ok()) {
        *values.entry(alias.to_string()).or_insert(0.0) += v;
    }
}

fn merge_extreme(
    values: &mut IndexMap<String, f64>,
    alias: &str,
    kvs: &IndexMap<String, String>,
    pick: fn(f64, f64) -> f64,
) {
    if let Some(v) = kvs.get(alias).and_then(|s| s.parse::<f64>().ok()) {
        let entry = values.entry(alias.to_string()).or_insert(v);
        *entry = pick(*entry, v);
    }
}
