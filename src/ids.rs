use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// How a batch import picks identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IdPolicy {
    /// Sequential block after the current maximum. Gaps stay unused.
    #[default]
    Append,
    /// Lowest unused ids first, same rule as single-record creation.
    FillGaps,
}

impl IdPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "append" => Some(IdPolicy::Append),
            "fillGaps" => Some(IdPolicy::FillGaps),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IdPolicy::Append => "append",
            IdPolicy::FillGaps => "fillGaps",
        }
    }
}

/// Lowest positive integer not in `existing`.
pub fn next_id(existing: &BTreeSet<i64>) -> i64 {
    let mut candidate = 1;
    for &id in existing.range(1..) {
        if id != candidate {
            break;
        }
        candidate += 1;
    }
    candidate
}

/// `count` sequential ids starting right after the current maximum.
pub fn next_id_batch(existing: &BTreeSet<i64>, count: usize) -> Vec<i64> {
    let start = existing
        .iter()
        .next_back()
        .map(|max| (max + 1).max(1))
        .unwrap_or(1);
    (0..count as i64).map(|i| start + i).collect()
}

/// The `count` lowest positive ids not in `existing`.
pub fn next_ids_filling_gaps(existing: &BTreeSet<i64>, count: usize) -> Vec<i64> {
    let mut out = Vec::with_capacity(count);
    let mut candidate = 1;
    while out.len() < count {
        if !existing.contains(&candidate) {
            out.push(candidate);
        }
        candidate += 1;
    }
    out
}

pub fn allocate_batch(existing: &BTreeSet<i64>, count: usize, policy: IdPolicy) -> Vec<i64> {
    match policy {
        IdPolicy::Append => next_id_batch(existing, count),
        IdPolicy::FillGaps => next_ids_filling_gaps(existing, count),
    }
}
