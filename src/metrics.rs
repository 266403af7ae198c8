use crate::schema::CanonicalRecord;
use serde::{Serialize, Serializer};
use std::cmp::Ordering;

pub const DEFAULT_TOP_N: usize = 5;

/// Yield per unit of fertilizer, or `Undefined` when that ratio has no
/// meaningful value (zero or non-numeric fertilizer, non-numeric yield).
///
/// Serializes as a string with exactly four fractional digits, or `null`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Efficiency {
    Value(f64),
    Undefined,
}

impl Efficiency {
    pub fn value(self) -> Option<f64> {
        match self {
            Efficiency::Value(v) => Some(v),
            Efficiency::Undefined => None,
        }
    }

    pub fn display(self) -> Option<String> {
        self.value().map(|v| format!("{:.4}", v))
    }
}

impl Serialize for Efficiency {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self.display() {
            Some(text) => s.serialize_str(&text),
            None => s.serialize_none(),
        }
    }
}

pub fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}

pub fn compute_efficiency(record: &CanonicalRecord) -> Efficiency {
    let (y, f) = (record.yield_tons, record.fertilizer);
    if !y.is_finite() || !f.is_finite() || f == 0.0 {
        return Efficiency::Undefined;
    }
    Efficiency::Value(round4(y / f))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedRecord {
    #[serde(flatten)]
    pub record: CanonicalRecord,
    pub efficiency: Efficiency,
}

pub fn derive(record: CanonicalRecord) -> DerivedRecord {
    let efficiency = compute_efficiency(&record);
    DerivedRecord { record, efficiency }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub average_efficiency: Efficiency,
    pub top_yield: DerivedRecord,
    pub max_rainfall: DerivedRecord,
    pub count: usize,
}

/// First record holding the maximum of `key`. NaN never wins; if every
/// value is NaN the first record is returned.
fn first_max_by<F>(records: &[DerivedRecord], key: F) -> Option<&DerivedRecord>
where
    F: Fn(&DerivedRecord) -> f64,
{
    let mut best: Option<(&DerivedRecord, f64)> = None;
    for r in records {
        let v = key(r);
        if v.is_nan() {
            continue;
        }
        match best {
            Some((_, bv)) if v <= bv => {}
            _ => best = Some((r, v)),
        }
    }
    best.map(|(r, _)| r).or_else(|| records.first())
}

/// Dashboard KPIs. `None` for an empty dataset.
pub fn summarize(records: &[DerivedRecord]) -> Option<Summary> {
    let top_yield = first_max_by(records, |r| r.record.yield_tons)?;
    let max_rainfall = first_max_by(records, |r| r.record.rainfall)?;

    let defined: Vec<f64> = records.iter().filter_map(|r| r.efficiency.value()).collect();
    let average_efficiency = if defined.is_empty() {
        Efficiency::Undefined
    } else {
        Efficiency::Value(round4(defined.iter().sum::<f64>() / defined.len() as f64))
    };

    Some(Summary {
        average_efficiency,
        top_yield: top_yield.clone(),
        max_rainfall: max_rainfall.clone(),
        count: records.len(),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedRecord {
    pub rank: usize,
    #[serde(flatten)]
    pub record: DerivedRecord,
}

fn yield_key(r: &DerivedRecord) -> f64 {
    if r.record.yield_tons.is_nan() {
        f64::NEG_INFINITY
    } else {
        r.record.yield_tons
    }
}

/// Highest yields first. Ties keep dataset order.
pub fn top_n(records: &[DerivedRecord], n: usize) -> Vec<RankedRecord> {
    let mut sorted: Vec<&DerivedRecord> = records.iter().collect();
    sorted.sort_by(|a, b| {
        yield_key(b)
            .partial_cmp(&yield_key(a))
            .unwrap_or(Ordering::Equal)
    });
    sorted
        .into_iter()
        .take(n)
        .enumerate()
        .map(|(i, r)| RankedRecord {
            rank: i + 1,
            record: r.clone(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelAverage {
    pub label: String,
    pub average_yield: Option<f64>,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScatterPoint {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSeries {
    pub crop_yield: Vec<LabelAverage>,
    pub location_yield: Vec<LabelAverage>,
    /// x = yield, y = fertilizer.
    pub scatter: Vec<ScatterPoint>,
}

fn average_yield_by<F>(records: &[DerivedRecord], label: F) -> Vec<LabelAverage>
where
    F: Fn(&DerivedRecord) -> &str,
{
    let mut groups: Vec<(String, f64, usize, usize)> = Vec::new();
    for r in records {
        let l = label(r);
        let idx = match groups.iter().position(|(g, ..)| g == l) {
            Some(i) => i,
            None => {
                groups.push((l.to_string(), 0.0, 0, 0));
                groups.len() - 1
            }
        };
        let g = &mut groups[idx];
        g.3 += 1;
        if r.record.yield_tons.is_finite() {
            g.1 += r.record.yield_tons;
            g.2 += 1;
        }
    }
    groups
        .into_iter()
        .map(|(label, sum, finite, count)| LabelAverage {
            label,
            average_yield: if finite > 0 {
                Some(sum / finite as f64)
            } else {
                None
            },
            count,
        })
        .collect()
}

pub fn chart_series(records: &[DerivedRecord]) -> ChartSeries {
    ChartSeries {
        crop_yield: average_yield_by(records, |r| r.record.crop.as_str()),
        location_yield: average_yield_by(records, |r| r.record.location.as_str()),
        scatter: records
            .iter()
            .filter(|r| r.record.yield_tons.is_finite() && r.record.fertilizer.is_finite())
            .map(|r| ScatterPoint {
                x: r.record.yield_tons,
                y: r.record.fertilizer,
            })
            .collect(),
    }
}
