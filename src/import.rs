use crate::schema::ExternalRecord;
use serde::Serialize;
use serde_json::{Map, Number, Value};
use thiserror::Error;
use tracing::{debug, warn};

/// One loosely-typed input row, keyed by whatever column headers the file had.
pub type RawRow = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportField {
    Name,
    Location,
    Crop,
    Npk,
    Fertilizer,
    Rainfall,
    Yield,
    Notes,
}

/// Candidate source columns per target field. First key present in a row wins.
pub const FIELD_ALIASES: &[(ImportField, &[&str])] = &[
    (ImportField::Name, &["FARMER", "Farmer", "Farmer Name", "Name"]),
    (ImportField::Location, &["LOCATION", "Location"]),
    (ImportField::Crop, &["CROP", "Crop", "Crop Type"]),
    (ImportField::Npk, &["SOIL (N-P-K)", "Soil", "N-P-K", "NPK"]),
    (ImportField::Fertilizer, &["FERT (KG)", "Fertilizer", "Fert"]),
    (ImportField::Rainfall, &["RAIN (MM)", "Rainfall", "Rain"]),
    (ImportField::Yield, &["YIELD (TONS)", "Yield"]),
    (ImportField::Notes, &["NOTES", "Notes", "Note"]),
];

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("the import contains no rows")]
    Empty,
    #[error("no valid rows could be mapped ({rejected} rejected); check the column headers")]
    NoValidRows { rejected: usize },
    #[error("the import has {rows} rows; at most {max} are accepted per batch")]
    TooManyRows { rows: usize, max: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedRow {
    /// Spreadsheet row number: the header is row 1, the first data row is row 2.
    pub row_number: usize,
    pub missing: Vec<&'static str>,
}

#[derive(Debug, Clone)]
pub struct ImportOutcome {
    pub valid: Vec<ExternalRecord>,
    pub rejected: Vec<RejectedRow>,
}

impl ImportOutcome {
    pub fn rejected_count(&self) -> usize {
        self.rejected.len()
    }
}

fn aliases(field: ImportField) -> &'static [&'static str] {
    FIELD_ALIASES
        .iter()
        .find(|(f, _)| *f == field)
        .map(|(_, keys)| *keys)
        .unwrap_or(&[])
}

/// Value of the first alias key present in the row. A key holding JSON
/// `null` still counts as the match.
fn resolve(row: &RawRow, field: ImportField) -> Option<&Value> {
    aliases(field).iter().find_map(|k| row.get(*k))
}

pub fn number_text(n: &Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
        Some(f) => f.to_string(),
        None => n.to_string(),
    }
}

fn text_of(v: Option<&Value>) -> Option<String> {
    match v? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(number_text(n)),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn present_text(v: Option<&Value>) -> Option<String> {
    text_of(v)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Leading decimal prefix of `s` (`"12.5kg"` -> 12.5), NaN when there is none.
pub fn parse_decimal_prefix(s: &str) -> f64 {
    let t = s.trim_start();
    let b = t.as_bytes();
    let mut i = 0;
    if i < b.len() && (b[i] == b'+' || b[i] == b'-') {
        i += 1;
    }
    let int_start = i;
    while i < b.len() && b[i].is_ascii_digit() {
        i += 1;
    }
    let mut digits = i - int_start;
    if i < b.len() && b[i] == b'.' {
        let mut j = i + 1;
        while j < b.len() && b[j].is_ascii_digit() {
            j += 1;
        }
        digits += j - (i + 1);
        if digits > 0 {
            i = j;
        }
    }
    if digits == 0 {
        return f64::NAN;
    }
    if i < b.len() && (b[i] == b'e' || b[i] == b'E') {
        let mut j = i + 1;
        if j < b.len() && (b[j] == b'+' || b[j] == b'-') {
            j += 1;
        }
        let exp_start = j;
        while j < b.len() && b[j].is_ascii_digit() {
            j += 1;
        }
        if j > exp_start {
            i = j;
        }
    }
    t[..i].parse::<f64>().unwrap_or(f64::NAN)
}

/// Leading integer prefix of `s` (`" 60 "` -> 60, `"7.9"` -> 7).
pub fn parse_int_prefix(s: &str) -> Option<i64> {
    let t = s.trim();
    let b = t.as_bytes();
    let mut i = 0;
    if i < b.len() && (b[i] == b'+' || b[i] == b'-') {
        i += 1;
    }
    let digits_start = i;
    while i < b.len() && b[i].is_ascii_digit() {
        i += 1;
    }
    if i == digits_start {
        return None;
    }
    t[..i].parse::<i64>().ok()
}

pub fn parse_decimal(v: Option<&Value>) -> f64 {
    match v {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Some(Value::String(s)) => parse_decimal_prefix(s),
        _ => f64::NAN,
    }
}

/// Splits a combined `"N-P-K"` string. Anything other than exactly three
/// integer parts gives `(0, 0, 0)`.
pub fn parse_npk(v: Option<&Value>) -> (i64, i64, i64) {
    let Some(Value::String(s)) = v else {
        return (0, 0, 0);
    };
    if !s.contains('-') {
        return (0, 0, 0);
    }
    let parts: Vec<Option<i64>> = s.split('-').map(parse_int_prefix).collect();
    match parts.as_slice() {
        [Some(n), Some(p), Some(k)] => (*n, *p, *k),
        _ => (0, 0, 0),
    }
}

fn normalize_row(row: &RawRow) -> Result<ExternalRecord, Vec<&'static str>> {
    let name = present_text(resolve(row, ImportField::Name));
    let location = present_text(resolve(row, ImportField::Location));
    let yield_tons = parse_decimal(resolve(row, ImportField::Yield));

    let mut missing = Vec::new();
    if name.is_none() {
        missing.push("name");
    }
    if location.is_none() {
        missing.push("location");
    }
    if !yield_tons.is_finite() {
        missing.push("yield");
    }
    let (Some(name), Some(location), true) = (name, location, missing.is_empty()) else {
        return Err(missing);
    };

    let (n, p, k) = parse_npk(resolve(row, ImportField::Npk));
    Ok(ExternalRecord {
        id: None,
        farmer_name: name,
        location,
        crop_type: text_of(resolve(row, ImportField::Crop)).unwrap_or_default(),
        n,
        p,
        k,
        fertilizer: parse_decimal(resolve(row, ImportField::Fertilizer)),
        rainfall: parse_decimal(resolve(row, ImportField::Rainfall)),
        yield_tons,
        note: Some(text_of(resolve(row, ImportField::Notes)).unwrap_or_default()),
    })
}

/// Maps raw rows onto external-shape records. Bad rows are skipped and
/// reported; the call only fails when nothing is importable.
pub fn normalize(rows: &[RawRow]) -> Result<ImportOutcome, ImportError> {
    if rows.is_empty() {
        return Err(ImportError::Empty);
    }

    let mut valid = Vec::new();
    let mut rejected = Vec::new();
    for (idx, row) in rows.iter().enumerate() {
        match normalize_row(row) {
            Ok(rec) => valid.push(rec),
            Err(missing) => {
                let row_number = idx + 2;
                warn!(row = row_number, ?missing, "import row skipped");
                rejected.push(RejectedRow {
                    row_number,
                    missing,
                });
            }
        }
    }

    debug!(
        valid = valid.len(),
        rejected = rejected.len(),
        "import rows normalized"
    );
    if valid.is_empty() {
        return Err(ImportError::NoValidRows {
            rejected: rejected.len(),
        });
    }
    Ok(ImportOutcome { valid, rejected })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(v: Value) -> RawRow {
        v.as_object().cloned().expect("object row")
    }

    #[test]
    fn combined_npk_is_split_into_three_levels() {
        let rows = vec![row(json!({
            "FARMER": "Asha",
            "LOCATION": "Nashik",
            "CROP": "Wheat",
            "SOIL (N-P-K)": "120-60-40",
            "FERT (KG)": 40,
            "RAIN (MM)": "610",
            "YIELD (TONS)": 8
        }))];
        let out = normalize(&rows).expect("normalize");
        let r = &out.valid[0];
        assert_eq!((r.n, r.p, r.k), (120, 60, 40));
        assert_eq!(r.farmer_name, "Asha");
        assert_eq!(r.crop_type, "Wheat");
        assert_eq!(r.fertilizer, 40.0);
        assert_eq!(r.rainfall, 610.0);
        assert_eq!(r.yield_tons, 8.0);
        assert_eq!(r.note.as_deref(), Some(""));
        assert_eq!(r.id, None);
    }

    #[test]
    fn name_and_location_are_trimmed() {
        let rows = vec![row(json!({ "Name": "  Asha ", "Location": " Pune", "Yield": 2 }))];
        let out = normalize(&rows).expect("normalize");
        assert_eq!(out.valid[0].farmer_name, "Asha");
        assert_eq!(out.valid[0].location, "Pune");
    }

    #[test]
    fn unparseable_npk_falls_back_to_zero() {
        assert_eq!(parse_npk(Some(&json!("abc"))), (0, 0, 0));
        assert_eq!(parse_npk(Some(&json!("10-x-5"))), (0, 0, 0));
        assert_eq!(parse_npk(Some(&json!("10-20"))), (0, 0, 0));
        assert_eq!(parse_npk(Some(&json!("1-2-3-4"))), (0, 0, 0));
        assert_eq!(parse_npk(Some(&json!(120))), (0, 0, 0));
        assert_eq!(parse_npk(None), (0, 0, 0));
        assert_eq!(parse_npk(Some(&json!(" 90 - 45 - 30 "))), (90, 45, 30));
    }

    #[test]
    fn first_matching_alias_wins() {
        let r = row(json!({
            "Name": "second",
            "Farmer": "first",
            "Location": "Pune",
            "Yield": 1
        }));
        let out = normalize(&[r]).expect("normalize");
        assert_eq!(out.valid[0].farmer_name, "first");
    }

    #[test]
    fn alias_match_is_case_sensitive() {
        let r = row(json!({ "farmer": "x", "location": "y", "yield": 1 }));
        match normalize(&[r]) {
            Err(ImportError::NoValidRows { rejected }) => assert_eq!(rejected, 1),
            other => panic!("expected NoValidRows, got {:?}", other.map(|o| o.valid)),
        }
    }

    #[test]
    fn row_missing_location_is_rejected_and_counted() {
        let rows = vec![
            row(json!({ "Farmer": "Asha", "Location": "Nashik", "Yield": 3 })),
            row(json!({ "Farmer": "Ravi", "Yield": 4 })),
            row(json!({ "Farmer": "Meera", "Location": "Satara", "Yield": "2.5" })),
        ];
        let out = normalize(&rows).expect("normalize");
        assert_eq!(out.valid.len(), 2);
        assert_eq!(out.rejected_count(), 1);
        assert_eq!(out.rejected[0].row_number, 3);
        assert_eq!(out.rejected[0].missing, vec!["location"]);
        assert!(out.valid.iter().all(|r| r.farmer_name != "Ravi"));
    }

    #[test]
    fn unparseable_numbers_become_nan_but_yield_must_be_numeric() {
        let ok = row(json!({
            "Farmer": "Asha",
            "Location": "Nashik",
            "Fert": "n/a",
            "Rain": "",
            "Yield": "7 t"
        }));
        let out = normalize(&[ok]).expect("normalize");
        assert!(out.valid[0].fertilizer.is_nan());
        assert!(out.valid[0].rainfall.is_nan());
        assert_eq!(out.valid[0].yield_tons, 7.0);

        let bad = row(json!({ "Farmer": "Asha", "Location": "Nashik", "Yield": "none" }));
        match normalize(&[bad]) {
            Err(ImportError::NoValidRows { rejected }) => assert_eq!(rejected, 1),
            other => panic!("expected NoValidRows, got {:?}", other.map(|o| o.valid)),
        }
    }

    #[test]
    fn null_key_still_wins_resolution() {
        let r = row(json!({ "FARMER": null, "Farmer": "shadowed", "Location": "x", "Yield": 1 }));
        match normalize(&[r]) {
            Err(ImportError::NoValidRows { rejected }) => assert_eq!(rejected, 1),
            other => panic!("expected NoValidRows, got {:?}", other.map(|o| o.valid)),
        }
    }

    #[test]
    fn numeric_text_fields_are_rendered() {
        let r = row(json!({ "Farmer": 42, "Location": "Plot 9", "Yield": 0, "Notes": 12.5 }));
        let out = normalize(&[r]).expect("normalize");
        assert_eq!(out.valid[0].farmer_name, "42");
        assert_eq!(out.valid[0].yield_tons, 0.0);
        assert_eq!(out.valid[0].note.as_deref(), Some("12.5"));
    }

    #[test]
    fn empty_input_is_reported() {
        assert!(matches!(normalize(&[]), Err(ImportError::Empty)));
    }

    #[test]
    fn decimal_prefix_parsing() {
        assert_eq!(parse_decimal_prefix("12.5kg"), 12.5);
        assert_eq!(parse_decimal_prefix("  -3"), -3.0);
        assert_eq!(parse_decimal_prefix(".5"), 0.5);
        assert_eq!(parse_decimal_prefix("5."), 5.0);
        assert_eq!(parse_decimal_prefix("1e3mm"), 1000.0);
        assert_eq!(parse_decimal_prefix("2e"), 2.0);
        assert!(parse_decimal_prefix("kg12").is_nan());
        assert!(parse_decimal_prefix("").is_nan());
        assert!(parse_decimal_prefix(".").is_nan());
    }

    #[test]
    fn int_prefix_parsing() {
        assert_eq!(parse_int_prefix(" 60 "), Some(60));
        assert_eq!(parse_int_prefix("7.9"), Some(7));
        assert_eq!(parse_int_prefix("-4"), Some(-4));
        assert_eq!(parse_int_prefix("x1"), None);
        assert_eq!(parse_int_prefix(""), None);
    }
}
