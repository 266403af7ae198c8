use crate::error::AgriError;
use crate::schema::RecordDraft;
use crate::session;
use serde_json::Value;

fn bad_params(message: impl Into<String>) -> AgriError {
    AgriError::InvalidParams(message.into())
}

pub fn required_id(params: &Value) -> Result<i64, AgriError> {
    let v = params
        .get("id")
        .ok_or_else(|| bad_params("missing params.id"))?;
    session::parse_record_id(v)
}

pub fn optional_str<'a>(params: &'a Value, key: &str) -> Result<Option<&'a str>, AgriError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(bad_params(format!("{} must be string", key))),
    }
}

fn text_field(params: &Value, key: &str) -> Result<String, AgriError> {
    Ok(optional_str(params, key)?.unwrap_or("").trim().to_string())
}

/// Form numbers arrive as JSON numbers or as the raw input text. Missing or
/// blank input is `NaN`, which draft validation reports.
fn decimal_field(params: &Value, key: &str) -> Result<f64, AgriError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(f64::NAN),
        Some(Value::Number(n)) => Ok(n.as_f64().unwrap_or(f64::NAN)),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(f64::NAN),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| bad_params(format!("{} must be a number", key))),
        Some(_) => Err(bad_params(format!("{} must be a number", key))),
    }
}

/// Nutrient inputs default to 0 when left blank.
fn integer_field(params: &Value, key: &str) -> Result<i64, AgriError> {
    let parsed = match params.get(key) {
        None | Some(Value::Null) => return Ok(0),
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(0),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        Some(_) => None,
    };
    parsed.ok_or_else(|| bad_params(format!("{} must be integer", key)))
}

pub fn parse_draft(params: &Value) -> Result<RecordDraft, AgriError> {
    if !params.is_object() {
        return Err(bad_params("params must be an object"));
    }
    Ok(RecordDraft {
        name: text_field(params, "name")?,
        location: text_field(params, "location")?,
        crop: text_field(params, "crop")?,
        n: integer_field(params, "n")?,
        p: integer_field(params, "p")?,
        k: integer_field(params, "k")?,
        fertilizer: decimal_field(params, "fertilizer")?,
        rainfall: decimal_field(params, "rainfall")?,
        yield_tons: decimal_field(params, "yield")?,
        notes: optional_str(params, "notes")?.unwrap_or("").to_string(),
    })
}

pub fn optional_limit(params: &Value, key: &str, max: usize) -> Result<Option<usize>, AgriError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => match v.as_u64() {
            Some(n) if n >= 1 && n as usize <= max => Ok(Some(n as usize)),
            _ => Err(bad_params(format!("{} must be in 1..={}", key, max))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn draft_accepts_form_text_and_numbers() {
        let d = parse_draft(&json!({
            "name": " Asha ",
            "location": "Nashik",
            "crop": "Wheat",
            "n": "120",
            "p": 60,
            "k": "",
            "fertilizer": "40",
            "rainfall": 612.5,
            "yield": "8"
        }))
        .expect("draft");
        assert_eq!(d.name, "Asha");
        assert_eq!((d.n, d.p, d.k), (120, 60, 0));
        assert_eq!(d.fertilizer, 40.0);
        assert_eq!(d.yield_tons, 8.0);
        assert_eq!(d.notes, "");
    }

    #[test]
    fn draft_rejects_non_numeric_text() {
        let e = parse_draft(&json!({ "name": "a", "location": "b", "yield": "lots" }))
            .expect_err("bad yield");
        assert_eq!(e.code(), "bad_params");
        assert!(parse_draft(&json!({ "n": "1.5" })).is_err());
        assert!(parse_draft(&json!([])).is_err());
    }

    #[test]
    fn missing_yield_is_left_for_validation() {
        let d = parse_draft(&json!({ "name": "a", "location": "b" })).expect("draft");
        assert!(d.yield_tons.is_nan());
        assert!(d.validate().is_err());
    }

    #[test]
    fn limits_are_bounded() {
        assert_eq!(optional_limit(&json!({}), "limit", 50).expect("none"), None);
        assert_eq!(optional_limit(&json!({ "limit": 3 }), "limit", 50).expect("3"), Some(3));
        assert!(optional_limit(&json!({ "limit": 0 }), "limit", 50).is_err());
        assert!(optional_limit(&json!({ "limit": 51 }), "limit", 50).is_err());
    }
}
