use serde::{Deserialize, Serialize};

/// Internal shape of one field observation.
///
/// `efficiency` is not part of this struct; it is always derived at load
/// time (see `metrics::derive`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalRecord {
    pub id: i64,
    pub name: String,
    pub location: String,
    pub crop: String,
    pub n: i64,
    pub p: i64,
    pub k: i64,
    pub fertilizer: f64,
    pub rainfall: f64,
    #[serde(rename = "yield")]
    pub yield_tons: f64,
    #[serde(default)]
    pub notes: String,
}

/// Persisted shape, keyed by the fixed external column names.
///
/// `id` is `None` for payloads that have not been through the allocator yet
/// (form drafts and normalized import rows).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExternalRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(rename = "Farmer_name")]
    pub farmer_name: String,
    #[serde(rename = "Location")]
    pub location: String,
    #[serde(rename = "Crop Type")]
    pub crop_type: String,
    #[serde(rename = "N")]
    pub n: i64,
    #[serde(rename = "P")]
    pub p: i64,
    #[serde(rename = "K")]
    pub k: i64,
    #[serde(rename = "Fertilizer")]
    pub fertilizer: f64,
    #[serde(rename = "Rainfall")]
    pub rainfall: f64,
    #[serde(rename = "Yield")]
    pub yield_tons: f64,
    #[serde(rename = "Note")]
    pub note: Option<String>,
}

/// Form capture output: a canonical record without an identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordDraft {
    pub name: String,
    pub location: String,
    pub crop: String,
    pub n: i64,
    pub p: i64,
    pub k: i64,
    pub fertilizer: f64,
    pub rainfall: f64,
    pub yield_tons: f64,
    pub notes: String,
}

impl RecordDraft {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name must not be empty".into());
        }
        if self.location.trim().is_empty() {
            return Err("location must not be empty".into());
        }
        for (key, v) in [
            ("fertilizer", self.fertilizer),
            ("rainfall", self.rainfall),
            ("yield", self.yield_tons),
        ] {
            if !v.is_finite() {
                return Err(format!("{} must be a number", key));
            }
            if v < 0.0 {
                return Err(format!("{} must not be negative", key));
            }
        }
        Ok(())
    }
}

#[allow(dead_code)]
pub fn to_external(record: &CanonicalRecord) -> ExternalRecord {
    ExternalRecord {
        id: Some(record.id),
        farmer_name: record.name.clone(),
        location: record.location.clone(),
        crop_type: record.crop.clone(),
        n: record.n,
        p: record.p,
        k: record.k,
        fertilizer: record.fertilizer,
        rainfall: record.rainfall,
        yield_tons: record.yield_tons,
        note: Some(record.notes.clone()),
    }
}

pub fn to_internal(record: ExternalRecord) -> CanonicalRecord {
    CanonicalRecord {
        id: record.id.unwrap_or_default(),
        name: record.farmer_name,
        location: record.location,
        crop: record.crop_type,
        n: record.n,
        p: record.p,
        k: record.k,
        fertilizer: record.fertilizer,
        rainfall: record.rainfall,
        yield_tons: record.yield_tons,
        notes: record.note.unwrap_or_default(),
    }
}

pub fn draft_to_external(draft: &RecordDraft) -> ExternalRecord {
    ExternalRecord {
        id: None,
        farmer_name: draft.name.clone(),
        location: draft.location.clone(),
        crop_type: draft.crop.clone(),
        n: draft.n,
        p: draft.p,
        k: draft.k,
        fertilizer: draft.fertilizer,
        rainfall: draft.rainfall,
        yield_tons: draft.yield_tons,
        note: Some(draft.notes.clone()),
    }
}
