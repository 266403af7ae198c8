use crate::db;
use crate::ids::IdPolicy;
use anyhow::Context;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

pub const CONFIG_KEY: &str = "agrifield.config";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgriConfig {
    pub table_name: String,
    pub top_performer_limit: usize,
    pub import_id_policy: IdPolicy,
    pub max_import_rows: usize,
}

impl Default for AgriConfig {
    fn default() -> Self {
        Self {
            table_name: "agri_data".to_string(),
            top_performer_limit: crate::metrics::DEFAULT_TOP_N,
            import_id_policy: IdPolicy::Append,
            max_import_rows: 10_000,
        }
    }
}

/// Table names are spliced into SQL, so only `[A-Za-z0-9_]` is allowed.
pub fn valid_table_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 64
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Saved config over defaults. A stored value that no longer parses is
/// ignored rather than blocking the workspace from opening.
pub fn load(conn: &Connection) -> anyhow::Result<AgriConfig> {
    let Some(saved) = db::settings_get_json(conn, CONFIG_KEY)? else {
        return Ok(AgriConfig::default());
    };
    match serde_json::from_value::<AgriConfig>(saved) {
        Ok(cfg) if valid_table_name(&cfg.table_name) => Ok(cfg),
        Ok(cfg) => {
            warn!(table = %cfg.table_name, "saved table name rejected, using defaults");
            Ok(AgriConfig::default())
        }
        Err(e) => {
            warn!(error = %e, "saved config unreadable, using defaults");
            Ok(AgriConfig::default())
        }
    }
}

pub fn save(conn: &Connection, cfg: &AgriConfig) -> anyhow::Result<()> {
    let value = serde_json::to_value(cfg).context("serialize config")?;
    db::settings_set_json(conn, CONFIG_KEY, &value).context("store config")
}

fn parse_usize_range(v: &Value, key: &str, min: usize, max: usize) -> Result<usize, String> {
    let n = v
        .as_u64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    let n = usize::try_from(n).map_err(|_| format!("{} must be in {}..={}", key, min, max))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

/// Applies a partial update. Either every key is applied or none is.
pub fn merge_config_patch(current: &AgriConfig, patch: &Map<String, Value>) -> Result<AgriConfig, String> {
    let mut next = current.clone();
    for (k, v) in patch {
        match k.as_str() {
            "tableName" => {
                let s = v
                    .as_str()
                    .ok_or_else(|| "tableName must be string".to_string())?
                    .trim();
                if !valid_table_name(s) {
                    return Err("tableName may only contain letters, digits and _".into());
                }
                next.table_name = s.to_string();
            }
            "topPerformerLimit" => {
                next.top_performer_limit = parse_usize_range(v, k, 1, 50)?;
            }
            "importIdPolicy" => {
                let s = v
                    .as_str()
                    .ok_or_else(|| "importIdPolicy must be string".to_string())?;
                next.import_id_policy = IdPolicy::parse(s)
                    .ok_or_else(|| "importIdPolicy must be one of: append, fillGaps".to_string())?;
            }
            "maxImportRows" => {
                next.max_import_rows = parse_usize_range(v, k, 1, 100_000)?;
            }
            _ => return Err(format!("unknown config field: {}", k)),
        }
    }
    Ok(next)
}
