use crate::config::{self, AgriConfig};
use crate::dataset::Dataset;
use crate::db;
use crate::error::AgriError;
use crate::import::{self, ImportError, RawRow, RejectedRow};
use crate::metrics::DerivedRecord;
use crate::schema::{self, RecordDraft};
use crate::sheet;
use crate::store::{RecordStore, SqliteStore, StoreError};
use anyhow::Context;
use rusqlite::Connection;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub imported: usize,
    pub ids: Vec<i64>,
    pub rejected_count: usize,
    pub rejected_rows: Vec<RejectedRow>,
}

/// One open workspace: the store connection, its config, the derived
/// dataset and the record picked for deletion.
///
/// Every mutation is one store operation followed by a full reload.
pub struct Session {
    workspace: PathBuf,
    conn: Connection,
    config: AgriConfig,
    dataset: Dataset,
    delete_target: Option<i64>,
}

impl Session {
    pub fn open(workspace: &Path) -> Result<Self, AgriError> {
        let conn = db::open_db(workspace)
            .with_context(|| format!("open workspace {}", workspace.display()))?;
        let config = config::load(&conn).context("load config")?;
        db::ensure_records_table(&conn, &config.table_name).map_err(StoreError::from)?;

        let mut session = Self {
            workspace: workspace.to_path_buf(),
            conn,
            config,
            dataset: Dataset::default(),
            delete_target: None,
        };
        let count = session.reload()?;
        info!(
            workspace = %workspace.display(),
            table = %session.config.table_name,
            count,
            "workspace opened"
        );
        Ok(session)
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn config(&self) -> &AgriConfig {
        &self.config
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    #[cfg(test)]
    pub fn delete_target(&self) -> Option<i64> {
        self.delete_target
    }

    fn store(&self) -> SqliteStore<'_> {
        SqliteStore::new(&self.conn, self.config.table_name.as_str())
    }

    pub fn reload(&mut self) -> Result<usize, AgriError> {
        let store = SqliteStore::new(&self.conn, self.config.table_name.as_str());
        match self.dataset.reload(&store) {
            Ok(count) => Ok(count),
            Err(e) => {
                warn!(error = %e, "dataset reload failed");
                Err(e.into())
            }
        }
    }

    fn reloaded_record(&mut self, id: i64) -> Result<DerivedRecord, AgriError> {
        self.reload()?;
        self.dataset
            .get(id)
            .cloned()
            .ok_or(AgriError::NotFound(id))
    }

    pub fn create(&mut self, draft: &RecordDraft) -> Result<DerivedRecord, AgriError> {
        draft.validate().map_err(AgriError::Validation)?;
        let payload = schema::draft_to_external(draft);
        let id = self.store().create_with_next_id(&payload).map_err(store_failed)?;
        info!(id, "record created");
        self.reloaded_record(id)
    }

    pub fn update(&mut self, id: i64, draft: &RecordDraft) -> Result<DerivedRecord, AgriError> {
        draft.validate().map_err(AgriError::Validation)?;
        let payload = schema::draft_to_external(draft);
        let changed = self.store().update_by_key(id, &payload).map_err(store_failed)?;
        if changed == 0 {
            return Err(AgriError::NotFound(id));
        }
        info!(id, "record updated");
        self.reloaded_record(id)
    }

    pub fn delete(&mut self, id: i64) -> Result<i64, AgriError> {
        let removed = self.store().delete_by_key(id).map_err(store_failed)?;
        if removed == 0 {
            return Err(AgriError::NotFound(id));
        }
        if self.delete_target == Some(id) {
            self.delete_target = None;
        }
        info!(id, "record deleted");
        self.reload()?;
        Ok(id)
    }

    pub fn select_for_delete(&mut self, id: i64) -> Result<i64, AgriError> {
        if self.dataset.get(id).is_none() {
            return Err(AgriError::NotFound(id));
        }
        self.delete_target = Some(id);
        Ok(id)
    }

    /// The selection is consumed whether or not the delete succeeds.
    pub fn confirm_delete(&mut self) -> Result<i64, AgriError> {
        let id = self.delete_target.take().ok_or(AgriError::NoDeleteTarget)?;
        self.delete(id)
    }

    /// Returns whether a selection was cleared.
    pub fn cancel_delete(&mut self) -> bool {
        self.delete_target.take().is_some()
    }

    pub fn import_rows(&mut self, rows: &[RawRow]) -> Result<ImportReport, AgriError> {
        let max = self.config.max_import_rows;
        if rows.len() > max {
            return Err(ImportError::TooManyRows {
                rows: rows.len(),
                max,
            }
            .into());
        }
        let outcome = import::normalize(rows)?;
        let ids = self
            .store()
            .insert_batch_with_ids(&outcome.valid, self.config.import_id_policy)
            .map_err(store_failed)?;
        info!(
            imported = ids.len(),
            rejected = outcome.rejected_count(),
            policy = self.config.import_id_policy.as_str(),
            "import applied"
        );
        self.reload()?;
        Ok(ImportReport {
            imported: ids.len(),
            ids,
            rejected_count: outcome.rejected_count(),
            rejected_rows: outcome.rejected,
        })
    }

    pub fn import_file(&mut self, path: &Path) -> Result<ImportReport, AgriError> {
        let rows = sheet::read_rows(path)?;
        info!(path = %path.display(), rows = rows.len(), "import file read");
        self.import_rows(&rows)
    }

    /// Validates and saves a partial config. Switching `tableName` points the
    /// session at that table (created if missing) and reloads from it.
    pub fn update_config(&mut self, patch: &Map<String, Value>) -> Result<AgriConfig, AgriError> {
        let next = config::merge_config_patch(&self.config, patch).map_err(AgriError::Validation)?;
        let table_changed = next.table_name != self.config.table_name;
        if table_changed {
            db::ensure_records_table(&self.conn, &next.table_name).map_err(StoreError::from)?;
        }
        config::save(&self.conn, &next)?;
        self.config = next;
        info!(table = %self.config.table_name, "config updated");
        if table_changed {
            self.delete_target = None;
            self.reload()?;
        }
        Ok(self.config.clone())
    }
}

fn store_failed(e: StoreError) -> AgriError {
    warn!(error = %e, "store operation failed");
    AgriError::Store(e)
}

/// Record ids arrive as JSON numbers or as the numeric text of a table row.
pub fn parse_record_id(v: &Value) -> Result<i64, AgriError> {
    let id = match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    match id {
        Some(id) if id > 0 => Ok(id),
        _ => Err(AgriError::InvalidParams(
            "id must be a positive integer".to_string(),
        )),
    }
}
