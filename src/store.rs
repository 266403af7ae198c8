use crate::ids::{self, IdPolicy};
use crate::schema::ExternalRecord;
use rusqlite::{params, Connection, Row, Transaction, TransactionBehavior};
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("record payload has no id")]
    MissingId,
}

#[allow(dead_code)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// The keyed record table the dataset is loaded from and written to.
pub trait RecordStore {
    fn select_all(&self) -> Result<Vec<ExternalRecord>, StoreError>;
    #[allow(dead_code)]
    fn select_ids(&self, direction: SortDirection) -> Result<Vec<i64>, StoreError>;
    #[allow(dead_code)]
    fn insert_one(&self, record: &ExternalRecord) -> Result<(), StoreError>;
    #[allow(dead_code)]
    fn insert_many(&self, records: &[ExternalRecord]) -> Result<(), StoreError>;
    /// Number of rows changed; zero when `id` is not in the store.
    fn update_by_key(&self, id: i64, record: &ExternalRecord) -> Result<usize, StoreError>;
    /// Number of rows removed; zero when `id` is not in the store.
    fn delete_by_key(&self, id: i64) -> Result<usize, StoreError>;

    /// Allocates the lowest free id and inserts `record` under it atomically.
    fn create_with_next_id(&self, record: &ExternalRecord) -> Result<i64, StoreError>;
    /// Allocates ids for the whole batch per `policy` and inserts it atomically.
    fn insert_batch_with_ids(
        &self,
        records: &[ExternalRecord],
        policy: IdPolicy,
    ) -> Result<Vec<i64>, StoreError>;
}

const COLUMNS: &str = "id, \"Farmer_name\", \"Location\", \"Crop Type\", \"N\", \"P\", \"K\", \"Fertilizer\", \"Rainfall\", \"Yield\", \"Note\"";

/// SQL has no NaN; unparsed numbers are stored as NULL.
fn real_or_null(v: f64) -> Option<f64> {
    if v.is_finite() {
        Some(v)
    } else {
        None
    }
}

fn read_record(row: &Row<'_>) -> rusqlite::Result<ExternalRecord> {
    Ok(ExternalRecord {
        id: Some(row.get(0)?),
        farmer_name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        location: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        crop_type: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        n: row.get::<_, Option<i64>>(4)?.unwrap_or(0),
        p: row.get::<_, Option<i64>>(5)?.unwrap_or(0),
        k: row.get::<_, Option<i64>>(6)?.unwrap_or(0),
        fertilizer: row.get::<_, Option<f64>>(7)?.unwrap_or(f64::NAN),
        rainfall: row.get::<_, Option<f64>>(8)?.unwrap_or(f64::NAN),
        yield_tons: row.get::<_, Option<f64>>(9)?.unwrap_or(f64::NAN),
        note: row.get(10)?,
    })
}

pub struct SqliteStore<'c> {
    conn: &'c Connection,
    table: String,
}

impl<'c> SqliteStore<'c> {
    pub fn new(conn: &'c Connection, table: impl Into<String>) -> Self {
        Self {
            conn,
            table: table.into(),
        }
    }

    fn query_ids(&self, conn: &Connection, direction: SortDirection) -> Result<Vec<i64>, StoreError> {
        let dir = match direction {
            SortDirection::Ascending => "ASC",
            SortDirection::Descending => "DESC",
        };
        let mut stmt = conn.prepare(&format!(
            "SELECT id FROM \"{}\" ORDER BY id {}",
            self.table, dir
        ))?;
        let ids = stmt
            .query_map([], |r| r.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn insert_with_id(&self, conn: &Connection, id: i64, r: &ExternalRecord) -> Result<(), StoreError> {
        conn.execute(
            &format!(
                "INSERT INTO \"{}\"({}) VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                self.table, COLUMNS
            ),
            params![
                id,
                r.farmer_name,
                r.location,
                r.crop_type,
                r.n,
                r.p,
                r.k,
                real_or_null(r.fertilizer),
                real_or_null(r.rainfall),
                real_or_null(r.yield_tons),
                r.note.as_deref().unwrap_or(""),
            ],
        )?;
        Ok(())
    }

    fn begin(&self) -> Result<Transaction<'c>, StoreError> {
        Ok(Transaction::new_unchecked(
            self.conn,
            TransactionBehavior::Immediate,
        )?)
    }
}

impl RecordStore for SqliteStore<'_> {
    fn select_all(&self) -> Result<Vec<ExternalRecord>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM \"{}\" ORDER BY id ASC",
            COLUMNS, self.table
        ))?;
        let records = stmt
            .query_map([], read_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn select_ids(&self, direction: SortDirection) -> Result<Vec<i64>, StoreError> {
        self.query_ids(self.conn, direction)
    }

    fn insert_one(&self, record: &ExternalRecord) -> Result<(), StoreError> {
        let id = record.id.ok_or(StoreError::MissingId)?;
        self.insert_with_id(self.conn, id, record)
    }

    fn insert_many(&self, records: &[ExternalRecord]) -> Result<(), StoreError> {
        let tx = self.begin()?;
        for r in records {
            let id = r.id.ok_or(StoreError::MissingId)?;
            self.insert_with_id(&tx, id, r)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn update_by_key(&self, id: i64, r: &ExternalRecord) -> Result<usize, StoreError> {
        let changed = self.conn.execute(
            &format!(
                "UPDATE \"{}\" SET
                   \"Farmer_name\" = ?1,
                   \"Location\" = ?2,
                   \"Crop Type\" = ?3,
                   \"N\" = ?4,
                   \"P\" = ?5,
                   \"K\" = ?6,
                   \"Fertilizer\" = ?7,
                   \"Rainfall\" = ?8,
                   \"Yield\" = ?9,
                   \"Note\" = ?10
                 WHERE id = ?11",
                self.table
            ),
            params![
                r.farmer_name,
                r.location,
                r.crop_type,
                r.n,
                r.p,
                r.k,
                real_or_null(r.fertilizer),
                real_or_null(r.rainfall),
                real_or_null(r.yield_tons),
                r.note.as_deref().unwrap_or(""),
                id,
            ],
        )?;
        Ok(changed)
    }

    fn delete_by_key(&self, id: i64) -> Result<usize, StoreError> {
        let removed = self
            .conn
            .execute(&format!("DELETE FROM \"{}\" WHERE id = ?1", self.table), [id])?;
        Ok(removed)
    }

    fn create_with_next_id(&self, record: &ExternalRecord) -> Result<i64, StoreError> {
        let tx = self.begin()?;
        let existing: BTreeSet<i64> = self
            .query_ids(&tx, SortDirection::Ascending)?
            .into_iter()
            .collect();
        let id = ids::next_id(&existing);
        self.insert_with_id(&tx, id, record)?;
        tx.commit()?;
        Ok(id)
    }

    fn insert_batch_with_ids(
        &self,
        records: &[ExternalRecord],
        policy: IdPolicy,
    ) -> Result<Vec<i64>, StoreError> {
        let tx = self.begin()?;
        let existing: BTreeSet<i64> = self
            .query_ids(&tx, SortDirection::Ascending)?
            .into_iter()
            .collect();
        let assigned = ids::allocate_batch(&existing, records.len(), policy);
        for (id, r) in assigned.iter().zip(records) {
            self.insert_with_id(&tx, *id, r)?;
        }
        tx.commit()?;
        Ok(assigned)
    }
}
