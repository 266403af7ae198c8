use crate::metrics::{self, DerivedRecord};
use crate::schema;
use crate::store::{RecordStore, StoreError};
use std::sync::Arc;
use tracing::debug;

/// Derived view of the record store. Only `reload` replaces the snapshot.
#[derive(Debug, Clone)]
pub struct Dataset {
    records: Arc<[DerivedRecord]>,
}

impl Default for Dataset {
    fn default() -> Self {
        Self {
            records: Arc::from(Vec::new()),
        }
    }
}

impl Dataset {
    pub fn snapshot(&self) -> Arc<[DerivedRecord]> {
        Arc::clone(&self.records)
    }

    /// Store order (ascending id).
    pub fn records(&self) -> &[DerivedRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: i64) -> Option<&DerivedRecord> {
        self.records.iter().find(|r| r.record.id == id)
    }

    #[cfg(test)]
    pub fn ids(&self) -> Vec<i64> {
        self.records.iter().map(|r| r.record.id).collect()
    }

    /// Newest first, the order the data table shows.
    pub fn table_rows(&self) -> Vec<DerivedRecord> {
        self.records.iter().rev().cloned().collect()
    }

    /// Reads every record and swaps in a freshly derived snapshot. On error
    /// the current snapshot is kept.
    pub fn reload<S: RecordStore + ?Sized>(&mut self, store: &S) -> Result<usize, StoreError> {
        let derived: Vec<DerivedRecord> = store
            .select_all()?
            .into_iter()
            .map(schema::to_internal)
            .map(metrics::derive)
            .collect();
        self.records = Arc::from(derived);
        debug!(count = self.records.len(), "dataset reloaded");
        Ok(self.records.len())
    }
}
