//! Storage trait definitions

use crate::schema::{Row, Value, Warehouse};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Rows per batch when the caller has no preference
pub const DEFAULT_BATCH_SIZE: usize = 200;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Table '{table}' is not part of the {warehouse} warehouse")]
    UnknownTable { table: String, warehouse: Warehouse },

    #[error("Table '{table}' has no column '{column}'")]
    UnknownColumn { table: String, column: String },

    #[error("Row shaped for '{row_table}' cannot be written to '{table}'")]
    TableMismatch { table: String, row_table: String },

    #[error("Connection lock poisoned")]
    LockPoisoned,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Outcome of a batched insert
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertReport {
    /// Batches attempted
    pub batches: usize,
    /// Batches that hit a constraint and were retried row by row
    pub retried_batches: usize,
    pub inserted: usize,
    /// Rows rejected by a constraint during the row-by-row retry
    pub skipped: usize,
}

impl InsertReport {
    pub fn merge(&mut self, other: InsertReport) {
        self.batches += other.batches;
        self.retried_batches += other.retried_batches;
        self.inserted += other.inserted;
        self.skipped += other.skipped;
    }
}

/// Outcome of an update by primary key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated,
    NotFound,
    /// The patch would violate a constraint; the row is unchanged
    Rejected(String),
}

/// Outcome of a key-by-key delete
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteReport {
    pub deleted: usize,
    pub missing: usize,
    /// Keys whose delete violated a constraint
    pub failed: usize,
}

/// A relational store holding the tables of one warehouse
///
/// Tables are addressed by name and must belong to the store's warehouse.
/// Column names are checked against the table declaration before any
/// statement is built.
pub trait TableStore: Send + Sync {
    /// The warehouse whose tables this store holds
    fn warehouse(&self) -> Warehouse;

    // === Write Operations ===

    /// Insert rows in batches of `batch_size` (a size of 0 counts as 1).
    ///
    /// Each batch is attempted as one transaction. A batch rejected by a
    /// constraint is rolled back and retried row by row; rows that still
    /// violate a constraint are skipped and counted. Any other failure
    /// aborts the insert: batches committed before it stay committed.
    fn insert(
        &self,
        table: &str,
        rows: &mut dyn Iterator<Item = Row>,
        batch_size: usize,
    ) -> StorageResult<InsertReport>;

    /// Apply a partial update to the row with primary key `key`
    fn update(
        &self,
        table: &str,
        key: &Value,
        patch: &BTreeMap<String, Value>,
    ) -> StorageResult<UpdateOutcome>;

    /// Delete rows one key at a time, continuing past rejected keys
    fn delete(&self, table: &str, keys: &[Value]) -> StorageResult<DeleteReport>;

    /// Drop a table. Returns false when it did not exist.
    fn drop_table(&self, table: &str) -> StorageResult<bool>;

    // === Query Operations ===

    /// Rows whose `column` equals `value`, ordered by `column`
    fn query_equal(&self, table: &str, column: &str, value: &Value) -> StorageResult<Vec<Row>>;

    /// Rows whose `column` lies in `[lower, upper]`, ordered by `column`
    fn query_range(
        &self,
        table: &str,
        column: &str,
        lower: &Value,
        upper: &Value,
    ) -> StorageResult<Vec<Row>>;

    /// Every row of a table, in primary-key order
    fn query_all(&self, table: &str) -> StorageResult<Vec<Row>>;

    fn count(&self, table: &str) -> StorageResult<usize>;

    /// Primary keys of rows whose datetime `column` falls within `year`
    fn query_ids_for_year(&self, table: &str, column: &str, year: i32) -> StorageResult<Vec<Value>> {
        let (Some(first), Some(last)) = (
            NaiveDate::from_ymd_opt(year, 1, 1).and_then(|d| d.and_hms_opt(0, 0, 0)),
            NaiveDate::from_ymd_opt(year, 12, 31).and_then(|d| d.and_hms_opt(23, 59, 59)),
        ) else {
            return Ok(Vec::new());
        };
        let rows = self.query_range(table, column, &Value::DateTime(first), &Value::DateTime(last))?;
        Ok(rows.into_iter().map(|row| row.key().clone()).collect())
    }
}

/// Extension trait for opening stores from paths
pub trait OpenStore: TableStore + Sized {
    /// Open or create a store at the given path, creating missing tables
    fn open(path: impl AsRef<Path>, warehouse: Warehouse) -> StorageResult<Self>;

    /// Create an in-memory store (useful for testing)
    fn open_in_memory(warehouse: Warehouse) -> StorageResult<Self>;
}
