//! Table stores for warehouse data
//!
//! Warehouses are persisted through the `TableStore` trait.
//! The primary implementation is `SqliteTableStore`, one database per warehouse.

mod sqlite;
mod traits;

pub use sqlite::SqliteTableStore;
pub use traits::{
    DeleteReport, InsertReport, OpenStore, StorageError, StorageResult, TableStore, UpdateOutcome,
    DEFAULT_BATCH_SIZE,
};
