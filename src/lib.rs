//! OpenSUS: health-record warehouses and flow networks
//!
//! Loads decoded Brazilian public-health files (hospital admissions,
//! establishment registries, death certificates) into relational
//! warehouses, then aggregates admissions into patient-flow networks
//! between municipalities, facilities, diagnoses, procedures and equipment.
//!
//! # Core Concepts
//!
//! - **Logical tables**: typed relational layouts, grouped into warehouses
//! - **Table store**: batched, conflict-tolerant inserts that skip duplicate keys
//! - **Flows**: (origin, destination) aggregates over a window of admissions
//! - **Networks**: graphs over densely labeled reference nodes
//!
//! # Example
//!
//! ```
//! use opensus::{OpenStore, SqliteTableStore, TableStore, Warehouse};
//!
//! let store = SqliteTableStore::open_in_memory(Warehouse::Admissions).unwrap();
//! assert_eq!(store.count("aih_reduzida").unwrap(), 0);
//! ```

pub mod config;
pub mod flow;
pub mod ingest;
pub mod network;
pub mod reference;
pub mod schema;
pub mod storage;

pub use config::{ConfigError, RunConfig, SourceConfig, StratifyMode};
pub use flow::{
    AggregateEdge, FlowAggregator, FlowError, FlowKind, FlowOptions, FlowResult, FlowSet, Measure,
    NodeKind, Stratification, Window,
};
pub use ingest::{DecodedFile, IngestError, Ingestor, JsonLinesSource, RunReport, SourceKind};
pub use network::{AttrValue, FlowGraph, NetworkBuilder, NetworkError, NetworkResult};
pub use reference::{FacilityTable, LocationTable, NodeLabel, References};
pub use schema::{LogicalTable, Row, Value, Warehouse};
pub use storage::{
    InsertReport, OpenStore, SqliteTableStore, StorageError, StorageResult, TableStore,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
