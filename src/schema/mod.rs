//! Schema registry and source mapping
//!
//! Declares the relational layout of every record family, groups the
//! tables into warehouses, and converts loosely typed source rows into
//! rows the table store accepts.

pub mod mapping;
pub mod tables;
mod types;
mod warehouse;

pub use mapping::{
    backfill_columns, into_row, map_columns, ColumnMapping, MappingError, MappingResult, SourceRow,
};
pub use types::{
    parse_iso_datetime, FieldSpec, FieldType, ForeignKey, KeyPolicy, LogicalTable, Row,
    SchemaError, Value, DATETIME_FORMAT,
};
pub use warehouse::Warehouse;
