//! Per-file load pipeline
//!
//! Every file walks the same stages for each of its target tables:
//! optional columns it lacks are backfilled with nulls, rows are mapped
//! onto the table's columns, date columns are decoded, rows are tagged
//! with provenance (and a synthetic key where the table has no natural
//! one), and the typed rows are handed to the table store. A file that
//! fails along the way is skipped and reported; storage failures stop the
//! whole run.

use super::source::{DecodedFile, SourceKind};
use crate::schema::{
    backfill_columns, into_row, map_columns, KeyPolicy, LogicalTable, MappingError, MappingResult,
    SourceRow, Value, Warehouse,
};
use crate::storage::{InsertReport, StorageError, TableStore, DEFAULT_BATCH_SIZE};
use std::fmt;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Unsupported source type '{0}'")]
    UnsupportedSource(String),

    #[error("{kind} files load into the {expected} warehouse, but the store holds {actual}")]
    WarehouseMismatch {
        kind: SourceKind,
        expected: Warehouse,
        actual: Warehouse,
    },

    #[error("Mapping error: {0}")]
    Mapping(#[from] MappingError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed row in {file} at line {line}: {source}")]
    Decode {
        file: String,
        line: usize,
        source: serde_json::Error,
    },
}

impl IngestError {
    /// Errors that end the run instead of skipping one file
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            IngestError::UnsupportedSource(_)
                | IngestError::WarehouseMismatch { .. }
                | IngestError::Storage(_)
        )
    }
}

pub type IngestResult<T> = Result<T, IngestError>;

/// Last stage a file reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FileStage {
    Decoded,
    ColumnBackfilled,
    Mapped,
    DateCoerced,
    Tagged,
    Inserted,
}

impl fmt::Display for FileStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FileStage::Decoded => "decoded",
            FileStage::ColumnBackfilled => "column-backfilled",
            FileStage::Mapped => "mapped",
            FileStage::DateCoerced => "date-coerced",
            FileStage::Tagged => "tagged",
            FileStage::Inserted => "inserted",
        };
        f.write_str(name)
    }
}

/// Rows one file contributed to one table
#[derive(Debug, Clone)]
pub struct TableLoad {
    pub table: &'static str,
    /// Optional columns the file did not carry
    pub backfilled: Vec<&'static str>,
    pub insert: InsertReport,
}

#[derive(Debug, Clone)]
pub struct FileReport {
    pub file: String,
    pub kind: SourceKind,
    pub rows: usize,
    pub tables: Vec<TableLoad>,
}

#[derive(Debug)]
pub struct FileFailure {
    pub file: String,
    pub stage: FileStage,
    pub error: IngestError,
}

/// Outcome of a multi-file run
#[derive(Debug, Default)]
pub struct RunReport {
    pub loaded: Vec<FileReport>,
    pub skipped: Vec<FileFailure>,
}

impl RunReport {
    pub fn rows_inserted(&self) -> usize {
        self.loaded
            .iter()
            .flat_map(|f| f.tables.iter())
            .map(|t| t.insert.inserted)
            .sum()
    }
}

/// Loads decoded files into a warehouse store
pub struct Ingestor<'s> {
    store: &'s dyn TableStore,
    batch_size: usize,
}

impl<'s> Ingestor<'s> {
    pub fn new(store: &'s dyn TableStore) -> Self {
        Self { store, batch_size: DEFAULT_BATCH_SIZE }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Load one file; on failure report the stage it reached
    pub fn ingest_file(&self, file: DecodedFile) -> Result<FileReport, FileFailure> {
        let mut stage = FileStage::Decoded;
        self.load(&file, &mut stage).map_err(|error| FileFailure {
            file: file.file_name.clone(),
            stage,
            error,
        })
    }

    /// Load every file, skipping the ones that fail on their own data.
    ///
    /// Fatal errors (see [`IngestError::is_fatal`]) abort the run.
    pub fn ingest_all<I>(&self, files: I) -> IngestResult<RunReport>
    where
        I: IntoIterator<Item = IngestResult<DecodedFile>>,
    {
        let mut report = RunReport::default();
        for file in files {
            let outcome = match file {
                Ok(file) => self.ingest_file(file),
                Err(error) => Err(FileFailure {
                    file: match &error {
                        IngestError::Decode { file, .. } => file.clone(),
                        _ => String::new(),
                    },
                    stage: FileStage::Decoded,
                    error,
                }),
            };
            match outcome {
                Ok(loaded) => report.loaded.push(loaded),
                Err(failure) if failure.error.is_fatal() => return Err(failure.error),
                Err(failure) => {
                    warn!(
                        file = %failure.file,
                        stage = %failure.stage,
                        error = %failure.error,
                        "file skipped"
                    );
                    report.skipped.push(failure);
                }
            }
        }
        Ok(report)
    }

    fn load(&self, file: &DecodedFile, stage: &mut FileStage) -> IngestResult<FileReport> {
        let warehouse = self.store.warehouse();
        if file.kind.warehouse() != warehouse {
            return Err(IngestError::WarehouseMismatch {
                kind: file.kind,
                expected: file.kind.warehouse(),
                actual: warehouse,
            });
        }

        let provenance = file.provenance();
        let mut report = FileReport {
            file: file.file_name.clone(),
            kind: file.kind,
            rows: file.rows.len(),
            tables: Vec::new(),
        };

        for name in file.kind.tables() {
            let table = warehouse.require_table(name)?;

            let mut raw = file.rows.clone();
            let backfilled = backfill_columns(&mut raw, table);
            *stage = FileStage::ColumnBackfilled;

            let mut mapped = raw
                .iter()
                .map(|row| map_columns(table, row))
                .collect::<MappingResult<Vec<_>>>()?;
            *stage = FileStage::Mapped;

            for rule in file.kind.date_rules() {
                if table.field(rule.column).is_none() {
                    continue;
                }
                for row in &mut mapped {
                    if let Some(cell) = row.get_mut(rule.column) {
                        *cell = rule.encoding.coerce(cell);
                    }
                }
            }
            *stage = FileStage::DateCoerced;

            tag_rows(table, &provenance, &raw, &mut mapped);
            *stage = FileStage::Tagged;

            let mut rows = mapped.into_iter().map(|row| into_row(table, row));
            let insert = self.store.insert(table.name, &mut rows, self.batch_size)?;
            info!(
                file = %file.file_name,
                table = table.name,
                inserted = insert.inserted,
                skipped = insert.skipped,
                "table loaded"
            );
            report.tables.push(TableLoad { table: table.name, backfilled, insert });
        }

        *stage = FileStage::Inserted;
        Ok(report)
    }
}

/// Attach the provenance tag and, for tables without a natural key, the
/// `{counter}{provenance}` key. `raw` and `mapped` are parallel.
fn tag_rows(table: &LogicalTable, provenance: &str, raw: &[SourceRow], mapped: &mut [SourceRow]) {
    for (index, (source, row)) in raw.iter().zip(mapped.iter_mut()).enumerate() {
        row.insert(table.provenance.to_string(), Value::text(provenance));

        if let KeyPolicy::CounterWithProvenance { counter_column } = &table.key_policy {
            let counter = counter_column
                .and_then(|column| {
                    table
                        .mapping
                        .sources_of(column)
                        .find_map(|name| source.get(name))
                        .and_then(Value::key_fragment)
                })
                .unwrap_or_else(|| (index + 1).to_string());
            row.insert(
                table.primary_key.to_string(),
                Value::Text(format!("{}{}", counter, provenance)),
            );
        }
    }
}
