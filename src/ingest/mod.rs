//! Ingestion of decoded source files into warehouse stores

mod coerce;
mod orchestrator;
mod source;

pub use coerce::DateEncoding;
pub use orchestrator::{
    FileFailure, FileReport, FileStage, IngestError, IngestResult, Ingestor, RunReport, TableLoad,
};
pub use source::{read_json_lines, DateRule, DecodedFile, JsonLinesSource, SourceKind};
