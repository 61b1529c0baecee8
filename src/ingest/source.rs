//! Decoded source files and their routing
//!
//! The binary record decoder runs outside this crate; what reaches the
//! orchestrator is a table of rows per file together with the file's
//! two-letter type code. `JsonLinesSource` reads such tables from a
//! directory of JSON Lines files, one object per row.

use super::coerce::DateEncoding;
use super::orchestrator::{IngestError, IngestResult};
use crate::schema::{tables, SourceRow, Value, Warehouse};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Record family of a source file, from its two-letter prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SourceKind {
    /// Admission summaries
    Rd,
    /// Professional service line items
    Sp,
    /// Rejected admissions
    Rj,
    /// Establishments
    St,
    /// Equipment
    Eq,
    /// Beds
    Lt,
    /// Professionals
    Pf,
    /// Specialized services
    Sr,
    /// Care teams
    Ep,
    /// Death certificates
    Do,
}

/// A date column and the digit layout its source uses
#[derive(Debug, Clone, Copy)]
pub struct DateRule {
    pub column: &'static str,
    pub encoding: DateEncoding,
}

const ADMISSION_DATES: &[DateRule] = &[
    DateRule { column: "NASC", encoding: DateEncoding::YearMonthDay },
    DateRule { column: "DT_INTER", encoding: DateEncoding::YearMonthDay },
    DateRule { column: "DT_SAIDA", encoding: DateEncoding::YearMonthDay },
];

const COMPETENCE_DATES: &[DateRule] =
    &[DateRule { column: "COMPET", encoding: DateEncoding::YearMonth }];

const MORTALITY_DATES: &[DateRule] = &[
    DateRule { column: "DTOBITO", encoding: DateEncoding::DayMonthYear },
    DateRule { column: "DTNASC", encoding: DateEncoding::DayMonthYear },
];

impl SourceKind {
    pub const ALL: [SourceKind; 10] = [
        SourceKind::Rd,
        SourceKind::Sp,
        SourceKind::Rj,
        SourceKind::St,
        SourceKind::Eq,
        SourceKind::Lt,
        SourceKind::Pf,
        SourceKind::Sr,
        SourceKind::Ep,
        SourceKind::Do,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            SourceKind::Rd => "RD",
            SourceKind::Sp => "SP",
            SourceKind::Rj => "RJ",
            SourceKind::St => "ST",
            SourceKind::Eq => "EQ",
            SourceKind::Lt => "LT",
            SourceKind::Pf => "PF",
            SourceKind::Sr => "SR",
            SourceKind::Ep => "EP",
            SourceKind::Do => "DO",
        }
    }

    pub fn warehouse(&self) -> Warehouse {
        match self {
            SourceKind::Rd | SourceKind::Sp | SourceKind::Rj => Warehouse::Admissions,
            SourceKind::Do => Warehouse::Mortality,
            _ => Warehouse::Establishments,
        }
    }

    /// Target tables, loaded in this order
    pub fn tables(&self) -> &'static [&'static str] {
        match self {
            SourceKind::Rd => &[tables::AIH_REDUZIDA],
            SourceKind::Sp => &[tables::SERVICOS_PROFISSIONAIS],
            SourceKind::Rj => &[tables::AIH_REJEITADA],
            SourceKind::St => &[tables::CNES, tables::ESTABELECIMENTOS_MES],
            SourceKind::Eq => &[tables::EQUIPAMENTOS_MES],
            SourceKind::Lt => &[tables::LEITOS_MES],
            SourceKind::Pf => &[tables::PROFISSIONAIS_MES],
            SourceKind::Sr => &[tables::SERVICOS_ESPECIALIZADOS_MES],
            SourceKind::Ep => &[tables::EQUIPES_MES],
            SourceKind::Do => &[tables::SIM],
        }
    }

    pub fn date_rules(&self) -> &'static [DateRule] {
        match self {
            SourceKind::Rd | SourceKind::Rj => ADMISSION_DATES,
            SourceKind::Sp => &[],
            SourceKind::Do => MORTALITY_DATES,
            _ => COMPETENCE_DATES,
        }
    }

    /// Kind of a file from the prefix of its name (`RDCE2001.dbc` is `RD`)
    pub fn from_file_name(name: &str) -> Option<Self> {
        let stem = Path::new(name).file_stem()?.to_str()?;
        stem.get(..2)?.parse().ok()
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for SourceKind {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_ascii_uppercase();
        SourceKind::ALL
            .into_iter()
            .find(|kind| kind.code() == code)
            .ok_or_else(|| IngestError::UnsupportedSource(s.to_string()))
    }
}

/// One decoded file: its rows plus what the orchestrator needs to route
/// and tag them
#[derive(Debug, Clone)]
pub struct DecodedFile {
    pub kind: SourceKind,
    pub file_name: String,
    pub rows: Vec<SourceRow>,
}

impl DecodedFile {
    pub fn new(kind: SourceKind, file_name: impl Into<String>, rows: Vec<SourceRow>) -> Self {
        Self { kind, file_name: file_name.into(), rows }
    }

    /// Provenance tag: the file's base name without extension
    pub fn provenance(&self) -> String {
        Path::new(&self.file_name)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.file_name.clone())
    }
}

/// Read one JSON Lines file into a decoded batch
pub fn read_json_lines(path: &Path, kind: SourceKind) -> IngestResult<DecodedFile> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let text = fs::read_to_string(path)?;

    let mut rows = Vec::new();
    for (index, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let object: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(line).map_err(|source| IngestError::Decode {
                file: file_name.clone(),
                line: index + 1,
                source,
            })?;
        rows.push(
            object
                .iter()
                .map(|(name, cell)| (name.clone(), Value::from_json(cell)))
                .collect(),
        );
    }
    debug!(file = %file_name, rows = rows.len(), "decoded");
    Ok(DecodedFile::new(kind, file_name, rows))
}

/// Decoded files found under a directory, in path order
pub struct JsonLinesSource {
    pending: std::vec::IntoIter<(PathBuf, SourceKind)>,
}

impl JsonLinesSource {
    /// Collect files with `extension` under `root` whose name prefix is a
    /// known type code, optionally keeping only `only`.
    pub fn scan(root: impl AsRef<Path>, extension: &str, only: Option<SourceKind>) -> Self {
        let mut found = Vec::new();
        for entry in WalkDir::new(root.as_ref()).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(error = %err, "skipping unreadable path");
                    continue;
                }
            };
            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().and_then(|e| e.to_str()) != Some(extension)
            {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            match SourceKind::from_file_name(&name) {
                Some(kind) if only.map_or(true, |wanted| wanted == kind) => {
                    found.push((path.to_path_buf(), kind))
                }
                Some(_) => {}
                None => warn!(file = %name, "no known type code in file name"),
            }
        }
        Self { pending: found.into_iter() }
    }

    /// Keep only the files that load into `warehouse`
    pub fn for_warehouse(self, warehouse: Warehouse) -> Self {
        let kept: Vec<_> = self.pending.filter(|(_, kind)| kind.warehouse() == warehouse).collect();
        Self { pending: kept.into_iter() }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.len() == 0
    }
}

impl Iterator for JsonLinesSource {
    type Item = IngestResult<DecodedFile>;

    fn next(&mut self) -> Option<Self::Item> {
        let (path, kind) = self.pending.next()?;
        Some(read_json_lines(&path, kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn kinds_route_to_their_warehouse_tables() {
        for kind in SourceKind::ALL {
            let warehouse = kind.warehouse();
            for table in kind.tables() {
                assert!(warehouse.table(table).is_some(), "{} -> {}", kind, table);
            }
            for rule in kind.date_rules() {
                assert!(
                    kind.tables()
                        .iter()
                        .any(|t| warehouse.table(t).and_then(|t| t.field(rule.column)).is_some()),
                    "{} has no column {}",
                    kind,
                    rule.column
                );
            }
        }
    }

    #[test]
    fn kind_from_file_name() {
        assert_eq!(SourceKind::from_file_name("RDCE2001.jsonl"), Some(SourceKind::Rd));
        assert_eq!(SourceKind::from_file_name("doce2019.jsonl"), Some(SourceKind::Do));
        assert_eq!(SourceKind::from_file_name("XX.jsonl"), None);
        assert!(matches!(
            "ZZ".parse::<SourceKind>(),
            Err(IngestError::UnsupportedSource(_))
        ));
    }

    #[test]
    fn provenance_is_the_file_stem() {
        let file = DecodedFile::new(SourceKind::Sp, "SPCE2001.dbc", Vec::new());
        assert_eq!(file.provenance(), "SPCE2001");
    }

    #[test]
    fn scans_and_decodes_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let mut rd = fs::File::create(dir.path().join("RDCE2001.jsonl")).unwrap();
        writeln!(rd, r#"{{"N_AIH": "1", "VAL_TOT": 10.5}}"#).unwrap();
        writeln!(rd).unwrap();
        writeln!(rd, r#"{{"N_AIH": "2", "VAL_TOT": null}}"#).unwrap();
        fs::write(dir.path().join("SPCE2001.jsonl"), "{\"SP_NAIH\": \"1\"}\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let source = JsonLinesSource::scan(dir.path(), "jsonl", None);
        assert_eq!(source.len(), 2);
        let files: Vec<_> = source.map(|f| f.unwrap()).collect();
        assert_eq!(files[0].kind, SourceKind::Rd);
        assert_eq!(files[0].rows.len(), 2);
        assert_eq!(files[0].rows[0].get("VAL_TOT"), Some(&Value::Decimal(10.5)));
        assert_eq!(files[0].rows[1].get("VAL_TOT"), Some(&Value::Null));

        let only_sp = JsonLinesSource::scan(dir.path(), "jsonl", Some(SourceKind::Sp));
        assert_eq!(only_sp.len(), 1);

        let registry = JsonLinesSource::scan(dir.path(), "jsonl", None)
            .for_warehouse(Warehouse::Establishments);
        assert!(registry.is_empty());
    }

    #[test]
    fn malformed_line_reports_its_position() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("DOCE2019.jsonl");
        fs::write(&path, "{\"a\": 1}\nnot json\n").unwrap();

        let err = read_json_lines(&path, SourceKind::Do).unwrap_err();
        assert!(matches!(err, IngestError::Decode { line: 2, .. }));
    }
}
