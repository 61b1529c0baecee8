//! Source-to-schema column mapping
//!
//! Decoded source files name their columns however the publishing agency
//! did that year. A [`ColumnMapping`] renames source columns onto the
//! canonical names of a [`LogicalTable`]; [`map_columns`] restricts a row
//! to the schema's columns, and [`into_row`] performs the typed validation
//! that produces a storable [`Row`].

use super::types::{LogicalTable, Row, Value};
use std::collections::BTreeMap;
use thiserror::Error;

/// A decoded source row: column name to cell value
pub type SourceRow = BTreeMap<String, Value>;

#[derive(Debug, Error, PartialEq)]
pub enum MappingError {
    #[error("table '{table}' cannot resolve required column '{column}'")]
    MissingColumn { table: String, column: String },

    #[error("table '{0}' is not declared")]
    UnknownTable(String),
}

pub type MappingResult<T> = Result<T, MappingError>;

/// Renames from source column names to canonical column names.
///
/// Names without an entry map to themselves.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnMapping {
    renames: BTreeMap<String, &'static str>,
}

impl ColumnMapping {
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn with_rename(mut self, source: &str, canonical: &'static str) -> Self {
        self.renames.insert(source.to_string(), canonical);
        self
    }

    pub fn canonical<'a>(&'a self, source: &'a str) -> &'a str {
        self.renames.get(source).copied().unwrap_or(source)
    }

    /// Source names that resolve to `canonical`, the identity name included
    pub fn sources_of<'a>(&'a self, canonical: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        std::iter::once(canonical).chain(
            self.renames
                .iter()
                .filter(move |(_, c)| **c == canonical)
                .map(|(s, _)| s.as_str()),
        )
    }

    pub fn is_identity(&self) -> bool {
        self.renames.is_empty()
    }
}

/// Rename and restrict one source row to the columns of `table`.
///
/// Unknown source columns are dropped. Optional and generated columns the
/// source cannot supply become `Null`; a required column that cannot be
/// resolved is an error. Missing-value markers are normalized to `Null`.
pub fn map_columns(table: &LogicalTable, source: &SourceRow) -> MappingResult<SourceRow> {
    let mut mapped = SourceRow::new();
    for (name, value) in source {
        let canonical = table.mapping.canonical(name);
        if table.field(canonical).is_none() {
            continue;
        }
        let value = value.clone().normalized();
        match mapped.get(canonical) {
            Some(existing) if !existing.is_null() => {}
            _ => {
                mapped.insert(canonical.to_string(), value);
            }
        }
    }

    for field in &table.fields {
        if mapped.contains_key(field.name) {
            continue;
        }
        if table.is_required_from_source(field) {
            return Err(MappingError::MissingColumn {
                table: table.name.to_string(),
                column: field.name.to_string(),
            });
        }
        mapped.insert(field.name.to_string(), Value::Null);
    }
    Ok(mapped)
}

/// Add every optional column of `table` that no row in the batch carries
/// (under its canonical name or a mapped alias) with `Null` values.
///
/// Returns the canonical names that were backfilled.
pub fn backfill_columns(rows: &mut [SourceRow], table: &LogicalTable) -> Vec<&'static str> {
    let missing: Vec<&'static str> = table
        .fields
        .iter()
        .filter(|f| f.nullable && !table.is_generated(f.name))
        .filter(|f| {
            !rows.iter().any(|row| {
                table
                    .mapping
                    .sources_of(f.name)
                    .any(|source| row.contains_key(source))
            })
        })
        .map(|f| f.name)
        .collect();

    for row in rows.iter_mut() {
        for name in &missing {
            row.insert(name.to_string(), Value::Null);
        }
    }
    missing
}

/// Typed validation: coerce every declared column of a mapped row to its
/// field type, in declaration order.
pub fn into_row(table: &'static LogicalTable, mut mapped: SourceRow) -> Row {
    let values = table
        .fields
        .iter()
        .map(|field| {
            let raw = mapped.remove(field.name).unwrap_or(Value::Null);
            field.ty.coerce(raw)
        })
        .collect();
    Row::from_typed(table, values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::{FieldSpec, KeyPolicy};
    use std::sync::OnceLock;

    fn sample_table() -> &'static LogicalTable {
        static TABLE: OnceLock<LogicalTable> = OnceLock::new();
        TABLE.get_or_init(|| LogicalTable {
            name: "sample",
            fields: vec![
                FieldSpec::string("ID", 10).required(),
                FieldSpec::string("CODE", 6).required(),
                FieldSpec::integer("C1"),
                FieldSpec::decimal("C2", 14, 2),
                FieldSpec::string("FONTE", 30),
            ],
            primary_key: "ID",
            foreign_keys: Vec::new(),
            provenance: "FONTE",
            key_policy: KeyPolicy::Natural,
            mapping: ColumnMapping::identity().with_rename("codigo", "CODE"),
        })
    }

    fn source(pairs: &[(&str, Value)]) -> SourceRow {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn renames_and_drops_unknown_columns() {
        let row = source(&[
            ("ID", Value::text("1")),
            ("codigo", Value::text("X")),
            ("EXTRA", Value::Integer(9)),
        ]);
        let mapped = map_columns(sample_table(), &row).unwrap();
        assert_eq!(mapped.get("CODE"), Some(&Value::text("X")));
        assert!(!mapped.contains_key("EXTRA"));
        assert!(!mapped.contains_key("codigo"));
        assert_eq!(mapped.get("C1"), Some(&Value::Null));
        assert_eq!(mapped.len(), 5);
    }

    #[test]
    fn missing_required_column_is_an_error() {
        let row = source(&[("ID", Value::text("1"))]);
        let err = map_columns(sample_table(), &row).unwrap_err();
        assert_eq!(
            err,
            MappingError::MissingColumn { table: "sample".into(), column: "CODE".into() }
        );
    }

    #[test]
    fn backfill_adds_absent_optional_columns_only() {
        let mut rows = vec![source(&[
            ("ID", Value::text("1")),
            ("codigo", Value::text("X")),
            ("C2", Value::Decimal(3.5)),
        ])];
        let filled = backfill_columns(&mut rows, sample_table());
        assert_eq!(filled, vec!["C1"]);
        assert_eq!(rows[0].get("C1"), Some(&Value::Null));
        assert!(!rows[0].contains_key("CODE"));
        assert!(!rows[0].contains_key("FONTE"));
    }

    #[test]
    fn backfilled_batch_maps_present_values_and_nulls() {
        let mut rows = vec![source(&[("ID", Value::text("7")), ("CODE", Value::text("Y"))])];
        backfill_columns(&mut rows, sample_table());
        let mapped = map_columns(sample_table(), &rows[0]).unwrap();
        let row = into_row(sample_table(), mapped);
        assert_eq!(row.text("ID"), Some("7"));
        assert_eq!(row.get("C1"), Some(&Value::Null));
        assert_eq!(row.get("C2"), Some(&Value::Null));
    }

    #[test]
    fn into_row_coerces_in_declaration_order() {
        let mapped = source(&[
            ("ID", Value::Integer(15)),
            ("CODE", Value::text("A ")),
            ("C1", Value::text("4")),
            ("C2", Value::text("nan")),
            ("FONTE", Value::Null),
        ]);
        let row = into_row(sample_table(), mapped);
        assert_eq!(
            row.values(),
            &[
                Value::text("15"),
                Value::text("A"),
                Value::Integer(4),
                Value::Null,
                Value::Null
            ]
        );
        assert_eq!(row.key(), &Value::text("15"));
    }
}
