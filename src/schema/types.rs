//! Column types, cell values, table declarations and schema-bound rows

use super::mapping::ColumnMapping;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// Text layout used when datetime cells are persisted or compared.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Errors raised while validating a table declaration
#[derive(Debug, Error, PartialEq)]
pub enum SchemaError {
    #[error("table '{0}' declares no field for its primary key")]
    MissingPrimaryKey(String),

    #[error("table '{table}' declares field '{field}' twice")]
    DuplicateField { table: String, field: String },

    #[error("table '{table}' references undeclared column '{column}'")]
    UndeclaredColumn { table: String, column: String },
}

/// Semantic type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FieldType {
    /// Text, optionally with a declared width (advisory, as in SQLite)
    String { len: Option<u16> },
    Integer,
    Decimal { precision: u8, scale: u8 },
    DateTime,
    Boolean,
}

impl FieldType {
    /// Column type used in generated DDL
    pub fn sql_type(&self) -> String {
        match self {
            FieldType::String { len: Some(len) } => format!("VARCHAR({})", len),
            FieldType::String { len: None } => "TEXT".to_string(),
            FieldType::Integer => "INTEGER".to_string(),
            FieldType::Decimal { precision, scale } => format!("NUMERIC({}, {})", precision, scale),
            FieldType::DateTime => "DATETIME".to_string(),
            FieldType::Boolean => "BOOLEAN".to_string(),
        }
    }

    /// Convert a loosely typed value into this type.
    ///
    /// Unconvertible values become `Value::Null`; conversion never fails.
    pub fn coerce(&self, value: Value) -> Value {
        let value = value.normalized();
        match (self, value) {
            (_, Value::Null) => Value::Null,

            (FieldType::String { .. }, Value::Text(s)) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    Value::Null
                } else if trimmed.len() == s.len() {
                    Value::Text(s)
                } else {
                    Value::Text(trimmed.to_string())
                }
            }
            (FieldType::String { .. }, Value::Integer(i)) => Value::Text(i.to_string()),
            (FieldType::String { .. }, Value::Decimal(f)) => Value::Text(format_number(f)),
            (FieldType::String { .. }, Value::DateTime(dt)) => {
                Value::Text(dt.format(DATETIME_FORMAT).to_string())
            }
            (FieldType::String { .. }, Value::Boolean(b)) => {
                Value::Text(if b { "1" } else { "0" }.to_string())
            }

            (FieldType::Integer, Value::Integer(i)) => Value::Integer(i),
            (FieldType::Integer, Value::Decimal(f)) => Value::Integer(f.round() as i64),
            (FieldType::Integer, Value::Boolean(b)) => Value::Integer(i64::from(b)),
            (FieldType::Integer, Value::Text(s)) => parse_integer(&s).map_or(Value::Null, Value::Integer),

            (FieldType::Decimal { .. }, Value::Decimal(f)) => Value::Decimal(f),
            (FieldType::Decimal { .. }, Value::Integer(i)) => Value::Decimal(i as f64),
            (FieldType::Decimal { .. }, Value::Text(s)) => parse_decimal(&s).map_or(Value::Null, Value::Decimal),

            (FieldType::DateTime, Value::DateTime(dt)) => Value::DateTime(dt),
            (FieldType::DateTime, Value::Text(s)) => parse_iso_datetime(&s).map_or(Value::Null, Value::DateTime),

            (FieldType::Boolean, Value::Boolean(b)) => Value::Boolean(b),
            (FieldType::Boolean, Value::Integer(i)) => match i {
                0 => Value::Boolean(false),
                1 => Value::Boolean(true),
                _ => Value::Null,
            },
            (FieldType::Boolean, Value::Text(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "s" | "y" => Value::Boolean(true),
                "0" | "false" | "n" => Value::Boolean(false),
                _ => Value::Null,
            },

            _ => Value::Null,
        }
    }
}

fn format_number(f: f64) -> String {
    if f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        f.to_string()
    }
}

fn parse_integer(s: &str) -> Option<i64> {
    let s = s.trim();
    s.parse::<i64>()
        .ok()
        .or_else(|| parse_decimal(s).map(|f| f.round() as i64))
}

fn parse_decimal(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    s.replace(',', ".").parse::<f64>().ok().filter(|f| f.is_finite())
}

/// Parse the ISO layouts accepted for already-decoded datetime text.
pub fn parse_iso_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// A single cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Decimal(f64),
    DateTime(NaiveDateTime),
    Text(String),
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Replace missing-value markers with `Null`.
    ///
    /// Non-finite decimals and the literal text `nan` (how missing cells
    /// come out of tabular exports) are both missing.
    pub fn normalized(self) -> Self {
        match self {
            Value::Decimal(f) if !f.is_finite() => Value::Null,
            Value::Text(ref s) if s.trim().eq_ignore_ascii_case("nan") => Value::Null,
            other => other,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Decimal(f) => Some(f.round() as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Decimal(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Value::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }

    /// Text rendering used when a cell feeds a composite key.
    pub fn key_fragment(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Text(s) => Some(s.trim().to_string()),
            Value::Integer(i) => Some(i.to_string()),
            Value::Decimal(f) => Some(format_number(*f)),
            Value::DateTime(dt) => Some(dt.format(DATETIME_FORMAT).to_string()),
            Value::Boolean(b) => Some(b.to_string()),
        }
    }

    /// Convert a decoded JSON cell.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => n.as_f64().map_or(Value::Null, Value::Decimal),
            },
            serde_json::Value::String(s) => Value::Text(s.clone()),
            other => Value::Text(other.to_string()),
        }
        .normalized()
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Decimal(f).normalized()
    }
}

impl From<NaiveDateTime> for Value {
    fn from(dt: NaiveDateTime) -> Self {
        Value::DateTime(dt)
    }
}

/// Declaration of one column
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub ty: FieldType,
    pub nullable: bool,
}

impl FieldSpec {
    pub fn string(name: &'static str, len: u16) -> Self {
        Self { name, ty: FieldType::String { len: Some(len) }, nullable: true }
    }

    pub fn text(name: &'static str) -> Self {
        Self { name, ty: FieldType::String { len: None }, nullable: true }
    }

    pub fn integer(name: &'static str) -> Self {
        Self { name, ty: FieldType::Integer, nullable: true }
    }

    pub fn decimal(name: &'static str, precision: u8, scale: u8) -> Self {
        Self { name, ty: FieldType::Decimal { precision, scale }, nullable: true }
    }

    pub fn datetime(name: &'static str) -> Self {
        Self { name, ty: FieldType::DateTime, nullable: true }
    }

    pub fn required(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// Reference from a column to another table's column
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKey {
    pub column: &'static str,
    pub references_table: &'static str,
    pub references_column: &'static str,
}

/// How the primary-key value of a row is obtained
#[derive(Debug, Clone, PartialEq)]
pub enum KeyPolicy {
    /// The key column comes straight from the source file
    Natural,
    /// The key is `{counter}{provenance}`. The counter is read from the
    /// source column `counter_column` (resolved through the table's column
    /// mapping) when the file carries it, otherwise it is the 1-based row
    /// position within the file.
    CounterWithProvenance { counter_column: Option<&'static str> },
}

/// A named relational schema
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalTable {
    pub name: &'static str,
    pub fields: Vec<FieldSpec>,
    pub primary_key: &'static str,
    pub foreign_keys: Vec<ForeignKey>,
    /// Column receiving the provenance tag
    pub provenance: &'static str,
    pub key_policy: KeyPolicy,
    pub mapping: ColumnMapping,
}

impl LogicalTable {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn column_names(&self) -> Vec<&'static str> {
        self.fields.iter().map(|f| f.name).collect()
    }

    pub fn primary_key_field(&self) -> Option<&FieldSpec> {
        self.field(self.primary_key)
    }

    /// Columns filled at ingestion time rather than read from the source
    pub fn is_generated(&self, name: &str) -> bool {
        name == self.provenance
            || (name == self.primary_key
                && matches!(self.key_policy, KeyPolicy::CounterWithProvenance { .. }))
    }

    /// Columns the source file itself must be able to supply
    pub fn is_required_from_source(&self, field: &FieldSpec) -> bool {
        !field.nullable && !self.is_generated(field.name)
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        let mut seen = HashSet::new();
        for field in &self.fields {
            if !seen.insert(field.name) {
                return Err(SchemaError::DuplicateField {
                    table: self.name.to_string(),
                    field: field.name.to_string(),
                });
            }
        }
        if self.primary_key_field().is_none() {
            return Err(SchemaError::MissingPrimaryKey(self.name.to_string()));
        }
        let mut referenced: Vec<&str> = vec![self.provenance];
        referenced.extend(self.foreign_keys.iter().map(|fk| fk.column));
        for column in referenced {
            if self.field(column).is_none() {
                return Err(SchemaError::UndeclaredColumn {
                    table: self.name.to_string(),
                    column: column.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// A row validated against a [`LogicalTable`]: one value per declared
/// field, in declaration order, each already of the field's type.
#[derive(Debug, Clone)]
pub struct Row {
    table: &'static LogicalTable,
    values: Vec<Value>,
}

impl Row {
    /// Build a row from values already typed for `table` (storage reads).
    pub(crate) fn from_typed(table: &'static LogicalTable, values: Vec<Value>) -> Self {
        debug_assert_eq!(table.fields.len(), values.len());
        Self { table, values }
    }

    pub fn table(&self) -> &'static LogicalTable {
        self.table
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.table.position(column).map(|i| &self.values[i])
    }

    pub fn text(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(Value::as_str)
    }

    pub fn integer(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(Value::as_i64)
    }

    pub fn decimal(&self, column: &str) -> Option<f64> {
        self.get(column).and_then(Value::as_f64)
    }

    pub fn datetime(&self, column: &str) -> Option<NaiveDateTime> {
        self.get(column).and_then(Value::as_datetime)
    }

    pub fn key(&self) -> &Value {
        self.get(self.table.primary_key).unwrap_or(&Value::Null)
    }
}

impl PartialEq for Row {
    fn eq(&self, other: &Self) -> bool {
        self.table.name == other.table.name && self.values == other.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nan_markers_normalize_to_null() {
        assert_eq!(Value::Decimal(f64::NAN).normalized(), Value::Null);
        assert_eq!(Value::text("NaN").normalized(), Value::Null);
        assert_eq!(Value::text("nan ").normalized(), Value::Null);
        assert_eq!(Value::text("banana").normalized(), Value::text("banana"));
    }

    #[test]
    fn string_coercion_trims_padding_and_blanks() {
        let ty = FieldType::String { len: Some(6) };
        assert_eq!(ty.coerce(Value::text("230440  ")), Value::text("230440"));
        assert_eq!(ty.coerce(Value::text("   ")), Value::Null);
        assert_eq!(ty.coerce(Value::Integer(230440)), Value::text("230440"));
        assert_eq!(ty.coerce(Value::Decimal(12.0)), Value::text("12"));
    }

    #[test]
    fn numeric_coercion_is_lenient() {
        let dec = FieldType::Decimal { precision: 14, scale: 2 };
        assert_eq!(dec.coerce(Value::text("1234,50")), Value::Decimal(1234.5));
        assert_eq!(dec.coerce(Value::text("abc")), Value::Null);
        assert_eq!(FieldType::Integer.coerce(Value::text(" 42 ")), Value::Integer(42));
        assert_eq!(FieldType::Integer.coerce(Value::text("3.0")), Value::Integer(3));
    }

    #[test]
    fn datetime_coercion_accepts_iso_text() {
        let dt = NaiveDate::from_ymd_opt(2020, 1, 31).unwrap().and_hms_opt(0, 0, 0).unwrap();
        assert_eq!(FieldType::DateTime.coerce(Value::text("2020-01-31")), Value::DateTime(dt));
        assert_eq!(
            FieldType::DateTime.coerce(Value::text("2020-01-31 00:00:00")),
            Value::DateTime(dt)
        );
        assert_eq!(FieldType::DateTime.coerce(Value::text("31/01/2020")), Value::Null);
    }

    #[test]
    fn json_cells_convert() {
        assert_eq!(Value::from_json(&serde_json::json!(null)), Value::Null);
        assert_eq!(Value::from_json(&serde_json::json!(7)), Value::Integer(7));
        assert_eq!(Value::from_json(&serde_json::json!(1.5)), Value::Decimal(1.5));
        assert_eq!(Value::from_json(&serde_json::json!("nan")), Value::Null);
    }

    #[test]
    fn sql_types_follow_declarations() {
        assert_eq!(FieldType::String { len: Some(13) }.sql_type(), "VARCHAR(13)");
        assert_eq!(FieldType::Decimal { precision: 14, scale: 2 }.sql_type(), "NUMERIC(14, 2)");
    }
}
