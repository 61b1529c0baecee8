//! SQLite storage backend

use super::traits::{
    DeleteReport, InsertReport, OpenStore, StorageError, StorageResult, TableStore, UpdateOutcome,
};
use crate::schema::{FieldSpec, FieldType, LogicalTable, Row, Value, Warehouse, DATETIME_FORMAT};
use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue, ValueRef};
use rusqlite::{params, params_from_iter, Connection, ErrorCode};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Boolean(b) => ToSqlOutput::Owned(SqlValue::Integer(i64::from(*b))),
            Value::Integer(i) => ToSqlOutput::Owned(SqlValue::Integer(*i)),
            Value::Decimal(f) if f.is_finite() => ToSqlOutput::Owned(SqlValue::Real(*f)),
            Value::Decimal(_) => ToSqlOutput::Owned(SqlValue::Null),
            Value::DateTime(dt) => {
                ToSqlOutput::Owned(SqlValue::Text(dt.format(DATETIME_FORMAT).to_string()))
            }
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

/// SQLite-backed table store
///
/// One database file per warehouse. Every member table is created on open.
/// Foreign keys are declared in the DDL but not enforced, so child rows
/// may be loaded before their parents. Thread-safe via internal mutex on
/// the connection.
pub struct SqliteTableStore {
    conn: Mutex<Connection>,
    warehouse: Warehouse,
}

impl SqliteTableStore {
    fn init_schema(conn: &Connection, warehouse: Warehouse) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            -- References are documentation only; load order is unconstrained
            PRAGMA foreign_keys = OFF;

            PRAGMA journal_mode = WAL;
            "#,
        )?;

        for table in warehouse.tables() {
            conn.execute_batch(&create_table_sql(table))?;
            for statement in create_index_sql(table) {
                conn.execute(&statement, [])?;
            }
        }
        Ok(())
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    fn table(&self, name: &str) -> StorageResult<&'static LogicalTable> {
        self.warehouse.table(name).ok_or_else(|| StorageError::UnknownTable {
            table: name.to_string(),
            warehouse: self.warehouse,
        })
    }

    fn select(
        &self,
        table: &'static LogicalTable,
        filter: &str,
        params: &[Value],
        order_by: &str,
    ) -> StorageResult<Vec<Row>> {
        let conn = self.lock()?;
        let mut order = quote(order_by);
        if order_by != table.primary_key {
            order = format!("{}, {}", order, quote(table.primary_key));
        }
        let sql = format!(
            "SELECT {} FROM {}{} ORDER BY {}",
            column_list(table),
            quote(table.name),
            filter,
            order
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(params.iter()), |row| read_row(table, row))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn column<'t>(table: &'t LogicalTable, name: &str) -> StorageResult<&'t FieldSpec> {
    table.field(name).ok_or_else(|| StorageError::UnknownColumn {
        table: table.name.to_string(),
        column: name.to_string(),
    })
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

fn column_list(table: &LogicalTable) -> String {
    table
        .fields
        .iter()
        .map(|f| quote(f.name))
        .collect::<Vec<_>>()
        .join(", ")
}

fn create_table_sql(table: &LogicalTable) -> String {
    let mut lines: Vec<String> = table
        .fields
        .iter()
        .map(|field| {
            let mut line = format!("{} {}", quote(field.name), field.ty.sql_type());
            if field.name == table.primary_key {
                line.push_str(" NOT NULL PRIMARY KEY");
            } else if !field.nullable {
                line.push_str(" NOT NULL");
            }
            line
        })
        .collect();
    lines.extend(table.foreign_keys.iter().map(|fk| {
        format!(
            "FOREIGN KEY ({}) REFERENCES {} ({})",
            quote(fk.column),
            quote(fk.references_table),
            quote(fk.references_column)
        )
    }));
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
        quote(table.name),
        lines.join(",\n    ")
    )
}

/// Indexes on datetime columns (range queries) and reference columns (joins)
fn create_index_sql(table: &LogicalTable) -> Vec<String> {
    table
        .fields
        .iter()
        .filter(|f| {
            f.name != table.primary_key
                && (f.ty == FieldType::DateTime
                    || table.foreign_keys.iter().any(|fk| fk.column == f.name))
        })
        .map(|f| {
            format!(
                "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
                quote(&format!("idx_{}_{}", table.name, f.name.to_ascii_lowercase())),
                quote(table.name),
                quote(f.name)
            )
        })
        .collect()
}

fn insert_sql(table: &LogicalTable) -> String {
    let placeholders = (1..=table.fields.len())
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote(table.name),
        column_list(table),
        placeholders
    )
}

fn read_value(raw: ValueRef<'_>, ty: FieldType) -> Value {
    let value = match raw {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Decimal(f),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::Text(String::from_utf8_lossy(bytes).into_owned())
        }
    };
    ty.coerce(value)
}

fn read_row(table: &'static LogicalTable, row: &rusqlite::Row<'_>) -> rusqlite::Result<Row> {
    let values = table
        .fields
        .iter()
        .enumerate()
        .map(|(i, field)| row.get_ref(i).map(|raw| read_value(raw, field.ty)))
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(Row::from_typed(table, values))
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

/// Insert a whole batch inside one transaction; any failure rolls it back.
fn insert_batch(conn: &mut Connection, sql: &str, batch: &[Row]) -> rusqlite::Result<()> {
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare_cached(sql)?;
        for row in batch {
            stmt.execute(params_from_iter(row.values()))?;
        }
    }
    tx.commit()
}

impl OpenStore for SqliteTableStore {
    fn open(path: impl AsRef<Path>, warehouse: Warehouse) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::init_schema(&conn, warehouse)?;

        Ok(Self { conn: Mutex::new(conn), warehouse })
    }

    fn open_in_memory(warehouse: Warehouse) -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn, warehouse)?;

        Ok(Self { conn: Mutex::new(conn), warehouse })
    }
}

impl TableStore for SqliteTableStore {
    fn warehouse(&self) -> Warehouse {
        self.warehouse
    }

    // === Write Operations ===

    fn insert(
        &self,
        table: &str,
        rows: &mut dyn Iterator<Item = Row>,
        batch_size: usize,
    ) -> StorageResult<InsertReport> {
        let spec = self.table(table)?;
        let sql = insert_sql(spec);
        let batch_size = batch_size.max(1);
        let mut conn = self.lock()?;
        let mut report = InsertReport::default();
        let mut batch: Vec<Row> = Vec::with_capacity(batch_size);

        loop {
            batch.clear();
            batch.extend((&mut *rows).take(batch_size));
            if batch.is_empty() {
                break;
            }
            if let Some(stray) = batch.iter().find(|row| row.table().name != spec.name) {
                return Err(StorageError::TableMismatch {
                    table: spec.name.to_string(),
                    row_table: stray.table().name.to_string(),
                });
            }
            report.batches += 1;

            match insert_batch(&mut conn, &sql, &batch) {
                Ok(()) => report.inserted += batch.len(),
                Err(err) if is_constraint_violation(&err) => {
                    debug!(table, batch = report.batches, error = %err, "batch rejected, retrying row by row");
                    report.retried_batches += 1;
                    for row in &batch {
                        match conn.execute(&sql, params_from_iter(row.values())) {
                            Ok(_) => report.inserted += 1,
                            Err(err) if is_constraint_violation(&err) => {
                                debug!(table, key = ?row.key(), error = %err, "row skipped");
                                report.skipped += 1;
                            }
                            Err(err) => return Err(err.into()),
                        }
                    }
                }
                Err(err) => return Err(err.into()),
            }

            info!(
                table,
                batch = report.batches,
                inserted = report.inserted,
                skipped = report.skipped,
                "batch stored"
            );
        }

        Ok(report)
    }

    fn update(
        &self,
        table: &str,
        key: &Value,
        patch: &BTreeMap<String, Value>,
    ) -> StorageResult<UpdateOutcome> {
        let spec = self.table(table)?;
        let pk = column(spec, spec.primary_key)?;
        let key = pk.ty.coerce(key.clone());

        let mut assignments = Vec::with_capacity(patch.len());
        let mut values = Vec::with_capacity(patch.len() + 1);
        for (name, value) in patch {
            let field = column(spec, name)?;
            values.push(field.ty.coerce(value.clone()));
            assignments.push(format!("{} = ?{}", quote(field.name), values.len()));
        }
        values.push(key);

        let conn = self.lock()?;
        if assignments.is_empty() {
            let found: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM {} WHERE {} = ?1", quote(spec.name), quote(pk.name)),
                params_from_iter(values.iter()),
                |row| row.get(0),
            )?;
            return Ok(if found > 0 { UpdateOutcome::Updated } else { UpdateOutcome::NotFound });
        }

        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?{}",
            quote(spec.name),
            assignments.join(", "),
            quote(pk.name),
            values.len()
        );
        match conn.execute(&sql, params_from_iter(values.iter())) {
            Ok(0) => Ok(UpdateOutcome::NotFound),
            Ok(_) => Ok(UpdateOutcome::Updated),
            Err(err) if is_constraint_violation(&err) => {
                warn!(table, error = %err, "update rejected");
                Ok(UpdateOutcome::Rejected(err.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn delete(&self, table: &str, keys: &[Value]) -> StorageResult<DeleteReport> {
        let spec = self.table(table)?;
        let pk = column(spec, spec.primary_key)?;
        let sql = format!("DELETE FROM {} WHERE {} = ?1", quote(spec.name), quote(pk.name));
        let conn = self.lock()?;
        let mut report = DeleteReport::default();

        for key in keys {
            match conn.execute(&sql, params![pk.ty.coerce(key.clone())]) {
                Ok(0) => report.missing += 1,
                Ok(_) => report.deleted += 1,
                Err(err) if is_constraint_violation(&err) => {
                    warn!(table, key = ?key, error = %err, "delete rejected");
                    report.failed += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(report)
    }

    fn drop_table(&self, table: &str) -> StorageResult<bool> {
        let spec = self.table(table)?;
        let conn = self.lock()?;
        let existed: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![spec.name],
            |row| row.get(0),
        )?;
        conn.execute(&format!("DROP TABLE IF EXISTS {}", quote(spec.name)), [])?;
        Ok(existed > 0)
    }

    // === Query Operations ===

    fn query_equal(&self, table: &str, column_name: &str, value: &Value) -> StorageResult<Vec<Row>> {
        let spec = self.table(table)?;
        let field = column(spec, column_name)?;
        let filter = format!(" WHERE {} = ?1", quote(field.name));
        self.select(spec, &filter, &[field.ty.coerce(value.clone())], field.name)
    }

    fn query_range(
        &self,
        table: &str,
        column_name: &str,
        lower: &Value,
        upper: &Value,
    ) -> StorageResult<Vec<Row>> {
        let spec = self.table(table)?;
        let field = column(spec, column_name)?;
        let filter = format!(" WHERE {} BETWEEN ?1 AND ?2", quote(field.name));
        let bounds = [field.ty.coerce(lower.clone()), field.ty.coerce(upper.clone())];
        self.select(spec, &filter, &bounds, field.name)
    }

    fn query_all(&self, table: &str) -> StorageResult<Vec<Row>> {
        let spec = self.table(table)?;
        self.select(spec, "", &[], spec.primary_key)
    }

    fn count(&self, table: &str) -> StorageResult<usize> {
        let spec = self.table(table)?;
        let conn = self.lock()?;
        // Out-of-range counts surface as IntegralValueOutOfRange
        let count: usize = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", quote(spec.name)),
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{into_row, tables, SourceRow};
    use chrono::NaiveDate;

    fn create_test_store() -> SqliteTableStore {
        SqliteTableStore::open_in_memory(Warehouse::Establishments).unwrap()
    }

    fn facility(code: &str, municipality: &str) -> Row {
        let mut raw = SourceRow::new();
        raw.insert("CNES".into(), Value::text(code));
        raw.insert("CODUFMUN".into(), Value::text(municipality));
        into_row(tables::establishments(), raw)
    }

    fn equipment(key: &str, month: u32, existing: i64) -> Row {
        let mut raw = SourceRow::new();
        raw.insert(tables::SYNTHETIC_KEY.into(), Value::text(key));
        raw.insert("CNES".into(), Value::text("0000001"));
        raw.insert(
            "COMPET".into(),
            NaiveDate::from_ymd_opt(2020, month, 1)
                .map(|d| Value::DateTime(d.and_hms_opt(0, 0, 0).unwrap()))
                .unwrap_or(Value::Null),
        );
        raw.insert("QT_EXIST".into(), Value::Integer(existing));
        into_row(tables::equipment_months(), raw)
    }

    fn insert_all(store: &SqliteTableStore, table: &str, rows: Vec<Row>, batch: usize) -> InsertReport {
        store.insert(table, &mut rows.into_iter(), batch).unwrap()
    }

    #[test]
    fn test_creates_every_member_table() {
        let store = create_test_store();
        for table in Warehouse::Establishments.tables() {
            assert_eq!(store.count(table.name).unwrap(), 0, "table {}", table.name);
        }
    }

    #[test]
    fn test_insert_partitions_into_batches() {
        let store = create_test_store();
        let rows = (0..5).map(|i| facility(&format!("000000{}", i), "230440")).collect();
        let report = insert_all(&store, tables::CNES, rows, 2);

        assert_eq!(report.batches, 3);
        assert_eq!(report.inserted, 5);
        assert_eq!(report.retried_batches, 0);
        assert_eq!(store.count(tables::CNES).unwrap(), 5);
    }

    #[test]
    fn test_duplicate_within_batch_keeps_first_row() {
        let store = create_test_store();
        let rows = vec![
            facility("A", "100000"),
            facility("B", "200000"),
            facility("A", "300000"),
        ];
        let report = insert_all(&store, tables::CNES, rows, 200);

        assert_eq!(report.inserted, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.retried_batches, 1);
        let a = store.query_equal(tables::CNES, "CNES", &Value::text("A")).unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].text("CODUFMUN"), Some("100000"));
    }

    #[test]
    fn test_collision_with_stored_row_is_isolated() {
        let store = create_test_store();
        insert_all(&store, tables::CNES, vec![facility("0000003", "1")], 200);

        let rows = (1..=5).map(|i| facility(&format!("000000{}", i), "2")).collect();
        let report = insert_all(&store, tables::CNES, rows, 200);

        assert_eq!(report.inserted, 4);
        assert_eq!(report.skipped, 1);
        assert_eq!(store.count(tables::CNES).unwrap(), 5);
    }

    #[test]
    fn test_reinsert_adds_nothing() {
        let store = create_test_store();
        let rows: Vec<Row> = (0..4).map(|i| facility(&format!("100000{}", i), "9")).collect();
        insert_all(&store, tables::CNES, rows.clone(), 3);
        let after_first = store.count(tables::CNES).unwrap();

        let report = insert_all(&store, tables::CNES, rows, 3);
        assert_eq!(report.inserted, 0);
        assert_eq!(report.skipped, 4);
        assert_eq!(store.count(tables::CNES).unwrap(), after_first);
    }

    #[test]
    fn test_not_null_violation_skips_only_that_row() {
        let store = create_test_store();
        let rows = vec![equipment("1EQ", 1, 2), equipment("2EQ", 13, 1), equipment("3EQ", 2, 4)];
        let report = insert_all(&store, tables::EQUIPAMENTOS_MES, rows, 200);

        assert_eq!(report.inserted, 2);
        assert_eq!(report.skipped, 1);
    }

    #[test]
    fn test_zero_batch_size_is_clamped() {
        let store = create_test_store();
        let rows = vec![facility("1", "1"), facility("2", "2")];
        let report = insert_all(&store, tables::CNES, rows, 0);
        assert_eq!(report.batches, 2);
        assert_eq!(report.inserted, 2);
    }

    #[test]
    fn test_rows_for_another_table_are_refused() {
        let store = create_test_store();
        let rows = vec![equipment("1EQ", 1, 2)];
        let result = store.insert(tables::CNES, &mut rows.into_iter(), 10);
        assert!(matches!(result, Err(StorageError::TableMismatch { .. })));
    }

    #[test]
    fn test_update_by_key() {
        let store = create_test_store();
        insert_all(&store, tables::CNES, vec![facility("1", "1")], 200);

        let mut patch = BTreeMap::new();
        patch.insert("CODUFMUN".to_string(), Value::text("355030"));
        patch.insert("LATITUDE".to_string(), Value::Decimal(-23.5));
        let outcome = store.update(tables::CNES, &Value::text("1"), &patch).unwrap();

        assert_eq!(outcome, UpdateOutcome::Updated);
        let row = &store.query_equal(tables::CNES, "CNES", &Value::text("1")).unwrap()[0];
        assert_eq!(row.text("CODUFMUN"), Some("355030"));
        assert_eq!(row.decimal("LATITUDE"), Some(-23.5));
    }

    #[test]
    fn test_update_reports_missing_and_rejected() {
        let store = create_test_store();
        insert_all(&store, tables::CNES, vec![facility("1", "1"), facility("2", "2")], 200);

        let mut patch = BTreeMap::new();
        patch.insert("CODUFMUN".to_string(), Value::text("x"));
        assert_eq!(
            store.update(tables::CNES, &Value::text("9"), &patch).unwrap(),
            UpdateOutcome::NotFound
        );

        let mut clash = BTreeMap::new();
        clash.insert("CNES".to_string(), Value::text("2"));
        let outcome = store.update(tables::CNES, &Value::text("1"), &clash).unwrap();
        assert!(matches!(outcome, UpdateOutcome::Rejected(_)));
        assert_eq!(store.count(tables::CNES).unwrap(), 2);

        let mut unknown = BTreeMap::new();
        unknown.insert("NOPE".to_string(), Value::Null);
        assert!(matches!(
            store.update(tables::CNES, &Value::text("1"), &unknown),
            Err(StorageError::UnknownColumn { .. })
        ));
    }

    #[test]
    fn test_delete_key_by_key() {
        let store = create_test_store();
        insert_all(&store, tables::CNES, vec![facility("1", "1"), facility("2", "2")], 200);

        let report = store
            .delete(tables::CNES, &[Value::text("1"), Value::text("7"), Value::text("2")])
            .unwrap();
        assert_eq!(report, DeleteReport { deleted: 2, missing: 1, failed: 0 });
        assert_eq!(store.count(tables::CNES).unwrap(), 0);
    }

    #[test]
    fn test_range_query_is_inclusive_and_ordered() {
        let store = create_test_store();
        let rows = vec![equipment("3", 3, 1), equipment("1", 1, 1), equipment("2", 2, 1), equipment("4", 4, 1)];
        insert_all(&store, tables::EQUIPAMENTOS_MES, rows, 200);

        let lower = Value::text("2020-01-01 00:00:00");
        let upper = Value::text("2020-03-01");
        let found = store.query_range(tables::EQUIPAMENTOS_MES, "COMPET", &lower, &upper).unwrap();
        let keys: Vec<_> = found.iter().map(|r| r.text(tables::SYNTHETIC_KEY).unwrap()).collect();
        assert_eq!(keys, vec!["1", "2", "3"]);
        assert!(found[0].datetime("COMPET").is_some());
    }

    #[test]
    fn test_query_ids_for_year() {
        let store = create_test_store();
        insert_all(&store, tables::EQUIPAMENTOS_MES, vec![equipment("a", 5, 1), equipment("b", 6, 1)], 200);

        let ids = store.query_ids_for_year(tables::EQUIPAMENTOS_MES, "COMPET", 2020).unwrap();
        assert_eq!(ids, vec![Value::text("a"), Value::text("b")]);
        assert!(store.query_ids_for_year(tables::EQUIPAMENTOS_MES, "COMPET", 2019).unwrap().is_empty());
    }

    #[test]
    fn test_decimal_values_survive_storage() {
        let store = create_test_store();
        let mut patch = BTreeMap::new();
        patch.insert("LONGITUDE".to_string(), Value::Decimal(-38.0));
        insert_all(&store, tables::CNES, vec![facility("1", "1")], 200);
        store.update(tables::CNES, &Value::text("1"), &patch).unwrap();

        let rows = store.query_all(tables::CNES).unwrap();
        assert_eq!(rows[0].get("LONGITUDE"), Some(&Value::Decimal(-38.0)));
        assert_eq!(rows[0].get("LATITUDE"), Some(&Value::Null));
    }

    #[test]
    fn test_drop_table() {
        let store = create_test_store();
        assert!(store.drop_table(tables::LEITOS_MES).unwrap());
        assert!(!store.drop_table(tables::LEITOS_MES).unwrap());
        assert!(store.count(tables::LEITOS_MES).is_err());
    }

    #[test]
    fn test_unknown_table_is_an_error() {
        let store = create_test_store();
        assert!(matches!(
            store.count(tables::AIH_REDUZIDA),
            Err(StorageError::UnknownTable { .. })
        ));
    }

    #[test]
    fn test_wal_mode_enabled_at_connection() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested").join("establishments.db");
        let store = SqliteTableStore::open(&db_path, Warehouse::Establishments).unwrap();

        let journal_mode: String = store
            .conn
            .lock()
            .unwrap()
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(journal_mode, "wal");
    }

    #[test]
    fn test_rows_persist_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("establishments.db");
        {
            let store = SqliteTableStore::open(&db_path, Warehouse::Establishments).unwrap();
            insert_all(&store, tables::CNES, vec![facility("1", "1")], 200);
        }
        let store = SqliteTableStore::open(&db_path, Warehouse::Establishments).unwrap();
        assert_eq!(store.count(tables::CNES).unwrap(), 1);
    }
}
