//! Typed views of the warehouse records flows are built from

use super::{FlowError, FlowResult};
use crate::schema::{tables, Row, Value};
use crate::storage::TableStore;
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// Inclusive range of admission dates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Window {
    pub fn new(start: NaiveDate, end: NaiveDate) -> FlowResult<Self> {
        if start > end {
            return Err(FlowError::InvalidWindow { start, end });
        }
        Ok(Self { start, end })
    }

    /// First instant of the window
    pub fn lower(&self) -> NaiveDateTime {
        self.start.and_time(NaiveTime::MIN)
    }

    /// Last whole second of the window
    pub fn upper(&self) -> NaiveDateTime {
        let last = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
        self.end.and_time(last)
    }

    pub fn contains(&self, at: NaiveDateTime) -> bool {
        (self.start..=self.end).contains(&at.date())
    }
}

/// One admission, reduced to the columns flows use
#[derive(Debug, Clone, PartialEq)]
pub struct Admission {
    pub id: String,
    /// Municipality of residence
    pub residence: Option<String>,
    /// Municipality of the admitting facility
    pub movement: Option<String>,
    pub facility: Option<String>,
    pub admitted_at: Option<NaiveDateTime>,
    pub diagnosis: Option<String>,
    pub procedure: Option<String>,
    pub total_value: f64,
}

impl Admission {
    pub fn from_row(row: &Row) -> Option<Self> {
        let owned = |column: &str| row.text(column).map(str::to_string);
        Some(Self {
            id: row.text("N_AIH")?.to_string(),
            residence: owned("MUNIC_RES"),
            movement: owned("MUNIC_MOV"),
            facility: owned("CNES"),
            admitted_at: row.datetime("DT_INTER"),
            diagnosis: owned("DIAG_PRINC"),
            procedure: owned("PROC_REA"),
            total_value: row.decimal("VAL_TOT").unwrap_or(0.0),
        })
    }
}

/// A professional-service line joined to its admission
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceRecord {
    pub admission: String,
    pub residence: Option<String>,
    pub movement: Option<String>,
    /// Facility that billed the service, else the admitting facility
    pub facility: Option<String>,
    pub procedure: Option<String>,
    pub diagnosis: Option<String>,
    pub admitted_at: Option<NaiveDateTime>,
    pub value: f64,
}

/// Equipment units of one type at one facility in a competence month
#[derive(Debug, Clone, PartialEq)]
pub struct EquipmentCount {
    pub facility: String,
    /// `TIPEQUIP-CODEQUIP`
    pub equipment: String,
    pub month: Option<NaiveDateTime>,
    pub existing: i64,
    pub in_use: i64,
}

impl EquipmentCount {
    pub fn from_row(row: &Row) -> Option<Self> {
        let kind = row.text("TIPEQUIP")?;
        let code = row.text("CODEQUIP")?;
        Some(Self {
            facility: row.text("CNES")?.to_string(),
            equipment: format!("{}-{}", kind, code),
            month: row.datetime("COMPET"),
            existing: row.integer("QT_EXIST").unwrap_or(0),
            in_use: row.integer("QT_USO").unwrap_or(0),
        })
    }
}

/// Admissions whose admission date falls in `window`, in date order
pub fn admissions_in(store: &dyn TableStore, window: &Window) -> FlowResult<Vec<Admission>> {
    let rows = store.query_range(
        tables::AIH_REDUZIDA,
        "DT_INTER",
        &Value::DateTime(window.lower()),
        &Value::DateTime(window.upper()),
    )?;
    let admissions: Vec<Admission> = rows.iter().filter_map(Admission::from_row).collect();
    debug!(
        start = %window.start,
        end = %window.end,
        count = admissions.len(),
        "admissions loaded"
    );
    Ok(admissions)
}

/// Service lines of `admissions`, joined on the admission number.
///
/// A procedure billed more than once on the same admission counts once.
pub fn service_records(
    store: &dyn TableStore,
    admissions: &[Admission],
) -> FlowResult<Vec<ServiceRecord>> {
    let mut records = Vec::new();
    let mut seen: HashSet<(String, Option<String>)> = HashSet::new();

    for admission in admissions {
        let lines = store.query_equal(
            tables::SERVICOS_PROFISSIONAIS,
            "SP_NAIH",
            &Value::text(admission.id.as_str()),
        )?;
        for line in &lines {
            let procedure = line.text("SP_ATOPROF").map(str::to_string);
            if !seen.insert((admission.id.clone(), procedure.clone())) {
                continue;
            }
            records.push(ServiceRecord {
                admission: admission.id.clone(),
                residence: admission.residence.clone(),
                movement: admission.movement.clone(),
                facility: line
                    .text("SP_CNES")
                    .map(str::to_string)
                    .or_else(|| admission.facility.clone()),
                procedure,
                diagnosis: admission.diagnosis.clone(),
                admitted_at: admission.admitted_at,
                value: line.decimal("SP_VALATO").unwrap_or(0.0),
            });
        }
    }

    debug!(admissions = admissions.len(), services = records.len(), "service lines joined");
    Ok(records)
}

/// Equipment counts registered for the competence month containing `month`
pub fn equipment_in_month(
    store: &dyn TableStore,
    month: NaiveDate,
) -> FlowResult<Vec<EquipmentCount>> {
    let first = month.with_day0(0).unwrap_or(month).and_time(NaiveTime::MIN);
    let rows = store.query_equal(tables::EQUIPAMENTOS_MES, "COMPET", &Value::DateTime(first))?;
    Ok(rows.iter().filter_map(EquipmentCount::from_row).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{into_row, SourceRow, Warehouse};
    use crate::storage::{OpenStore, SqliteTableStore};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn admission_row(id: &str, admitted: &str) -> Row {
        let mut raw = SourceRow::new();
        raw.insert("N_AIH".into(), Value::text(id));
        raw.insert("MUNIC_RES".into(), Value::text("230440"));
        raw.insert("MUNIC_MOV".into(), Value::text("231290"));
        raw.insert("CNES".into(), Value::text("0000001"));
        raw.insert("DT_INTER".into(), Value::text(admitted));
        raw.insert("DIAG_PRINC".into(), Value::text("J189"));
        raw.insert("VAL_TOT".into(), Value::Decimal(100.5));
        into_row(tables::admissions(), raw)
    }

    #[test]
    fn window_rejects_inverted_range() {
        assert!(matches!(
            Window::new(date(2020, 2, 1), date(2020, 1, 1)),
            Err(FlowError::InvalidWindow { .. })
        ));
        let window = Window::new(date(2020, 1, 1), date(2020, 1, 31)).unwrap();
        assert!(window.contains(date(2020, 1, 31).and_hms_opt(18, 0, 0).unwrap()));
        assert!(!window.contains(date(2020, 2, 1).and_hms_opt(0, 0, 0).unwrap()));
    }

    #[test]
    fn admissions_in_window_include_last_day() {
        let store = SqliteTableStore::open_in_memory(Warehouse::Admissions).unwrap();
        let rows = vec![
            admission_row("1", "2019-12-31 00:00:00"),
            admission_row("2", "2020-01-01 00:00:00"),
            admission_row("3", "2020-01-31 12:30:00"),
            admission_row("4", "2020-02-01 00:00:00"),
        ];
        store.insert(tables::AIH_REDUZIDA, &mut rows.into_iter(), 10).unwrap();

        let window = Window::new(date(2020, 1, 1), date(2020, 1, 31)).unwrap();
        let found = admissions_in(&store, &window).unwrap();
        let ids: Vec<_> = found.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "3"]);
        assert_eq!(found[0].total_value, 100.5);
        assert_eq!(found[0].diagnosis.as_deref(), Some("J189"));
    }

    #[test]
    fn service_join_deduplicates_procedures() {
        let store = SqliteTableStore::open_in_memory(Warehouse::Admissions).unwrap();
        let admission = admission_row("1", "2020-01-05 00:00:00");
        store
            .insert(tables::AIH_REDUZIDA, &mut std::iter::once(admission), 10)
            .unwrap();

        let lines: Vec<Row> = [("0301", 10.0), ("0301", 12.0), ("0415", 30.0)]
            .iter()
            .enumerate()
            .map(|(i, (procedure, value))| {
                let mut raw = SourceRow::new();
                raw.insert(tables::SYNTHETIC_KEY.into(), Value::text(format!("f-{}", i)));
                raw.insert("SP_NAIH".into(), Value::text("1"));
                raw.insert("SP_ATOPROF".into(), Value::text(*procedure));
                raw.insert("SP_VALATO".into(), Value::Decimal(*value));
                into_row(tables::service_lines(), raw)
            })
            .collect();
        store
            .insert(tables::SERVICOS_PROFISSIONAIS, &mut lines.into_iter(), 10)
            .unwrap();

        let window = Window::new(date(2020, 1, 1), date(2020, 1, 31)).unwrap();
        let admissions = admissions_in(&store, &window).unwrap();
        let services = service_records(&store, &admissions).unwrap();
        assert_eq!(services.len(), 2);
        assert_eq!(services[0].facility.as_deref(), Some("0000001"));
        let total: f64 = services.iter().map(|s| s.value).sum();
        assert_eq!(total, 40.0);
    }
}
