use opensus::reference::{Location, LocationTable};
use opensus::schema::SourceRow;
use opensus::Value;
use std::io::Write;
use std::path::Path;

pub fn row(pairs: &[(&str, Value)]) -> SourceRow {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

/// An RD row; `admitted` is `YYYYMMDD` as the exports carry it
pub fn admission(
    id: &str,
    residence: &str,
    movement: &str,
    facility: &str,
    admitted: &str,
    diagnosis: &str,
    value: f64,
) -> SourceRow {
    row(&[
        ("N_AIH", Value::text(id)),
        ("MUNIC_RES", Value::text(residence)),
        ("MUNIC_MOV", Value::text(movement)),
        ("CNES", Value::text(facility)),
        ("DT_INTER", Value::text(admitted)),
        ("DIAG_PRINC", Value::text(diagnosis)),
        ("VAL_TOT", Value::Decimal(value)),
    ])
}

/// An SP row
pub fn service_line(admission: &str, procedure: &str, value: f64) -> SourceRow {
    row(&[
        ("SP_NAIH", Value::text(admission)),
        ("SP_ATOPROF", Value::text(procedure)),
        ("SP_VALATO", Value::Decimal(value)),
    ])
}

/// An ST row, feeding both the registry and the monthly snapshot
pub fn establishment(code: &str, municipality: &str, competence: &str) -> SourceRow {
    row(&[
        ("CNES", Value::text(code)),
        ("CODUFMUN", Value::text(municipality)),
        ("COMPETEN", Value::text(competence)),
        ("TP_UNID", Value::text("05")),
    ])
}

/// An EQ row
pub fn equipment(
    facility: &str,
    kind: &str,
    code: &str,
    existing: i64,
    in_use: i64,
    competence: &str,
) -> SourceRow {
    row(&[
        ("CNES", Value::text(facility)),
        ("COMPETEN", Value::text(competence)),
        ("TIPEQUIP", Value::text(kind)),
        ("CODEQUIP", Value::text(code)),
        ("QT_EXIST", Value::Integer(existing)),
        ("QT_USO", Value::Integer(in_use)),
    ])
}

/// Three municipalities: 100 and 200 share macro-region 1, 300 has none
pub fn locations() -> LocationTable {
    LocationTable::new(vec![
        Location::new("100", "Centro").with_region(1, 10),
        Location::new("200", "Litoral").with_region(1, 11),
        Location::new("300", "Sertao"),
    ])
}

/// Write rows as one JSON object per line
pub fn write_json_lines(path: &Path, rows: &[SourceRow]) {
    let mut file = std::fs::File::create(path).unwrap();
    for row in rows {
        let object: serde_json::Map<String, serde_json::Value> = row
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::to_value(v).unwrap()))
            .collect();
        writeln!(file, "{}", serde_json::Value::Object(object)).unwrap();
    }
}
