//! Facility reference table, read from the establishment registry

use super::labels::{LabelIndex, NodeLabel};
use crate::schema::tables;
use crate::storage::{StorageResult, TableStore};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Facility {
    pub code: String,
    /// Municipality the facility sits in
    pub municipality: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

impl Facility {
    pub fn new(code: impl Into<String>, municipality: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            municipality: Some(municipality.into()),
            lat: None,
            lon: None,
        }
    }
}

/// Facilities in reference order
#[derive(Debug, Clone, Default)]
pub struct FacilityTable {
    rows: Vec<Facility>,
    index: LabelIndex,
}

impl FacilityTable {
    pub fn new(rows: Vec<Facility>) -> Self {
        let index = LabelIndex::from_codes(rows.iter().map(|f| f.code.as_str()), 0);
        Self { rows, index }
    }

    /// Every registered facility of an establishment store, by code
    pub fn from_store(store: &dyn TableStore) -> StorageResult<Self> {
        let rows = store
            .query_all(tables::CNES)?
            .iter()
            .filter_map(|row| {
                Some(Facility {
                    code: row.text("CNES")?.to_string(),
                    municipality: row.text("CODUFMUN").map(str::to_string),
                    lat: row.decimal("LATITUDE"),
                    lon: row.decimal("LONGITUDE"),
                })
            })
            .collect();
        Ok(Self::new(rows))
    }

    pub fn rows(&self) -> &[Facility] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn index(&self) -> &LabelIndex {
        &self.index
    }

    pub fn label_of(&self, code: &str) -> Option<NodeLabel> {
        self.index.lookup(code.trim())
    }

    pub fn get(&self, code: &str) -> Option<&Facility> {
        self.label_of(code).map(|label| &self.rows[label.index()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{into_row, SourceRow, Value, Warehouse};
    use crate::storage::{OpenStore, SqliteTableStore};

    #[test]
    fn loads_registry_in_code_order() {
        let store = SqliteTableStore::open_in_memory(Warehouse::Establishments).unwrap();
        let rows: Vec<_> = [("0000002", "230440"), ("0000001", "231290")]
            .iter()
            .map(|(code, muni)| {
                let mut raw = SourceRow::new();
                raw.insert("CNES".into(), Value::text(*code));
                raw.insert("CODUFMUN".into(), Value::text(*muni));
                raw.insert("LATITUDE".into(), Value::Decimal(-3.5));
                into_row(tables::establishments(), raw)
            })
            .collect();
        store.insert(tables::CNES, &mut rows.into_iter(), 10).unwrap();

        let facilities = FacilityTable::from_store(&store).unwrap();
        assert_eq!(facilities.len(), 2);
        assert_eq!(facilities.label_of("0000001"), Some(NodeLabel(0)));
        let second = facilities.get("0000002").unwrap();
        assert_eq!(second.municipality.as_deref(), Some("230440"));
        assert_eq!(second.lat, Some(-3.5));
    }
}
