//! Warehouses: named groups of tables persisted together

use super::mapping::MappingError;
use super::tables;
use super::types::LogicalTable;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Warehouse {
    /// Hospital admissions, their service line items and rejected claims
    Admissions,
    /// Establishment registry and its monthly snapshots
    Establishments,
    /// Mortality records
    Mortality,
}

impl Warehouse {
    pub const ALL: [Warehouse; 3] =
        [Warehouse::Admissions, Warehouse::Establishments, Warehouse::Mortality];

    pub fn name(&self) -> &'static str {
        match self {
            Warehouse::Admissions => "admissions",
            Warehouse::Establishments => "establishments",
            Warehouse::Mortality => "mortality",
        }
    }

    /// File name of the warehouse's store inside a warehouse directory
    pub fn file_name(&self) -> String {
        format!("{}.db", self.name())
    }

    /// Member tables in creation order (referenced tables first)
    pub fn tables(&self) -> Vec<&'static LogicalTable> {
        match self {
            Warehouse::Admissions => vec![
                tables::admissions(),
                tables::service_lines(),
                tables::rejected_admissions(),
            ],
            Warehouse::Establishments => vec![
                tables::establishments(),
                tables::establishment_months(),
                tables::equipment_months(),
                tables::bed_months(),
                tables::professional_months(),
                tables::specialized_service_months(),
                tables::care_team_months(),
            ],
            Warehouse::Mortality => vec![tables::mortality()],
        }
    }

    pub fn table(&self, name: &str) -> Option<&'static LogicalTable> {
        self.tables().into_iter().find(|t| t.name == name)
    }

    pub fn require_table(&self, name: &str) -> Result<&'static LogicalTable, MappingError> {
        self.table(name)
            .ok_or_else(|| MappingError::UnknownTable(name.to_string()))
    }

    /// Ordered canonical column names of every member table
    pub fn expected_columns(&self) -> Vec<(&'static str, Vec<&'static str>)> {
        self.tables()
            .into_iter()
            .map(|t| (t.name, t.column_names()))
            .collect()
    }
}

impl fmt::Display for Warehouse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Warehouse {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "admissions" | "sih" | "sihsus" => Ok(Warehouse::Admissions),
            "establishments" | "cnes" => Ok(Warehouse::Establishments),
            "mortality" | "sim" => Ok(Warehouse::Mortality),
            other => Err(format!("unknown warehouse '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_table_belongs_to_exactly_one_warehouse() {
        for table in tables::all() {
            let owners = Warehouse::ALL
                .iter()
                .filter(|w| w.table(table.name).is_some())
                .count();
            assert_eq!(owners, 1, "table {}", table.name);
        }
    }

    #[test]
    fn foreign_keys_stay_inside_the_warehouse() {
        for warehouse in Warehouse::ALL {
            for table in warehouse.tables() {
                for fk in &table.foreign_keys {
                    assert!(warehouse.table(fk.references_table).is_some());
                }
            }
        }
    }

    #[test]
    fn expected_columns_follow_declaration_order() {
        let expected = Warehouse::Admissions.expected_columns();
        assert_eq!(expected[0].0, tables::AIH_REDUZIDA);
        assert_eq!(expected[0].1.first(), Some(&"N_AIH"));
        assert_eq!(expected[0].1.last(), Some(&"FONTE"));
    }

    #[test]
    fn parses_aliases() {
        assert_eq!("SIH".parse::<Warehouse>(), Ok(Warehouse::Admissions));
        assert_eq!("cnes".parse::<Warehouse>(), Ok(Warehouse::Establishments));
        assert!("sinan".parse::<Warehouse>().is_err());
        assert!(Warehouse::Mortality.require_table(tables::CNES).is_err());
    }
}
