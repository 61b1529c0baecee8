//! Flow aggregation
//!
//! Turns admission, service and equipment records into aggregate edges
//! keyed by (origin, destination), with optional stratification by a
//! truncated diagnosis or procedure code or by ICD-10 chapter.

mod aggregate;
pub mod icd;
mod records;

pub use aggregate::{
    AggregateEdge, FlowAggregator, FlowOptions, FlowSet, Observation, Stratification, Totals,
};
pub use records::{
    admissions_in, equipment_in_month, service_records, Admission, EquipmentCount, ServiceRecord,
    Window,
};

use crate::storage::StorageError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Window starts on {start}, after its end on {end}")]
    InvalidWindow { start: NaiveDate, end: NaiveDate },

    #[error("{kind} networks cannot be built from {measure} records")]
    KindMismatch { kind: FlowKind, measure: Measure },

    #[error("Unknown network kind '{0}'")]
    UnknownKind(String),
}

pub type FlowResult<T> = Result<T, FlowError>;

/// What a graph node stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Location,
    Facility,
    /// Three-character diagnosis category
    Category,
    /// Procedure code
    Service,
    /// Equipment type, as `TIPEQUIP-CODEQUIP`
    Equipment,
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Location => "location",
            NodeKind::Facility => "facility",
            NodeKind::Category => "category",
            NodeKind::Service => "service",
            NodeKind::Equipment => "equipment",
        }
    }

    /// Whether nodes of this kind come from a reference table
    pub fn is_referenced(&self) -> bool {
        matches!(self, NodeKind::Location | NodeKind::Facility)
    }
}

/// The closed set of flow networks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowKind {
    LocationToLocation,
    LocationToFacility,
    FacilityToCategory,
    FacilityToService,
    EquipmentToFacility,
    EquipmentToLocation,
}

impl FlowKind {
    pub const ALL: [FlowKind; 6] = [
        FlowKind::LocationToLocation,
        FlowKind::LocationToFacility,
        FlowKind::FacilityToCategory,
        FlowKind::FacilityToService,
        FlowKind::EquipmentToFacility,
        FlowKind::EquipmentToLocation,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FlowKind::LocationToLocation => "location-to-location",
            FlowKind::LocationToFacility => "location-to-facility",
            FlowKind::FacilityToCategory => "facility-to-category",
            FlowKind::FacilityToService => "facility-to-service",
            FlowKind::EquipmentToFacility => "equipment-to-facility",
            FlowKind::EquipmentToLocation => "equipment-to-location",
        }
    }

    pub fn origin(&self) -> NodeKind {
        match self {
            FlowKind::LocationToLocation | FlowKind::LocationToFacility => NodeKind::Location,
            FlowKind::FacilityToCategory | FlowKind::FacilityToService => NodeKind::Facility,
            FlowKind::EquipmentToFacility | FlowKind::EquipmentToLocation => NodeKind::Equipment,
        }
    }

    pub fn destination(&self) -> NodeKind {
        match self {
            FlowKind::LocationToLocation | FlowKind::EquipmentToLocation => NodeKind::Location,
            FlowKind::LocationToFacility | FlowKind::EquipmentToFacility => NodeKind::Facility,
            FlowKind::FacilityToCategory => NodeKind::Category,
            FlowKind::FacilityToService => NodeKind::Service,
        }
    }

    /// Patient flows are directed; bipartite association networks are not
    pub fn is_directed(&self) -> bool {
        matches!(self, FlowKind::LocationToLocation | FlowKind::LocationToFacility)
    }

    /// Whether self-edges are kept when the caller does not say.
    ///
    /// Only location-to-location networks can have self-edges; their
    /// stratified variants drop them.
    pub fn default_self_edges(&self, stratified: bool) -> bool {
        match self {
            FlowKind::LocationToLocation => !stratified,
            _ => true,
        }
    }

    /// Whether a network also carries region attributes on its edges
    pub fn has_regions(&self) -> bool {
        self.is_directed()
    }
}

impl fmt::Display for FlowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FlowKind {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        let alias = match wanted.as_str() {
            "l2l" | "city" => Some(FlowKind::LocationToLocation),
            "l2f" | "city-hospital" => Some(FlowKind::LocationToFacility),
            "f2c" => Some(FlowKind::FacilityToCategory),
            "f2s" => Some(FlowKind::FacilityToService),
            "e2f" => Some(FlowKind::EquipmentToFacility),
            "e2l" => Some(FlowKind::EquipmentToLocation),
            _ => None,
        };
        alias
            .or_else(|| FlowKind::ALL.into_iter().find(|k| k.name() == wanted))
            .ok_or_else(|| FlowError::UnknownKind(s.to_string()))
    }
}

/// Record family an aggregate was computed from; names its weights
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Measure {
    Admissions,
    Services,
    Equipment,
}

impl Measure {
    pub fn count_name(&self) -> &'static str {
        match self {
            Measure::Admissions => "admission_count",
            Measure::Services => "service_count",
            Measure::Equipment => "equipment_existing",
        }
    }

    pub fn sum_name(&self) -> &'static str {
        match self {
            Measure::Admissions => "total_cost",
            Measure::Services => "service_value",
            Measure::Equipment => "equipment_in_use",
        }
    }
}

impl fmt::Display for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Measure::Admissions => "admission",
            Measure::Services => "service",
            Measure::Equipment => "equipment",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directedness_by_kind() {
        assert!(FlowKind::LocationToLocation.is_directed());
        assert!(FlowKind::LocationToFacility.is_directed());
        assert!(!FlowKind::FacilityToCategory.is_directed());
        assert!(!FlowKind::EquipmentToLocation.is_directed());
    }

    #[test]
    fn self_edge_defaults() {
        assert!(FlowKind::LocationToLocation.default_self_edges(false));
        assert!(!FlowKind::LocationToLocation.default_self_edges(true));
        assert!(FlowKind::LocationToFacility.default_self_edges(true));
    }

    #[test]
    fn parses_names_and_aliases() {
        for kind in FlowKind::ALL {
            assert_eq!(kind.name().parse::<FlowKind>().unwrap(), kind);
        }
        assert_eq!("L2F".parse::<FlowKind>().unwrap(), FlowKind::LocationToFacility);
        assert_eq!(
            "facility_to_service".parse::<FlowKind>().unwrap(),
            FlowKind::FacilityToService
        );
        assert!(matches!("ring".parse::<FlowKind>(), Err(FlowError::UnknownKind(_))));
    }
}
