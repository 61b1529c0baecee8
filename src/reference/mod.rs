//! Node reference data: municipalities, facilities and their labels

mod facilities;
mod labels;
mod locations;

pub use facilities::{Facility, FacilityTable};
pub use labels::{LabelIndex, NodeLabel};
pub use locations::{Location, LocationTable, Region, NO_REGION};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReferenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid reference file: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ReferenceResult<T> = Result<T, ReferenceError>;

/// The reference tables a flow network resolves its nodes against
#[derive(Debug, Clone, Default)]
pub struct References {
    pub locations: LocationTable,
    pub facilities: FacilityTable,
}

impl References {
    pub fn new(locations: LocationTable, facilities: FacilityTable) -> Self {
        Self { locations, facilities }
    }

    /// Region of a facility, through the municipality it sits in
    pub fn facility_region(&self, code: &str) -> Option<Region> {
        let municipality = self.facilities.get(code)?.municipality.as_deref()?;
        self.locations.region(municipality)
    }
}
