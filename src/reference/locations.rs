//! Municipality reference table

use super::labels::{LabelIndex, NodeLabel};
use super::ReferenceResult;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Value of a same-region attribute when origin and destination differ
/// (or either side has no region)
pub const NO_REGION: i64 = -1;

/// One municipality with its health-region assignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub macro_id: Option<i64>,
    #[serde(default)]
    pub macro_name: Option<String>,
    #[serde(default)]
    pub micro_id: Option<i64>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
}

impl Location {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            macro_id: None,
            macro_name: None,
            micro_id: None,
            lat: None,
            lon: None,
        }
    }

    pub fn with_region(mut self, macro_id: i64, micro_id: i64) -> Self {
        self.macro_id = Some(macro_id);
        self.micro_id = Some(micro_id);
        self
    }

    pub fn region(&self) -> Region {
        Region { macro_id: self.macro_id, micro_id: self.micro_id }
    }
}

/// Macro- and micro-region of a node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Region {
    pub macro_id: Option<i64>,
    pub micro_id: Option<i64>,
}

impl Region {
    /// The shared macro-region id, or [`NO_REGION`]
    pub fn same_macro(&self, other: &Region) -> i64 {
        shared(self.macro_id, other.macro_id)
    }

    /// The shared micro-region id, or [`NO_REGION`]
    pub fn same_micro(&self, other: &Region) -> i64 {
        shared(self.micro_id, other.micro_id)
    }
}

fn shared(a: Option<i64>, b: Option<i64>) -> i64 {
    match (a, b) {
        (Some(a), Some(b)) if a == b => a,
        _ => NO_REGION,
    }
}

/// Municipalities in reference order
#[derive(Debug, Clone, Default)]
pub struct LocationTable {
    rows: Vec<Location>,
    index: LabelIndex,
}

impl LocationTable {
    pub fn new(rows: Vec<Location>) -> Self {
        let index = LabelIndex::from_codes(rows.iter().map(|l| l.code.as_str()), 0);
        Self { rows, index }
    }

    /// Load a JSON array of locations
    pub fn from_json_file(path: impl AsRef<Path>) -> ReferenceResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let rows: Vec<Location> = serde_json::from_str(&text)?;
        Ok(Self::new(rows))
    }

    pub fn rows(&self) -> &[Location] {
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

    /// Label of a municipality code.
    ///
    /// Seven-digit codes carry a trailing check digit that six-digit
    /// records omit, so an unmatched seven-digit code is retried without it.
    pub fn label_of(&self, code: &str) -> Option<NodeLabel> {
        let code = code.trim();
        self.index.lookup(code).or_else(|| {
            if code.len() == 7 {
                code.get(..6).and_then(|short| self.index.lookup(short))
            } else {
                None
            }
        })
    }

    pub fn get(&self, code: &str) -> Option<&Location> {
        self.label_of(code).map(|label| &self.rows[label.index()])
    }

    pub fn region(&self, code: &str) -> Option<Region> {
        self.get(code).map(Location::region)
    }
}
