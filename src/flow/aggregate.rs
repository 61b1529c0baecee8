use super::icd::{all_chapter_keys, chapter_key, chapter_of};
use super::records::{Admission, EquipmentCount, ServiceRecord, Window};
use super::{FlowError, FlowKind, FlowResult, Measure, NodeKind};
use crate::reference::{Region, References, NO_REGION};
use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// How edge weights are split into sub-totals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Stratification {
    #[default]
    None,
    /// Leading `depth` characters of the principal diagnosis
    Diagnosis { depth: usize },
    /// ICD-10 chapter of the principal diagnosis
    Chapters,
    /// Leading `depth` characters of the procedure code
    Procedure { depth: usize },
}

impl Stratification {
    pub const MAX_DIAGNOSIS_DEPTH: usize = 4;
    pub const MIN_PROCEDURE_DEPTH: usize = 6;
    pub const MAX_PROCEDURE_DEPTH: usize = 10;

    /// Diagnosis stratification, with `depth` clamped to `0..=4`
    pub fn diagnosis(depth: usize) -> Self {
        let clamped = depth.min(Self::MAX_DIAGNOSIS_DEPTH);
        if clamped != depth {
            warn!(depth, clamped, "diagnosis depth clamped");
        }
        Stratification::Diagnosis { depth: clamped }
    }

    /// Procedure stratification, with `depth` clamped to `6..=10`
    pub fn procedure(depth: usize) -> Self {
        let clamped = depth.clamp(Self::MIN_PROCEDURE_DEPTH, Self::MAX_PROCEDURE_DEPTH);
        if clamped != depth {
            warn!(depth, clamped, "procedure depth clamped");
        }
        Stratification::Procedure { depth: clamped }
    }

    pub fn is_stratified(&self) -> bool {
        !matches!(self, Stratification::None | Stratification::Diagnosis { depth: 0 })
    }

    fn stratum(&self, diagnosis: Option<&str>, procedure: Option<&str>) -> Option<String> {
        match *self {
            Stratification::None | Stratification::Diagnosis { depth: 0 } => None,
            Stratification::Diagnosis { depth } => prefix(diagnosis?, depth),
            Stratification::Chapters => chapter_of(diagnosis?).map(chapter_key),
            Stratification::Procedure { depth } => prefix(procedure?, depth),
        }
    }
}

fn prefix(code: &str, depth: usize) -> Option<String> {
    let code: String = code.trim().chars().take(depth).collect();
    (!code.is_empty()).then_some(code)
}

/// Count and summed value of a group of records
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Totals {
    pub count: u64,
    pub sum: f64,
}

impl Totals {
    pub fn new(count: u64, sum: f64) -> Self {
        Self { count, sum }
    }

    fn add(&mut self, count: u64, sum: f64) {
        self.count += count;
        self.sum += sum;
    }
}

/// One record's contribution to an edge
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub origin: String,
    pub destination: String,
    pub stratum: Option<String>,
    pub count: u64,
    pub sum: f64,
    pub at: Option<NaiveDateTime>,
}

impl Observation {
    pub fn new(
        origin: impl Into<String>,
        destination: impl Into<String>,
        count: u64,
        sum: f64,
    ) -> Self {
        Self {
            origin: origin.into(),
            destination: destination.into(),
            stratum: None,
            count,
            sum,
            at: None,
        }
    }

    pub fn with_stratum(mut self, stratum: Option<String>) -> Self {
        self.stratum = stratum;
        self
    }

    pub fn dated(mut self, at: Option<NaiveDateTime>) -> Self {
        self.at = at;
        self
    }
}

/// Aggregate of every record sharing an (origin, destination) pair
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateEdge {
    pub origin: String,
    pub destination: String,
    pub totals: Totals,
    /// Sub-totals per stratum key; every key of the flow set is present
    pub strata: BTreeMap<String, Totals>,
    pub origin_region: Region,
    pub destination_region: Region,
}

impl AggregateEdge {
    pub fn same_macro(&self) -> i64 {
        self.origin_region.same_macro(&self.destination_region)
    }

    pub fn same_micro(&self) -> i64 {
        self.origin_region.same_micro(&self.destination_region)
    }

    pub fn origin_macro(&self) -> i64 {
        self.origin_region.macro_id.unwrap_or(NO_REGION)
    }

    pub fn destination_macro(&self) -> i64 {
        self.destination_region.macro_id.unwrap_or(NO_REGION)
    }

    pub fn origin_micro(&self) -> i64 {
        self.origin_region.micro_id.unwrap_or(NO_REGION)
    }

    pub fn destination_micro(&self) -> i64 {
        self.destination_region.micro_id.unwrap_or(NO_REGION)
    }
}

/// Aggregated edges of one flow network, ordered by (origin, destination)
#[derive(Debug, Clone, PartialEq)]
pub struct FlowSet {
    pub kind: FlowKind,
    pub measure: Measure,
    pub edges: Vec<AggregateEdge>,
    /// Stratum keys carried by every edge, in attribute order
    pub strata_keys: Vec<String>,
    /// Earliest and latest record time that contributed
    pub period: Option<(NaiveDateTime, NaiveDateTime)>,
    /// Edges dropped because an endpoint is not in its reference table
    pub dropped_unresolved: usize,
    /// Records without an origin or destination code
    pub incomplete_records: usize,
}

impl FlowSet {
    pub fn new(kind: FlowKind, measure: Measure) -> Self {
        Self {
            kind,
            measure,
            edges: Vec::new(),
            strata_keys: Vec::new(),
            period: None,
            dropped_unresolved: 0,
            incomplete_records: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Sum of every edge's totals
    pub fn totals(&self) -> Totals {
        let mut totals = Totals::default();
        for edge in &self.edges {
            totals.add(edge.totals.count, edge.totals.sum);
        }
        totals
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FlowOptions {
    pub stratification: Stratification,
    /// Keep location-to-location edges whose origin equals their
    /// destination; `None` uses the default. Other kinds always keep them.
    pub self_edges: Option<bool>,
    /// Only records inside this window contribute
    pub window: Option<Window>,
}

/// Groups records into the edges of one flow network
pub struct FlowAggregator<'r> {
    kind: FlowKind,
    references: &'r References,
    options: FlowOptions,
}

impl<'r> FlowAggregator<'r> {
    pub fn new(kind: FlowKind, references: &'r References) -> Self {
        Self { kind, references, options: FlowOptions::default() }
    }

    pub fn with_options(mut self, options: FlowOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_stratification(mut self, stratification: Stratification) -> Self {
        self.options.stratification = stratification;
        self
    }

    pub fn with_self_edges(mut self, keep: bool) -> Self {
        self.options.self_edges = Some(keep);
        self
    }

    pub fn with_window(mut self, window: Window) -> Self {
        self.options.window = Some(window);
        self
    }

    pub fn kind(&self) -> FlowKind {
        self.kind
    }

    // === Record Families ===

    /// Aggregate admissions: one count per admission, summing the total value
    pub fn admissions(&self, admissions: &[Admission]) -> FlowResult<FlowSet> {
        self.require(
            Measure::Admissions,
            &[
                FlowKind::LocationToLocation,
                FlowKind::LocationToFacility,
                FlowKind::FacilityToCategory,
            ],
        )?;
        let observations = admissions.iter().map(|admission| {
            let endpoints = match self.kind {
                FlowKind::LocationToLocation => {
                    admission.residence.clone().zip(admission.movement.clone())
                }
                FlowKind::LocationToFacility => {
                    admission.residence.clone().zip(admission.facility.clone())
                }
                _ => {
                    let category = admission.diagnosis.as_deref().and_then(|d| prefix(d, 3));
                    admission.facility.clone().zip(category)
                }
            };
            endpoints.map(|(origin, destination)| {
                Observation::new(origin, destination, 1, admission.total_value)
                    .with_stratum(self.admission_stratum(admission))
                    .dated(admission.admitted_at)
            })
        });
        Ok(self.aggregate_partial(Measure::Admissions, observations))
    }

    /// Aggregate service lines: one count per line, summing the service value
    pub fn services(&self, services: &[ServiceRecord]) -> FlowResult<FlowSet> {
        self.require(
            Measure::Services,
            &[
                FlowKind::LocationToLocation,
                FlowKind::LocationToFacility,
                FlowKind::FacilityToService,
            ],
        )?;
        let stratification = self.options.stratification;
        let observations = services.iter().map(|service| {
            let endpoints = match self.kind {
                FlowKind::LocationToLocation => {
                    service.residence.clone().zip(service.movement.clone())
                }
                FlowKind::LocationToFacility => {
                    service.residence.clone().zip(service.facility.clone())
                }
                _ => service.facility.clone().zip(service.procedure.clone()),
            };
            endpoints.map(|(origin, destination)| {
                let stratum =
                    stratification.stratum(service.diagnosis.as_deref(), service.procedure.as_deref());
                Observation::new(origin, destination, 1, service.value)
                    .with_stratum(stratum)
                    .dated(service.admitted_at)
            })
        });
        Ok(self.aggregate_partial(Measure::Services, observations))
    }

    /// Aggregate equipment: existing units as the count, units in use as the sum.
    ///
    /// The window option is ignored; callers pick the competence month.
    pub fn equipment(&self, counts: &[EquipmentCount]) -> FlowResult<FlowSet> {
        self.require(
            Measure::Equipment,
            &[FlowKind::EquipmentToFacility, FlowKind::EquipmentToLocation],
        )?;
        let observations = counts.iter().map(|entry| {
            let destination = match self.kind {
                FlowKind::EquipmentToFacility => Some(entry.facility.clone()),
                _ => self
                    .references
                    .facilities
                    .get(&entry.facility)
                    .and_then(|f| f.municipality.clone()),
            };
            destination.map(|destination| {
                let existing = u64::try_from(entry.existing).unwrap_or(0);
                let in_use = entry.in_use.max(0) as f64;
                Observation::new(entry.equipment.clone(), destination, existing, in_use)
                    .dated(entry.month)
            })
        });
        // Counts are one competence month already; the admission window does not apply
        let snapshot = FlowAggregator {
            options: FlowOptions { window: None, ..self.options },
            ..*self
        };
        Ok(snapshot.aggregate_partial(Measure::Equipment, observations))
    }

    fn require(&self, measure: Measure, kinds: &[FlowKind]) -> FlowResult<()> {
        if kinds.contains(&self.kind) {
            Ok(())
        } else {
            Err(FlowError::KindMismatch { kind: self.kind, measure })
        }
    }

    /// Aggregate the complete observations, counting records that had
    /// no origin or destination code
    fn aggregate_partial(
        &self,
        measure: Measure,
        observations: impl Iterator<Item = Option<Observation>>,
    ) -> FlowSet {
        let mut incomplete = 0;
        let complete: Vec<Observation> = observations
            .filter_map(|obs| {
                if obs.is_none() {
                    incomplete += 1;
                }
                obs
            })
            .collect();
        let mut set = self.aggregate(measure, complete);
        set.incomplete_records = incomplete;
        set
    }

    fn admission_stratum(&self, admission: &Admission) -> Option<String> {
        self.options
            .stratification
            .stratum(admission.diagnosis.as_deref(), admission.procedure.as_deref())
    }

    // === Aggregation ===

    /// Group observations by (origin, destination), filter self-edges and
    /// unresolved endpoints, and zero-fill the strata of every edge.
    pub fn aggregate(
        &self,
        measure: Measure,
        observations: impl IntoIterator<Item = Observation>,
    ) -> FlowSet {
        let stratification = self.options.stratification;
        let mut groups: BTreeMap<(String, String), (Totals, BTreeMap<String, Totals>)> =
            BTreeMap::new();
        let mut seen_strata = BTreeSet::new();
        let mut period: Option<(NaiveDateTime, NaiveDateTime)> = None;

        for obs in observations {
            if let Some(window) = &self.options.window {
                if !obs.at.is_some_and(|at| window.contains(at)) {
                    continue;
                }
            }
            if let Some(at) = obs.at {
                period = Some(match period {
                    None => (at, at),
                    Some((first, last)) => (first.min(at), last.max(at)),
                });
            }
            let origin = self.canonical(self.kind.origin(), obs.origin);
            let destination = self.canonical(self.kind.destination(), obs.destination);
            let (totals, strata) = groups.entry((origin, destination)).or_default();
            totals.add(obs.count, obs.sum);
            if let Some(stratum) = obs.stratum {
                strata.entry(stratum.clone()).or_default().add(obs.count, obs.sum);
                seen_strata.insert(stratum);
            }
        }

        let strata_keys = match stratification {
            Stratification::Chapters => all_chapter_keys(),
            _ if stratification.is_stratified() => seen_strata.into_iter().collect(),
            _ => Vec::new(),
        };
        let default_self = self.kind.default_self_edges(stratification.is_stratified());
        let keep_self = match self.kind {
            FlowKind::LocationToLocation => self.options.self_edges.unwrap_or(default_self),
            _ => default_self,
        };

        let mut set = FlowSet::new(self.kind, measure);
        set.period = period;

        for ((origin, destination), (totals, mut strata)) in groups {
            if !keep_self && origin == destination {
                continue;
            }
            let resolved = (
                self.resolve(self.kind.origin(), &origin),
                self.resolve(self.kind.destination(), &destination),
            );
            let (Some(origin_region), Some(destination_region)) = resolved else {
                set.dropped_unresolved += 1;
                continue;
            };
            for key in &strata_keys {
                strata.entry(key.clone()).or_default();
            }
            set.edges.push(AggregateEdge {
                origin,
                destination,
                totals,
                strata,
                origin_region,
                destination_region,
            });
        }
        set.strata_keys = strata_keys;

        if set.dropped_unresolved > 0 {
            warn!(
                kind = %self.kind,
                dropped = set.dropped_unresolved,
                "edges dropped for unknown endpoints"
            );
        }
        debug!(kind = %self.kind, edges = set.edges.len(), "flows aggregated");
        set
    }

    /// Reference code an endpoint resolves to, so six- and seven-digit
    /// spellings of one municipality group together. Unknown codes are kept
    /// as given and dropped later.
    fn canonical(&self, kind: NodeKind, code: String) -> String {
        let reference = match kind {
            NodeKind::Location => self.references.locations.get(&code).map(|l| l.code.as_str()),
            NodeKind::Facility => self.references.facilities.get(&code).map(|f| f.code.as_str()),
            NodeKind::Category | NodeKind::Service | NodeKind::Equipment => None,
        };
        match reference {
            Some(reference) if reference != code => reference.to_string(),
            _ => code,
        }
    }

    /// Region of an endpoint, or `None` when a referenced kind has no such row
    fn resolve(&self, kind: NodeKind, code: &str) -> Option<Region> {
        match kind {
            NodeKind::Location => self.references.locations.region(code),
            NodeKind::Facility => {
                self.references.facilities.get(code)?;
                Some(self.references.facility_region(code).unwrap_or_default())
            }
            NodeKind::Category | NodeKind::Service | NodeKind::Equipment => Some(Region::default()),
        }
    }
}
