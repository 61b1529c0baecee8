//! Graph construction for each flow kind

use super::graph::{AttrValue, Attributes, FlowGraph};
use super::{NetworkError, NetworkResult};
use crate::flow::{AggregateEdge, FlowKind, FlowSet, NodeKind};
use crate::reference::{NodeLabel, References};
use crate::schema::DATETIME_FORMAT;
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Builds the graph of one flow kind from a reference table and a flow set.
///
/// Reference rows are labeled first, in row order. When a kind mixes two
/// node families the second continues numbering after the first; derived
/// families (categories, services, equipment) take the sorted distinct codes
/// seen in the flows.
pub struct NetworkBuilder<'r> {
    kind: FlowKind,
    references: &'r References,
}

impl<'r> NetworkBuilder<'r> {
    pub fn new(kind: FlowKind, references: &'r References) -> Self {
        Self { kind, references }
    }

    pub fn kind(&self) -> FlowKind {
        self.kind
    }

    /// Node families in label order
    fn families(&self) -> Vec<NodeKind> {
        match self.kind {
            FlowKind::LocationToLocation => vec![NodeKind::Location],
            FlowKind::LocationToFacility => vec![NodeKind::Location, NodeKind::Facility],
            FlowKind::FacilityToCategory => vec![NodeKind::Facility, NodeKind::Category],
            FlowKind::FacilityToService => vec![NodeKind::Facility, NodeKind::Service],
            FlowKind::EquipmentToFacility => vec![NodeKind::Facility, NodeKind::Equipment],
            FlowKind::EquipmentToLocation => vec![NodeKind::Location, NodeKind::Equipment],
        }
    }

    /// Create the graph and every node it can hold
    pub fn define_nodes(&self, flows: &FlowSet) -> FlowGraph {
        let mut graph = FlowGraph::new(self.kind.is_directed());
        for family in self.families() {
            match family {
                NodeKind::Location => self.add_locations(&mut graph),
                NodeKind::Facility => self.add_facilities(&mut graph),
                derived => self.add_derived(&mut graph, derived, flows),
            }
        }
        graph
    }

    fn add_locations(&self, graph: &mut FlowGraph) {
        for location in self.references.locations.rows() {
            let mut attrs = Attributes::new();
            attrs.insert("name".into(), location.name.as_str().into());
            if let Some(id) = location.macro_id {
                attrs.insert("macro_id".into(), id.into());
            }
            if let Some(name) = &location.macro_name {
                attrs.insert("macro_name".into(), name.as_str().into());
            }
            if let Some(id) = location.micro_id {
                attrs.insert("micro_id".into(), id.into());
            }
            if let Some(lat) = location.lat {
                attrs.insert("lat".into(), lat.into());
            }
            if let Some(lon) = location.lon {
                attrs.insert("lon".into(), lon.into());
            }
            graph.add_node(NodeKind::Location, &location.code, attrs);
        }
    }

    fn add_facilities(&self, graph: &mut FlowGraph) {
        for facility in self.references.facilities.rows() {
            let mut attrs = Attributes::new();
            if let Some(municipality) = &facility.municipality {
                attrs.insert("municipality_code".into(), municipality.as_str().into());
            }
            if let Some(region) = self.references.facility_region(&facility.code) {
                if let Some(id) = region.macro_id {
                    attrs.insert("macro_id".into(), id.into());
                }
                if let Some(id) = region.micro_id {
                    attrs.insert("micro_id".into(), id.into());
                }
            }
            if let Some(lat) = facility.lat {
                attrs.insert("lat".into(), lat.into());
            }
            if let Some(lon) = facility.lon {
                attrs.insert("lon".into(), lon.into());
            }
            graph.add_node(NodeKind::Facility, &facility.code, attrs);
        }
    }

    fn add_derived(&self, graph: &mut FlowGraph, family: NodeKind, flows: &FlowSet) {
        let codes: BTreeSet<&str> = flows
            .edges
            .iter()
            .flat_map(|edge| {
                let origin = (self.kind.origin() == family).then_some(edge.origin.as_str());
                let destination =
                    (self.kind.destination() == family).then_some(edge.destination.as_str());
                origin.into_iter().chain(destination)
            })
            .collect();
        for code in codes {
            graph.add_node(family, code, Attributes::new());
        }
    }

    /// Attach one edge per aggregate; returns how many were dropped for an
    /// endpoint without a node
    pub fn attach_edges(&self, graph: &mut FlowGraph, flows: &FlowSet) -> NetworkResult<usize> {
        if flows.kind != self.kind {
            return Err(NetworkError::KindMismatch { builder: self.kind, flows: flows.kind });
        }

        let mut dropped = 0;
        for edge in &flows.edges {
            let endpoints = (
                self.locate(graph, self.kind.origin(), &edge.origin),
                self.locate(graph, self.kind.destination(), &edge.destination),
            );
            let (Some(source), Some(target)) = endpoints else {
                dropped += 1;
                continue;
            };
            graph.add_edge(source, target, self.edge_attributes(flows, edge)?)?;
        }
        Ok(dropped)
    }

    fn locate(&self, graph: &FlowGraph, family: NodeKind, code: &str) -> Option<NodeLabel> {
        match family {
            // Seven-digit municipality codes resolve through the reference table
            NodeKind::Location => {
                let location = self.references.locations.get(code)?;
                graph.label_of(family, &location.code)
            }
            _ => graph.label_of(family, code.trim()),
        }
    }

    fn edge_attributes(&self, flows: &FlowSet, edge: &AggregateEdge) -> NetworkResult<Attributes> {
        let count_name = flows.measure.count_name();
        let sum_name = flows.measure.sum_name();

        let mut attrs = Attributes::new();
        attrs.insert(count_name.into(), AttrValue::try_from(edge.totals.count)?);
        attrs.insert(sum_name.into(), edge.totals.sum.into());

        if self.kind.has_regions() {
            attrs.insert("source_macro".into(), edge.origin_macro().into());
            attrs.insert("target_macro".into(), edge.destination_macro().into());
            attrs.insert("source_micro".into(), edge.origin_micro().into());
            attrs.insert("target_micro".into(), edge.destination_micro().into());
            attrs.insert("same_macro".into(), edge.same_macro().into());
            attrs.insert("same_micro".into(), edge.same_micro().into());
        }

        for key in &flows.strata_keys {
            let totals = edge.strata.get(key).copied().unwrap_or_default();
            attrs.insert(format!("{}_{}", count_name, key), AttrValue::try_from(totals.count)?);
            attrs.insert(format!("{}_{}", sum_name, key), totals.sum.into());
        }
        Ok(attrs)
    }

    /// Nodes, edges and graph metadata for a flow set
    pub fn build(&self, flows: &FlowSet) -> NetworkResult<FlowGraph> {
        let mut graph = self.define_nodes(flows);
        let dropped = self.attach_edges(&mut graph, flows)?;

        graph.set_attribute("kind", self.kind.name());
        graph.set_attribute("measure", flows.measure.to_string());
        if let Some((first, last)) = flows.period {
            graph.set_attribute("init_period", first.format(DATETIME_FORMAT).to_string());
            graph.set_attribute("final_period", last.format(DATETIME_FORMAT).to_string());
        }
        let total_dropped = flows.dropped_unresolved + dropped;
        graph.set_attribute("dropped_edges", AttrValue::try_from(total_dropped)?);

        if dropped > 0 {
            debug!(dropped, "edges without a node left out");
        }
        info!(
            kind = %self.kind,
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            dropped = total_dropped,
            "network built"
        );
        Ok(graph)
    }
}
