//! Network construction from aggregated flows

mod builder;
mod graph;

pub use builder::NetworkBuilder;
pub use graph::{AttrValue, Attributes, FlowGraph, GraphEdge, GraphNode};

use crate::flow::FlowKind;
use crate::reference::NodeLabel;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Edge {from} -> {to} already exists")]
    DuplicateEdge { from: NodeLabel, to: NodeLabel },

    #[error("Label {label} is outside the {count} nodes of the graph")]
    LabelOutOfRange { label: NodeLabel, count: usize },

    #[error("A {builder} builder cannot take {flows} flows")]
    KindMismatch { builder: FlowKind, flows: FlowKind },

    #[error("Count {0} does not fit a graph attribute")]
    IntegerOverflow(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type NetworkResult<T> = Result<T, NetworkError>;
