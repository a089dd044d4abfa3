use crate::error::GraphError;
use petgraph::graph::{NodeIndex, UnGraph};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use geonet_protocol::NodeId;

/// Simple undirected view of one network.
///
/// Node indices follow ascending node id, so index order and id order agree.
#[derive(Debug, Clone, Default)]
pub struct NetworkGraph {
    pub(crate) graph: UnGraph<NodeId, ()>,

    /// Node id -> NodeIndex mapping
    pub(crate) index: HashMap<NodeId, NodeIndex>,

    /// Edges in their stored direction, without self-loops or duplicates
    pub(crate) directed_edges: BTreeSet<(NodeId, NodeId)>,
}

impl NetworkGraph {
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    #[must_use]
    pub fn contains(&self, node: NodeId) -> bool {
        self.index.contains_key(&node)
    }

    /// Node ids in ascending order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.graph.node_indices().map(move |idx| self.graph[idx])
    }

    pub(crate) fn node_id(&self, idx: usize) -> NodeId {
        self.graph[NodeIndex::new(idx)]
    }

    /// Sorted neighbor lists by node index.
    pub(crate) fn neighbor_lists(&self) -> Vec<Vec<usize>> {
        self.graph
            .node_indices()
            .map(|node| {
                let mut neighbors: Vec<usize> =
                    self.graph.neighbors(node).map(NodeIndex::index).collect();
                neighbors.sort_unstable();
                neighbors.dedup();
                neighbors
            })
            .collect()
    }
}

/// Node ranking criteria.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CentralityMeasure {
    Betweenness,
    Degree,
    Information,
    Eigenvector,
    Load,
    Closeness,
    SecondOrder,
}

impl CentralityMeasure {
    pub const ALL: [CentralityMeasure; 7] = [
        CentralityMeasure::Betweenness,
        CentralityMeasure::Degree,
        CentralityMeasure::Information,
        CentralityMeasure::Eigenvector,
        CentralityMeasure::Load,
        CentralityMeasure::Closeness,
        CentralityMeasure::SecondOrder,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            CentralityMeasure::Betweenness => "betweenness",
            CentralityMeasure::Degree => "degree",
            CentralityMeasure::Information => "information",
            CentralityMeasure::Eigenvector => "eigenvector",
            CentralityMeasure::Load => "load",
            CentralityMeasure::Closeness => "closeness",
            CentralityMeasure::SecondOrder => "second_order",
        }
    }
}

impl fmt::Display for CentralityMeasure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CentralityMeasure {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        CentralityMeasure::ALL
            .into_iter()
            .find(|measure| measure.as_str() == trimmed)
            .ok_or_else(|| GraphError::UnknownMeasure(trimmed.to_string()))
    }
}
