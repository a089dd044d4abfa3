use crate::types::NetworkGraph;
use geonet_protocol::{NetworkEdge, NetworkNode, NodeId};
use petgraph::graph::UnGraph;
use std::collections::{BTreeSet, HashMap};

impl NetworkGraph {
    /// Build from persisted records. Edges referencing unknown nodes are dropped,
    /// self-loops are ignored and parallel edges collapse into one.
    #[must_use]
    pub fn from_records(nodes: &[NetworkNode], edges: &[NetworkEdge]) -> Self {
        Self::from_edges(
            nodes.iter().map(|node| node.id),
            edges.iter().map(|edge| (edge.from_node, edge.to_node)),
        )
    }

    pub fn from_edges(
        nodes: impl IntoIterator<Item = NodeId>,
        edges: impl IntoIterator<Item = (NodeId, NodeId)>,
    ) -> Self {
        let ids: BTreeSet<NodeId> = nodes.into_iter().collect();
        let mut graph = UnGraph::with_capacity(ids.len(), 0);
        let mut index = HashMap::with_capacity(ids.len());
        for id in ids {
            index.insert(id, graph.add_node(id));
        }

        let mut directed_edges = BTreeSet::new();
        let mut dropped = 0usize;
        for (from, to) in edges {
            let (Some(&a), Some(&b)) = (index.get(&from), index.get(&to)) else {
                dropped += 1;
                continue;
            };
            if a == b {
                continue;
            }
            graph.update_edge(a, b, ());
            directed_edges.insert((from, to));
        }
        if dropped > 0 {
            log::warn!("Dropped {dropped} edges referencing nodes outside the graph");
        }

        Self {
            graph,
            index,
            directed_edges,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_parallel_edges_and_ignores_loops() {
        let graph = NetworkGraph::from_edges([3, 1, 2], [(1, 2), (2, 1), (1, 2), (3, 3), (1, 9)]);
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.node_ids().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert!(graph.contains(3));
        assert!(!graph.contains(9));
    }
}
