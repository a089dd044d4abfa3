use geo::{LineString, Point};
use geonet_graph::{CentralityMeasure, GraphError, NetworkGraph};
use geonet_protocol::{JsonMap, NetworkEdge, NetworkNode, NodeId};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::collections::BTreeSet;

fn node(id: NodeId) -> NetworkNode {
    NetworkNode {
        id,
        network_id: 1,
        name: String::new(),
        location: Point::new(id as f64, 0.0),
        metadata: JsonMap::new(),
    }
}

fn edge(id: u64, from_node: NodeId, to_node: NodeId) -> NetworkEdge {
    NetworkEdge {
        id,
        network_id: 1,
        name: String::new(),
        line: LineString::from(vec![(from_node as f64, 0.0), (to_node as f64, 0.0)]),
        metadata: JsonMap::new(),
        from_node,
        to_node,
    }
}

/// Cluster {1,2,3} and cluster {5,6}, both fully connected, joined through bridge node 4.
fn two_clusters() -> NetworkGraph {
    let nodes: Vec<NetworkNode> = (1..=6).map(node).collect();
    let edges = vec![
        edge(100, 1, 2),
        edge(101, 2, 3),
        edge(102, 1, 3),
        edge(103, 3, 4),
        edge(104, 4, 5),
        edge(105, 5, 6),
    ];
    NetworkGraph::from_records(&nodes, &edges)
}

#[test]
fn excluding_the_bridge_keeps_the_larger_cluster() {
    let graph = two_clusters();
    assert_eq!(
        graph.greatest_connected_component(&BTreeSet::from([4])),
        BTreeSet::from([1, 2, 3])
    );
}

#[test]
fn cut_vertices_lead_betweenness_ranking() {
    // 3 and 4 each separate six pairs; the tie keeps ascending id order.
    let ranking = two_clusters()
        .centrality_ranking(CentralityMeasure::Betweenness)
        .unwrap();
    assert_eq!(&ranking[..3], &[3, 4, 5]);
    assert_eq!(ranking.len(), 6);
}

#[test]
fn dangling_edges_are_dropped() {
    let nodes: Vec<NetworkNode> = (1..=2).map(node).collect();
    let graph = NetworkGraph::from_records(&nodes, &[edge(1, 1, 2), edge(2, 2, 99)]);
    assert_eq!(graph.edge_count(), 1);
    assert_eq!(graph.build_adjacency(false)[&2], vec![1]);
}

#[test]
fn unknown_measures_are_rejected_by_name() {
    assert_eq!(
        "pagerank".parse::<CentralityMeasure>(),
        Err(GraphError::UnknownMeasure("pagerank".into()))
    );
    for measure in CentralityMeasure::ALL {
        assert_eq!(measure.as_str().parse::<CentralityMeasure>(), Ok(measure));
    }
}

#[test]
fn information_is_computed_per_component() {
    // Two disjoint edges behave like two independent two-node graphs.
    let graph = NetworkGraph::from_edges(1..=4, [(1, 2), (3, 4)]);
    let scores = graph
        .centrality_scores(CentralityMeasure::Information)
        .unwrap();
    for id in 1..=4 {
        assert!((scores[&id] - 1.0).abs() < 1e-9);
    }
}

proptest! {
    #[test]
    fn gcc_is_never_larger_than_remaining_nodes(
        edges in proptest::collection::vec((1u64..15, 1u64..15), 0..30),
        excluded in proptest::collection::btree_set(1u64..15, 0..6),
    ) {
        let graph = NetworkGraph::from_edges(1..15, edges);
        let gcc = graph.greatest_connected_component(&excluded);
        prop_assert!(gcc.len() <= 14 - excluded.len());
        prop_assert!(gcc.is_disjoint(&excluded));
    }
}
