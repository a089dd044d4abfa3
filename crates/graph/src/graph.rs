use crate::types::NetworkGraph;
use geonet_protocol::NodeId;
use petgraph::graph::NodeIndex;
use petgraph::visit::{Bfs, NodeFiltered};
use std::collections::{BTreeMap, BTreeSet, HashSet};

impl NetworkGraph {
    /// Neighbor lists keyed by node id, each sorted ascending. Undirected adjacency lists
    /// every edge under both endpoints; directed adjacency only under its `from` node.
    #[must_use]
    pub fn build_adjacency(&self, directed: bool) -> BTreeMap<NodeId, Vec<NodeId>> {
        let mut adjacency: BTreeMap<NodeId, Vec<NodeId>> =
            self.node_ids().map(|id| (id, Vec::new())).collect();
        for &(from, to) in &self.directed_edges {
            if let Some(list) = adjacency.get_mut(&from) {
                list.push(to);
            }
            if !directed {
                if let Some(list) = adjacency.get_mut(&to) {
                    list.push(from);
                }
            }
        }
        for list in adjacency.values_mut() {
            list.sort_unstable();
            list.dedup();
        }
        adjacency
    }

    /// Largest connected component once `excluded` nodes (and their edges) are removed.
    ///
    /// Components are discovered from the smallest remaining node id upward and only a
    /// strictly larger component replaces the current best, so ties go to the component
    /// holding the smallest id. Empty when no node remains.
    #[must_use]
    pub fn greatest_connected_component(&self, excluded: &BTreeSet<NodeId>) -> BTreeSet<NodeId> {
        let excluded_idx: HashSet<NodeIndex> = excluded
            .iter()
            .filter_map(|id| self.index.get(id).copied())
            .collect();
        let filtered = NodeFiltered::from_fn(&self.graph, |node| !excluded_idx.contains(&node));

        let mut seen: HashSet<NodeIndex> = HashSet::new();
        let mut best: Vec<NodeIndex> = Vec::new();
        for start in self.graph.node_indices() {
            if excluded_idx.contains(&start) || seen.contains(&start) {
                continue;
            }
            let mut component = Vec::new();
            let mut bfs = Bfs::new(&filtered, start);
            while let Some(node) = bfs.next(&filtered) {
                seen.insert(node);
                component.push(node);
            }
            if component.len() > best.len() {
                best = component;
            }
        }
        best.into_iter().map(|idx| self.graph[idx]).collect()
    }

    /// Connected components as sorted node indices, ordered by their smallest member.
    pub(crate) fn components(&self, neighbors: &[Vec<usize>]) -> Vec<Vec<usize>> {
        let mut seen = vec![false; neighbors.len()];
        let mut components = Vec::new();
        for start in 0..neighbors.len() {
            if seen[start] {
                continue;
            }
            seen[start] = true;
            let mut component = vec![start];
            let mut cursor = 0;
            while cursor < component.len() {
                let node = component[cursor];
                cursor += 1;
                for &next in &neighbors[node] {
                    if !seen[next] {
                        seen[next] = true;
                        component.push(next);
                    }
                }
            }
            component.sort_unstable();
            components.push(component);
        }
        components
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn bridge() -> NetworkGraph {
        // 1-2-3 bridged by 3-4 to 4-5-6
        NetworkGraph::from_edges(1..=6, [(1, 2), (2, 3), (3, 4), (4, 5), (5, 6)])
    }

    #[test]
    fn adjacency_lists_are_sorted() {
        let graph = NetworkGraph::from_edges([1, 2, 3], [(3, 1), (2, 1)]);
        let undirected = graph.build_adjacency(false);
        assert_eq!(undirected[&1], vec![2, 3]);
        assert_eq!(undirected[&2], vec![1]);

        let directed = graph.build_adjacency(true);
        assert_eq!(directed[&1], Vec::<NodeId>::new());
        assert_eq!(directed[&3], vec![1]);
    }

    #[test]
    fn removing_a_bridge_end_splits_the_graph() {
        let graph = bridge();
        assert_eq!(graph.greatest_connected_component(&BTreeSet::new()).len(), 6);
        assert_eq!(
            graph.greatest_connected_component(&BTreeSet::from([3])),
            BTreeSet::from([4, 5, 6])
        );
    }

    #[test]
    fn equal_components_resolve_to_smallest_id() {
        let graph = NetworkGraph::from_edges([10, 20, 30, 40], [(30, 40), (10, 20)]);
        assert_eq!(
            graph.greatest_connected_component(&BTreeSet::new()),
            BTreeSet::from([10, 20])
        );
    }

    #[test]
    fn excluding_everything_leaves_nothing() {
        let graph = bridge();
        let all: BTreeSet<NodeId> = (1..=6).collect();
        assert!(graph.greatest_connected_component(&all).is_empty());
        assert!(NetworkGraph::default()
            .greatest_connected_component(&BTreeSet::new())
            .is_empty());
    }
}
