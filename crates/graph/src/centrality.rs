use crate::error::{GraphError, Result};
use crate::types::{CentralityMeasure, NetworkGraph};
use geonet_protocol::NodeId;
use nalgebra::{DMatrix, DVector};
use std::cmp::Ordering;
use std::collections::{BTreeMap, VecDeque};

const EIGENVECTOR_MAX_ITERATIONS: usize = 10_000;
const EIGENVECTOR_TOLERANCE: f64 = 1e-6;

impl NetworkGraph {
    /// Score of every node under `measure`.
    pub fn centrality_scores(&self, measure: CentralityMeasure) -> Result<BTreeMap<NodeId, f64>> {
        let neighbors = self.neighbor_lists();
        let scores = match measure {
            CentralityMeasure::Betweenness => betweenness(&neighbors),
            CentralityMeasure::Degree => degree(&neighbors),
            CentralityMeasure::Closeness => closeness(&neighbors),
            CentralityMeasure::Eigenvector => eigenvector(&neighbors),
            CentralityMeasure::Load => load(&neighbors),
            CentralityMeasure::Information => {
                per_component(self, &neighbors, information_component)?
            }
            CentralityMeasure::SecondOrder => {
                per_component(self, &neighbors, second_order_component)?
            }
        };
        Ok(scores
            .into_iter()
            .enumerate()
            .map(|(idx, score)| (self.node_id(idx), score))
            .collect())
    }

    /// Node ids by descending score; equal scores keep ascending id order.
    pub fn centrality_ranking(&self, measure: CentralityMeasure) -> Result<Vec<NodeId>> {
        let mut scored: Vec<(NodeId, f64)> = self.centrality_scores(measure)?.into_iter().collect();
        scored.sort_by(|(a_id, a), (b_id, b)| {
            b.partial_cmp(a)
                .unwrap_or(Ordering::Equal)
                .then(a_id.cmp(b_id))
        });
        Ok(scored.into_iter().map(|(id, _)| id).collect())
    }
}

fn degree(neighbors: &[Vec<usize>]) -> Vec<f64> {
    let n = neighbors.len();
    if n <= 1 {
        return vec![1.0; n];
    }
    let scale = 1.0 / (n as f64 - 1.0);
    neighbors.iter().map(|list| list.len() as f64 * scale).collect()
}

/// Unweighted hop distances from `source`; `None` for unreachable nodes.
fn bfs_distances(neighbors: &[Vec<usize>], source: usize) -> Vec<Option<usize>> {
    let mut dist = vec![None; neighbors.len()];
    dist[source] = Some(0);
    let mut queue = VecDeque::from([source]);
    while let Some(v) = queue.pop_front() {
        let next = dist[v].map_or(0, |d| d + 1);
        for &w in &neighbors[v] {
            if dist[w].is_none() {
                dist[w] = Some(next);
                queue.push_back(w);
            }
        }
    }
    dist
}

fn closeness(neighbors: &[Vec<usize>]) -> Vec<f64> {
    let n = neighbors.len();
    (0..n)
        .map(|u| {
            let dist = bfs_distances(neighbors, u);
            let reached: Vec<usize> = dist.iter().flatten().copied().collect();
            let total: usize = reached.iter().sum();
            if total == 0 || n <= 1 {
                return 0.0;
            }
            // Wasserman-Faust scaling for disconnected graphs.
            let others = (reached.len() - 1) as f64;
            (others / total as f64) * (others / (n as f64 - 1.0))
        })
        .collect()
}

struct ShortestPaths {
    order: Vec<usize>,
    preds: Vec<Vec<usize>>,
    sigma: Vec<f64>,
}

fn shortest_paths(neighbors: &[Vec<usize>], source: usize) -> ShortestPaths {
    let n = neighbors.len();
    let mut order = Vec::with_capacity(n);
    let mut preds = vec![Vec::new(); n];
    let mut sigma = vec![0.0; n];
    let mut dist: Vec<Option<usize>> = vec![None; n];
    sigma[source] = 1.0;
    dist[source] = Some(0);

    let mut queue = VecDeque::from([source]);
    while let Some(v) = queue.pop_front() {
        order.push(v);
        let dv = dist[v].unwrap_or(0);
        for &w in &neighbors[v] {
            if dist[w].is_none() {
                dist[w] = Some(dv + 1);
                queue.push_back(w);
            }
            if dist[w] == Some(dv + 1) {
                sigma[w] += sigma[v];
                preds[w].push(v);
            }
        }
    }
    ShortestPaths { order, preds, sigma }
}

/// Brandes accumulation, normalized by `1 / ((n-1)(n-2))`.
fn betweenness(neighbors: &[Vec<usize>]) -> Vec<f64> {
    let n = neighbors.len();
    let mut scores = vec![0.0; n];
    for source in 0..n {
        let paths = shortest_paths(neighbors, source);
        let mut delta = vec![0.0; n];
        for &w in paths.order.iter().rev() {
            for &v in &paths.preds[w] {
                delta[v] += paths.sigma[v] / paths.sigma[w] * (1.0 + delta[w]);
            }
            if w != source {
                scores[w] += delta[w];
            }
        }
    }
    rescale_pairs(&mut scores);
    scores
}

/// Newman load: one unit of flow per reachable target, split evenly between predecessors.
fn load(neighbors: &[Vec<usize>]) -> Vec<f64> {
    let n = neighbors.len();
    let mut scores = vec![0.0; n];
    for source in 0..n {
        let paths = shortest_paths(neighbors, source);
        let mut flow = vec![0.0; n];
        for &v in &paths.order {
            flow[v] = 1.0;
        }
        for &v in paths.order.iter().rev() {
            let preds = &paths.preds[v];
            if preds.is_empty() {
                continue;
            }
            let share = flow[v] / preds.len() as f64;
            for &x in preds {
                if x == source {
                    break;
                }
                flow[x] += share;
            }
        }
        for &v in &paths.order {
            scores[v] += flow[v] - 1.0;
        }
    }
    rescale_pairs(&mut scores);
    scores
}

fn rescale_pairs(scores: &mut [f64]) {
    let n = scores.len();
    if n <= 2 {
        return;
    }
    let scale = 1.0 / ((n as f64 - 1.0) * (n as f64 - 2.0));
    for score in scores.iter_mut() {
        *score *= scale;
    }
}

/// Power iteration on `A + I` starting from the uniform vector.
fn eigenvector(neighbors: &[Vec<usize>]) -> Vec<f64> {
    let n = neighbors.len();
    if n == 0 {
        return Vec::new();
    }
    let mut x = vec![1.0 / n as f64; n];
    for _ in 0..EIGENVECTOR_MAX_ITERATIONS {
        let last = x.clone();
        for (v, list) in neighbors.iter().enumerate() {
            for &w in list {
                x[w] += last[v];
            }
        }
        let norm = x.iter().map(|v| v * v).sum::<f64>().sqrt();
        let norm = if norm == 0.0 { 1.0 } else { norm };
        for value in &mut x {
            *value /= norm;
        }
        let change: f64 = x.iter().zip(&last).map(|(a, b)| (a - b).abs()).sum();
        if change < n as f64 * EIGENVECTOR_TOLERANCE {
            return x;
        }
    }
    log::warn!(
        "Eigenvector centrality did not converge in {EIGENVECTOR_MAX_ITERATIONS} iterations; using last iterate"
    );
    x
}

/// Run a component-local measure on every connected component and stitch the scores.
fn per_component(
    graph: &NetworkGraph,
    neighbors: &[Vec<usize>],
    measure: fn(&[Vec<usize>]) -> Result<Vec<f64>>,
) -> Result<Vec<f64>> {
    let mut scores = vec![0.0; neighbors.len()];
    for component in graph.components(neighbors) {
        let local: BTreeMap<usize, usize> = component
            .iter()
            .enumerate()
            .map(|(local, global)| (*global, local))
            .collect();
        let sub: Vec<Vec<usize>> = component
            .iter()
            .map(|global| {
                neighbors[*global]
                    .iter()
                    .filter_map(|w| local.get(w).copied())
                    .collect()
            })
            .collect();
        for (local_idx, score) in measure(&sub)?.into_iter().enumerate() {
            scores[component[local_idx]] = score;
        }
    }
    Ok(scores)
}

/// Current-flow closeness: inverse of the summed effective resistance to every other node,
/// from the Laplacian grounded at the first node.
fn information_component(neighbors: &[Vec<usize>]) -> Result<Vec<f64>> {
    let n = neighbors.len();
    if n <= 1 {
        return Ok(vec![0.0; n]);
    }
    let mut grounded = DMatrix::<f64>::zeros(n - 1, n - 1);
    for (v, list) in neighbors.iter().enumerate().skip(1) {
        grounded[(v - 1, v - 1)] = list.len() as f64;
        for &w in list {
            if w > 0 {
                grounded[(v - 1, w - 1)] -= 1.0;
            }
        }
    }
    let inv = grounded
        .try_inverse()
        .ok_or(GraphError::SingularMatrix("information centrality"))?;
    let c = |a: usize, b: usize| if a == 0 || b == 0 { 0.0 } else { inv[(a - 1, b - 1)] };

    Ok((0..n)
        .map(|v| {
            let resistance: f64 = (0..n).map(|w| c(v, v) + c(w, w) - 2.0 * c(v, w)).sum();
            if resistance > 0.0 {
                1.0 / resistance
            } else {
                0.0
            }
        })
        .collect())
}

/// Standard deviation of random-walk return times on the degree-balanced walk.
fn second_order_component(neighbors: &[Vec<usize>]) -> Result<Vec<f64>> {
    let n = neighbors.len();
    if n <= 1 {
        return Ok(vec![0.0; n]);
    }
    let d_max = neighbors.iter().map(Vec::len).max().unwrap_or(0) as f64;

    // Self-loops top every node up to d_max, so each row sums to one after scaling.
    let mut p = DMatrix::<f64>::zeros(n, n);
    for (v, list) in neighbors.iter().enumerate() {
        for &w in list {
            p[(v, w)] = 1.0 / d_max;
        }
        p[(v, v)] += (d_max - list.len() as f64) / d_max;
    }

    let ones = DVector::<f64>::repeat(n, 1.0);
    let mut scores = Vec::with_capacity(n);
    for i in 0..n {
        let mut system = DMatrix::<f64>::identity(n, n) - &p;
        // Walks are absorbed on arrival at `i`: drop column `i` of P.
        system.column_mut(i).fill(0.0);
        system[(i, i)] = 1.0;
        let m = system
            .lu()
            .solve(&ones)
            .ok_or(GraphError::SingularMatrix("second order centrality"))?;
        let total: f64 = m.sum();
        scores.push((2.0 * total - (n * (n + 1)) as f64).max(0.0).sqrt());
    }
    Ok(scores)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn path(n: u64) -> NetworkGraph {
        NetworkGraph::from_edges(1..=n, (1..n).map(|i| (i, i + 1)))
    }

    fn star() -> NetworkGraph {
        NetworkGraph::from_edges(1..=5, [(1, 2), (1, 3), (1, 4), (1, 5)])
    }

    fn assert_close(actual: &BTreeMap<NodeId, f64>, expected: &[(NodeId, f64)]) {
        for (id, value) in expected {
            let got = actual[id];
            assert!((got - value).abs() < 1e-6, "node {id}: {got} vs {value}");
        }
    }

    #[test]
    fn degree_scales_by_other_nodes() {
        let scores = star().centrality_scores(CentralityMeasure::Degree).unwrap();
        assert_close(&scores, &[(1, 1.0), (2, 0.25)]);
        let single = NetworkGraph::from_edges([7], []);
        assert_close(&single.centrality_scores(CentralityMeasure::Degree).unwrap(), &[(7, 1.0)]);
    }

    #[test]
    fn betweenness_of_a_path() {
        let scores = path(3).centrality_scores(CentralityMeasure::Betweenness).unwrap();
        assert_close(&scores, &[(1, 0.0), (2, 1.0), (3, 0.0)]);
        let star_scores = star().centrality_scores(CentralityMeasure::Betweenness).unwrap();
        assert_close(&star_scores, &[(1, 1.0), (2, 0.0)]);
    }

    #[test]
    fn load_matches_betweenness_on_trees() {
        for graph in [path(5), star()] {
            let load = graph.centrality_scores(CentralityMeasure::Load).unwrap();
            let betweenness = graph.centrality_scores(CentralityMeasure::Betweenness).unwrap();
            for (id, value) in &betweenness {
                assert!((load[id] - value).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn closeness_uses_wasserman_faust_scaling() {
        // Path 1-2-3 plus isolated 4.
        let graph = NetworkGraph::from_edges(1..=4, [(1, 2), (2, 3)]);
        let scores = graph.centrality_scores(CentralityMeasure::Closeness).unwrap();
        assert_close(&scores, &[(2, 2.0 / 3.0), (1, (2.0 / 3.0) * (2.0 / 3.0)), (4, 0.0)]);
    }

    #[test]
    fn eigenvector_is_symmetric_on_a_cycle() {
        let graph = NetworkGraph::from_edges(1..=4, [(1, 2), (2, 3), (3, 4), (4, 1)]);
        let scores = graph.centrality_scores(CentralityMeasure::Eigenvector).unwrap();
        assert_close(&scores, &[(1, 0.5), (2, 0.5), (3, 0.5), (4, 0.5)]);
    }

    #[test]
    fn information_centrality_of_a_path() {
        // Resistances on 1-2-3: R(1,2)=1, R(2,3)=1, R(1,3)=2.
        let scores = path(3).centrality_scores(CentralityMeasure::Information).unwrap();
        assert_close(&scores, &[(1, 1.0 / 3.0), (2, 0.5), (3, 1.0 / 3.0)]);
    }

    #[test]
    fn information_centrality_is_solved_per_component() {
        let graph = NetworkGraph::from_edges(1..=4, [(1, 2), (3, 4)]);
        let scores = graph.centrality_scores(CentralityMeasure::Information).unwrap();
        assert_close(&scores, &[(1, 1.0), (2, 1.0), (3, 1.0), (4, 1.0)]);

        // 4-cycle: R(adjacent)=3/4, R(opposite)=1, so each node sums to 5/2.
        let cycle = NetworkGraph::from_edges(1..=4, [(1, 2), (2, 3), (3, 4), (4, 1)]);
        let scores = cycle.centrality_scores(CentralityMeasure::Information).unwrap();
        assert_close(&scores, &[(1, 0.4), (2, 0.4), (3, 0.4), (4, 0.4)]);
    }

    #[test]
    fn second_order_of_a_single_edge() {
        // Two nodes, deterministic alternation: return time is always 2.
        let graph = NetworkGraph::from_edges([1, 2], [(1, 2)]);
        let scores = graph.centrality_scores(CentralityMeasure::SecondOrder).unwrap();
        assert_close(&scores, &[(1, 0.0), (2, 0.0)]);

        let star_scores = star().centrality_scores(CentralityMeasure::SecondOrder).unwrap();
        assert!(star_scores[&1] < star_scores[&2]);
    }

    #[test]
    fn ranking_breaks_ties_by_node_id() {
        let ranking = star().centrality_ranking(CentralityMeasure::Degree).unwrap();
        assert_eq!(ranking, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn edgeless_graph_scores_without_panicking() {
        let graph = NetworkGraph::from_edges(1..=3, []);
        for measure in CentralityMeasure::ALL {
            let scores = graph.centrality_scores(measure).unwrap();
            assert_eq!(scores.len(), 3, "{measure}");
            assert!(scores.values().all(|v| v.is_finite()), "{measure}");
        }
        assert!(NetworkGraph::default()
            .centrality_scores(CentralityMeasure::Eigenvector)
            .unwrap()
            .is_empty());
    }
}
