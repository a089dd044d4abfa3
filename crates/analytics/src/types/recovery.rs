use crate::context::AnalysisContext;
use crate::error::{AnalyticsError, Result};
use crate::inputs::InputCheck;
use crate::registry::{task_options, type_tags, AnalysisType, TaskBody};
use geonet_graph::{CentralityMeasure, NetworkGraph};
use geonet_ledger::LedgerEntry;
use geonet_protocol::{JsonMap, NetworkId, NewChart, NodeId, ProjectId, TaskResult, TaskType};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

/// How failed nodes are brought back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryMode {
    Random,
    /// Most central node first
    Centrality(CentralityMeasure),
}

impl fmt::Display for RecoveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoveryMode::Random => f.write_str("random"),
            RecoveryMode::Centrality(measure) => write!(f, "{measure}"),
        }
    }
}

impl FromStr for RecoveryMode {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed == "random" {
            return Ok(RecoveryMode::Random);
        }
        trimmed
            .parse::<CentralityMeasure>()
            .map(RecoveryMode::Centrality)
            .map_err(|_| AnalyticsError::InvalidInputs(format!("Unknown recovery mode: {trimmed}")))
    }
}

impl RecoveryMode {
    #[must_use]
    pub fn all_names() -> Vec<String> {
        std::iter::once("random".to_string())
            .chain(CentralityMeasure::ALL.iter().map(|m| m.as_str().to_string()))
            .collect()
    }
}

/// One point of the GCC timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelineStep {
    pub deactivated: usize,
    pub gcc: usize,
}

/// Order `failed` for recovery. Centrality modes sort by the node's position in the
/// descending ranking; equal positions keep ascending id order.
pub fn recovery_order(
    graph: &NetworkGraph,
    failed: &BTreeSet<NodeId>,
    mode: RecoveryMode,
    seed: Option<u64>,
) -> Result<Vec<NodeId>> {
    let mut order: Vec<NodeId> = failed.iter().copied().collect();
    match mode {
        RecoveryMode::Random => {
            let mut rng = match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            order.shuffle(&mut rng);
        }
        RecoveryMode::Centrality(measure) => {
            let rank: HashMap<NodeId, usize> = graph
                .centrality_ranking(measure)?
                .into_iter()
                .enumerate()
                .map(|(position, id)| (id, position))
                .collect();
            order.sort_by_key(|id| rank.get(id).copied().unwrap_or(usize::MAX));
        }
    }
    Ok(order)
}

/// GCC size after each failure frame, then after each single recovery starting from the
/// last frame's failures.
#[must_use]
pub fn gcc_timeline(
    graph: &NetworkGraph,
    frames: &[BTreeSet<NodeId>],
    order: &[NodeId],
) -> Vec<TimelineStep> {
    let mut timeline: Vec<TimelineStep> = frames
        .iter()
        .map(|failed| TimelineStep {
            deactivated: failed.len(),
            gcc: graph.greatest_connected_component(failed).len(),
        })
        .collect();
    let mut excluded = frames.last().cloned().unwrap_or_default();
    for node in order {
        excluded.remove(node);
        timeline.push(TimelineStep {
            deactivated: excluded.len(),
            gcc: graph.greatest_connected_component(&excluded).len(),
        });
    }
    timeline
}

/// Mean GCC share over the timeline, in `[0, 1]`; zero for an empty graph or timeline.
#[must_use]
pub fn resiliency_score(timeline: &[TimelineStep], node_count: usize) -> f64 {
    if timeline.is_empty() || node_count == 0 {
        return 0.0;
    }
    let total: usize = timeline.iter().map(|step| step.gcc.min(node_count)).sum();
    total as f64 / (node_count as f64 * timeline.len() as f64)
}

/// Parse `{frame: [node ids]}` into sets ordered by numeric frame index.
fn parse_failures(value: &Value) -> Option<Vec<BTreeSet<NodeId>>> {
    let object = value.as_object()?;
    let mut frames: BTreeMap<u64, BTreeSet<NodeId>> = BTreeMap::new();
    for (frame, ids) in object {
        let frame: u64 = frame.trim().parse().ok()?;
        let ids = ids
            .as_array()?
            .iter()
            .map(Value::as_u64)
            .collect::<Option<BTreeSet<_>>>()?;
        frames.insert(frame, ids);
    }
    Some(frames.into_values().collect())
}

fn upstream_network(result: &TaskResult) -> Option<NetworkId> {
    let value = result.output("network").or_else(|| result.inputs.get("network"))?;
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

pub struct NetworkRecovery {
    upstream: Vec<TaskType>,
    enabled: bool,
}

impl NetworkRecovery {
    /// `upstream` lists the task types whose results carry `failures`.
    #[must_use]
    pub fn new(upstream: Vec<TaskType>, enabled: bool) -> Self {
        Self { upstream, enabled }
    }
}

impl AnalysisType for NetworkRecovery {
    fn name(&self) -> &'static str {
        "Network Recovery"
    }

    fn description(&self) -> &'static str {
        "Order the failed nodes of a failure simulation for recovery and track the size of \
         the greatest connected component across failure and recovery."
    }

    fn attribution(&self) -> &'static str {
        "Northeastern University"
    }

    fn task_type(&self) -> TaskType {
        TaskType::NetworkRecovery
    }

    fn input_types(&self) -> JsonMap {
        type_tags(&[
            ("node_failure_simulation", "TaskResult"),
            ("recovery_mode", "string"),
            ("seed", "number"),
        ])
    }

    fn output_types(&self) -> JsonMap {
        type_tags(&[
            ("recoveries", "object"),
            ("gcc_chart", "Chart"),
            ("resiliency_score", "number"),
        ])
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn input_options(&self, ctx: &AnalysisContext, project_id: ProjectId) -> Result<JsonMap> {
        let mut options = JsonMap::new();
        options.insert(
            "node_failure_simulation".into(),
            task_options(ctx, project_id, &self.upstream)?,
        );
        options.insert("recovery_mode".into(), json!(RecoveryMode::all_names()));
        Ok(options)
    }

    fn precheck(&self, inputs: &JsonMap) -> Result<()> {
        if let Some(Value::String(mode)) = inputs.get("recovery_mode") {
            mode.parse::<RecoveryMode>()?;
        }
        Ok(())
    }

    fn execute(&self, ctx: AnalysisContext, entry: LedgerEntry) -> TaskBody {
        let upstream_types = self.upstream.clone();
        Box::pin(async move {
            let inputs = entry.snapshot().inputs;
            let check = InputCheck::new(&entry, &inputs);

            let upstream = check.upstream(
                "node_failure_simulation",
                ctx.tasks.as_ref(),
                &upstream_types,
            );
            let mode = check
                .string("recovery_mode")
                .and_then(|mode| match mode.parse::<RecoveryMode>() {
                    Ok(mode) => Some(mode),
                    Err(e) => {
                        check.error(e);
                        None
                    }
                });
            let seed = check.optional_number("seed").map(|seed| seed as u64);

            let frames = upstream.as_ref().and_then(|result| {
                let frames = result.output("failures").and_then(parse_failures);
                if frames.is_none() {
                    check.error(format!("Task result {} has no valid failures output", result.id));
                }
                frames
            });
            let network = upstream.as_ref().and_then(|result| {
                let Some(id) = upstream_network(result) else {
                    check.error(format!("Task result {} does not name a network", result.id));
                    return None;
                };
                match ctx.networks.get_network(id) {
                    Ok(network) => Some(network),
                    Err(_) => {
                        check.error(format!("Network {id} not found"));
                        None
                    }
                }
            });

            let (Some(upstream), Some(mode), Some(frames), Some(network)) =
                (upstream, mode, frames, network)
            else {
                return Ok(());
            };
            if entry.has_error() {
                return Ok(());
            }

            entry.rename(format!("Network Recovery: {} ({mode})", network.name));
            entry.write_status("Building network graph");
            let nodes = ctx.networks.network_nodes(network.id)?;
            let edges = ctx.networks.network_edges(network.id)?;
            let graph = NetworkGraph::from_records(&nodes, &edges);

            entry.write_status(format!("Ordering recoveries by {mode}"));
            let last_failed = frames.last().cloned().unwrap_or_default();
            let order = recovery_order(&graph, &last_failed, mode, seed)?;

            entry.write_status("Computing connected components");
            let timeline = gcc_timeline(&graph, &frames, &order);
            let score = resiliency_score(&timeline, graph.node_count());

            let labels: Vec<usize> = (0..timeline.len()).collect();
            let chart = ctx.charts.create_chart(NewChart {
                project_id: entry.project_id(),
                name: format!("{} GCC size ({mode} recovery)", network.name),
                description: format!(
                    "Greatest connected component size over {} failure frame(s) and {} recovery step(s)",
                    frames.len(),
                    order.len()
                ),
                chart_data: json!({
                    "labels": labels,
                    "datasets": [
                        {"label": "GCC Size", "data": timeline.iter().map(|s| s.gcc).collect::<Vec<_>>()},
                        {"label": "Deactivated Nodes", "data": timeline.iter().map(|s| s.deactivated).collect::<Vec<_>>()},
                    ],
                }),
                metadata: [
                    ("task_result".to_string(), json!(entry.id())),
                    ("upstream".to_string(), json!(upstream.id)),
                    ("resiliency_score".to_string(), json!(score)),
                ]
                .into_iter()
                .collect(),
            })?;

            let mut recoveries = JsonMap::new();
            for step in 0..order.len() {
                recoveries.insert(step.to_string(), json!(&order[..=step]));
            }
            let mut outputs = JsonMap::new();
            outputs.insert("recoveries".into(), Value::Object(recoveries));
            outputs.insert("gcc_chart".into(), json!(chart.id));
            outputs.insert("resiliency_score".into(), json!(score));
            entry.set_outputs(outputs);
            log::info!(
                "Recovery of network {} scored {score:.4} over {} steps",
                network.id,
                timeline.len()
            );
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    /// 1-2-3 triangle bridged through 4 to the 5-6 pair.
    fn two_clusters() -> NetworkGraph {
        NetworkGraph::from_edges(1..=6, [(1, 2), (2, 3), (1, 3), (3, 4), (4, 5), (5, 6)])
    }

    #[test]
    fn modes_parse_by_name() {
        assert_eq!("random".parse::<RecoveryMode>().unwrap(), RecoveryMode::Random);
        assert_eq!(
            " betweenness ".parse::<RecoveryMode>().unwrap(),
            RecoveryMode::Centrality(CentralityMeasure::Betweenness)
        );
        assert!("fastest".parse::<RecoveryMode>().is_err());
        assert_eq!(RecoveryMode::all_names().len(), 1 + CentralityMeasure::ALL.len());
    }

    #[test]
    fn centrality_order_puts_cut_vertices_first() {
        let graph = two_clusters();
        let failed = BTreeSet::from([1, 4, 6]);
        let order = recovery_order(
            &graph,
            &failed,
            RecoveryMode::Centrality(CentralityMeasure::Betweenness),
            None,
        )
        .unwrap();
        assert_eq!(order[0], 4);
        // 1 and 6 both have zero betweenness; ascending id breaks the tie.
        assert_eq!(&order[1..], &[1, 6]);
    }

    #[test]
    fn seeded_random_order_is_reproducible() {
        let graph = two_clusters();
        let failed: BTreeSet<NodeId> = (1..=6).collect();
        let a = recovery_order(&graph, &failed, RecoveryMode::Random, Some(7)).unwrap();
        let b = recovery_order(&graph, &failed, RecoveryMode::Random, Some(7)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.iter().copied().collect::<BTreeSet<_>>(), failed);
    }

    #[test]
    fn timeline_covers_failures_then_recoveries() {
        let graph = two_clusters();
        let frames = vec![BTreeSet::from([4]), BTreeSet::from([4, 1])];
        let timeline = gcc_timeline(&graph, &frames, &[4, 1]);
        let gcc: Vec<usize> = timeline.iter().map(|s| s.gcc).collect();
        assert_eq!(gcc, vec![3, 2, 5, 6]);
        assert_eq!(timeline[1].deactivated, 2);
        assert_eq!(timeline[3].deactivated, 0);

        let score = resiliency_score(&timeline, 6);
        assert!((score - 16.0 / 24.0).abs() < 1e-12);
    }

    #[test]
    fn failures_parse_in_numeric_frame_order() {
        let value = json!({"10": [3], "2": [1, 2], "0": []});
        let frames = parse_failures(&value).unwrap();
        assert_eq!(frames, vec![BTreeSet::new(), BTreeSet::from([1, 2]), BTreeSet::from([3])]);
        assert!(parse_failures(&json!({"x": [1]})).is_none());
        assert!(parse_failures(&json!([1, 2])).is_none());
    }

    #[test]
    fn empty_inputs_score_zero() {
        assert_eq!(resiliency_score(&[], 5), 0.0);
        assert_eq!(resiliency_score(&[TimelineStep { deactivated: 0, gcc: 0 }], 0), 0.0);
    }

    proptest! {
        #[test]
        fn score_stays_within_unit_interval(
            edges in proptest::collection::vec((1u64..12, 1u64..12), 0..25),
            failed in proptest::collection::btree_set(1u64..12, 0..8),
            seed in any::<u64>(),
        ) {
            let graph = NetworkGraph::from_edges(1..12, edges);
            let frames = vec![failed.clone()];
            let order = recovery_order(&graph, &failed, RecoveryMode::Random, Some(seed)).unwrap();
            let timeline = gcc_timeline(&graph, &frames, &order);
            let score = resiliency_score(&timeline, graph.node_count());
            prop_assert!((0.0..=1.0).contains(&score));
            prop_assert_eq!(timeline.len(), 1 + failed.len());
        }
    }
}
