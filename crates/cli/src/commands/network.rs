use crate::workspace::Workspace;
use anyhow::{Context, Result};
use clap::Args;
use geonet_graph::{CentralityMeasure, NetworkGraph};
use geonet_protocol::{JsonMap, NewNetwork, NodeId};
use geonet_store::NetworkStore;
use geonet_topology::{extract_and_persist, network_to_feature_collection, partition_by_property};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::path::PathBuf;

#[derive(Args)]
pub struct ExtractArgs {
    /// GeoJSON file with line and point features
    pub input: PathBuf,

    /// Name of the new network
    #[arg(long, required_unless_present = "network")]
    pub name: Option<String>,

    #[arg(long, default_value = "transportation")]
    pub category: String,

    /// Re-extract into an existing network instead of creating one
    #[arg(long, conflicts_with = "name")]
    pub network: Option<u64>,

    /// Extract features grouped by this property independently
    #[arg(long)]
    pub partition_by: Option<String>,

    /// Write the resulting network as GeoJSON
    #[arg(long)]
    pub export: Option<PathBuf>,
}

#[derive(Args)]
pub struct GccArgs {
    #[arg(long)]
    pub network: u64,

    /// Node ids to remove before computing the component (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub exclude: Vec<NodeId>,
}

#[derive(Args)]
pub struct RankArgs {
    #[arg(long)]
    pub network: u64,

    /// betweenness, degree, information, eigenvector, load, closeness or second_order
    #[arg(long, default_value = "betweenness")]
    pub measure: String,

    /// Keep only the top N nodes
    #[arg(long)]
    pub limit: Option<usize>,
}

pub async fn extract(workspace: &Workspace, args: ExtractArgs) -> Result<Value> {
    let bytes = tokio::fs::read(&args.input)
        .await
        .with_context(|| format!("Failed to read {}", args.input.display()))?;
    let features = geonet_conversion::read_geojson(&bytes)
        .with_context(|| format!("Invalid GeoJSON in {}", args.input.display()))?;

    let network = match (args.network, args.name) {
        (Some(id), _) => workspace.repo.get_network(id)?,
        (None, Some(name)) => workspace.repo.create_network(NewNetwork {
            project_id: workspace.project,
            name,
            category: args.category,
            vector_data_id: None,
            metadata: JsonMap::new(),
        })?,
        (None, None) => anyhow::bail!("Either --name or --network is required"),
    };

    let groups: Vec<_> = match &args.partition_by {
        Some(key) => partition_by_property(features, key).into_values().collect(),
        None => vec![features],
    };
    let summary = extract_and_persist(
        workspace.repo.clone(),
        network.id,
        groups,
        workspace.config.extraction,
    )
    .await
    .with_context(|| format!("Extraction into network {} failed", network.id))?;
    workspace.save().await?;

    if let Some(path) = &args.export {
        let nodes = workspace.repo.network_nodes(network.id)?;
        let edges = workspace.repo.network_edges(network.id)?;
        let collection = network_to_feature_collection(&nodes, &edges);
        tokio::fs::write(path, serde_json::to_vec(&collection)?)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        log::info!("Exported network {} to {}", network.id, path.display());
    }

    Ok(json!({
        "network": network.id,
        "name": network.name,
        "groups": summary.groups,
        "nodes": summary.nodes,
        "edges": summary.edges,
        "skipped_edges": summary.skipped_edges,
    }))
}

fn load_graph(workspace: &Workspace, network_id: u64) -> Result<NetworkGraph> {
    let repo = &workspace.repo;
    repo.get_network(network_id)?;
    let nodes = repo.network_nodes(network_id)?;
    let edges = repo.network_edges(network_id)?;
    Ok(NetworkGraph::from_records(&nodes, &edges))
}

pub fn gcc(workspace: &Workspace, args: &GccArgs) -> Result<Value> {
    let graph = load_graph(workspace, args.network)?;
    let excluded: BTreeSet<NodeId> = args.exclude.iter().copied().collect();
    let component = graph.greatest_connected_component(&excluded);
    Ok(json!({
        "network": args.network,
        "excluded": excluded,
        "size": component.len(),
        "nodes": component,
    }))
}

pub fn rank(workspace: &Workspace, args: &RankArgs) -> Result<Value> {
    let measure: CentralityMeasure = args.measure.parse()?;
    let graph = load_graph(workspace, args.network)?;
    let scores = graph.centrality_scores(measure)?;
    let ranking: Vec<Value> = graph
        .centrality_ranking(measure)?
        .into_iter()
        .take(args.limit.unwrap_or(usize::MAX))
        .map(|node| json!({"node": node, "score": scores.get(&node).copied().unwrap_or(0.0)}))
        .collect();
    Ok(json!({
        "network": args.network,
        "measure": measure,
        "ranking": ranking,
    }))
}
