use crate::config::ExtractorConfig;
use crate::error::{Result, TopologyError};
use crate::interpret::{interpret_group, persist_group, ExtractedGroup};
use geonet_protocol::{GeometryFeature, NetworkId};
use geonet_store::NetworkStore;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Counts written by one extraction run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionSummary {
    pub groups: usize,
    pub nodes: usize,
    pub edges: usize,
    pub skipped_edges: usize,
}

/// Group features by the string value of `key`; features without it share the `""` group.
#[must_use]
pub fn partition_by_property(
    features: Vec<GeometryFeature>,
    key: &str,
) -> BTreeMap<String, Vec<GeometryFeature>> {
    let mut groups: BTreeMap<String, Vec<GeometryFeature>> = BTreeMap::new();
    for feature in features {
        let group = feature.property_str(key).unwrap_or_default();
        groups.entry(group).or_default().push(feature);
    }
    groups
}

/// Interpret independent groups concurrently, bounded by `max_concurrent_groups`.
/// Results keep the order of `groups`.
pub async fn interpret_groups(
    groups: Vec<Vec<GeometryFeature>>,
    config: ExtractorConfig,
) -> Result<Vec<ExtractedGroup>> {
    let semaphore = Arc::new(Semaphore::new(config.max_concurrent_groups.max(1)));
    let tolerance = config.node_tolerance_degrees;

    let handles: Vec<_> = groups
        .into_iter()
        .map(|features| {
            let semaphore = semaphore.clone();
            tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| TopologyError::TaskFailed(e.to_string()))?;
                tokio::task::spawn_blocking(move || interpret_group(&features, tolerance))
                    .await
                    .map_err(|e| TopologyError::TaskFailed(e.to_string()))
            })
        })
        .collect();

    let mut interpreted = Vec::with_capacity(handles.len());
    for handle in handles {
        let group = handle
            .await
            .map_err(|e| TopologyError::TaskFailed(e.to_string()))??;
        interpreted.push(group);
    }
    Ok(interpreted)
}

/// Interpret `groups` and append the result to `network_id`.
pub async fn extract_groups(
    store: Arc<dyn NetworkStore>,
    network_id: NetworkId,
    groups: Vec<Vec<GeometryFeature>>,
    config: ExtractorConfig,
) -> Result<ExtractionSummary> {
    store.get_network(network_id)?;
    let interpreted = interpret_groups(groups, config).await?;

    let mut summary = ExtractionSummary {
        groups: interpreted.len(),
        ..ExtractionSummary::default()
    };
    for group in interpreted {
        summary.skipped_edges += group.skipped_edges;
        let (nodes, edges) = persist_group(store.as_ref(), network_id, group)?;
        summary.nodes += nodes.len();
        summary.edges += edges.len();
    }
    log::info!(
        "Network {network_id}: extracted {} nodes and {} edges from {} groups ({} edge pieces dropped)",
        summary.nodes,
        summary.edges,
        summary.groups,
        summary.skipped_edges
    );
    Ok(summary)
}

/// Replace the topology of `network_id` with the one extracted from `groups`.
pub async fn extract_and_persist(
    store: Arc<dyn NetworkStore>,
    network_id: NetworkId,
    groups: Vec<Vec<GeometryFeature>>,
    config: ExtractorConfig,
) -> Result<ExtractionSummary> {
    store.clear_network(network_id)?;
    extract_groups(store, network_id, groups, config).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{LineString, Point};
    use geonet_protocol::JsonMap;
    use serde_json::json;

    fn feature(region: Option<&str>) -> GeometryFeature {
        let mut properties = JsonMap::new();
        if let Some(region) = region {
            properties.insert("region".into(), json!(region));
        }
        GeometryFeature::new(Point::new(0.0, 0.0), properties)
    }

    #[test]
    fn partitions_by_string_property() {
        let groups = partition_by_property(
            vec![feature(Some("north")), feature(None), feature(Some("north"))],
            "region",
        );
        assert_eq!(groups.len(), 2);
        assert_eq!(groups["north"].len(), 2);
        assert_eq!(groups[""].len(), 1);
    }

    #[tokio::test]
    async fn interpreted_groups_keep_input_order() {
        let groups: Vec<Vec<GeometryFeature>> = (0..25)
            .map(|i| {
                let y = f64::from(i);
                vec![GeometryFeature::new(
                    LineString::from(vec![(0.0, y), (1.0, y)]),
                    JsonMap::new(),
                )]
            })
            .collect();
        let config = ExtractorConfig {
            max_concurrent_groups: 3,
            ..ExtractorConfig::default()
        };
        let interpreted = interpret_groups(groups, config).await.unwrap();
        assert_eq!(interpreted.len(), 25);
        for (i, group) in interpreted.iter().enumerate() {
            assert_eq!(group.nodes[0].location, Point::new(0.0, i as f64));
        }
    }
}
