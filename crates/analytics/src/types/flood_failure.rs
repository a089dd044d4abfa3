use crate::context::AnalysisContext;
use crate::error::Result;
use crate::inputs::InputCheck;
use crate::registry::{network_options, task_options, type_tags, AnalysisType, TaskBody};
use geonet_conversion::RasterReader;
use geonet_geometry::meters_to_degrees;
use geonet_ledger::LedgerEntry;
use geonet_protocol::{JsonMap, NetworkNode, NodeId, ProjectId, TaskType};
use serde_json::{json, Value};
use std::collections::BTreeSet;

/// Marks network nodes as failed once flood depth near them exceeds a tolerance.
pub struct FloodNetworkFailure {
    enabled: bool,
}

impl FloodNetworkFailure {
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

/// Evaluate one frame. Nodes in `failed` stay failed and are not sampled again.
pub(crate) async fn flooded_nodes(
    reader: &mut RasterReader,
    frame: u32,
    nodes: &[NetworkNode],
    failed: &mut BTreeSet<NodeId>,
    depth_tolerance: f64,
    station_radius: f64,
) -> Result<()> {
    for node in nodes {
        if failed.contains(&node.id) {
            continue;
        }
        let (lon, lat) = (node.location.x(), node.location.y());
        let (dlon, dlat) = meters_to_degrees(station_radius, lat);
        let depth = reader.max_around(frame, lon, lat, dlon, dlat).await?;
        if depth.is_some_and(|depth| f64::from(depth) > depth_tolerance) {
            failed.insert(node.id);
        }
    }
    Ok(())
}

impl AnalysisType for FloodNetworkFailure {
    fn name(&self) -> &'static str {
        "Flood Network Failure"
    }

    fn description(&self) -> &'static str {
        "Determine which network nodes fail at each flood timestep, given a depth tolerance \
         and the radius around each node that must stay dry."
    }

    fn attribution(&self) -> &'static str {
        "Northeastern University"
    }

    fn task_type(&self) -> TaskType {
        TaskType::FloodNetworkFailure
    }

    fn input_types(&self) -> JsonMap {
        type_tags(&[
            ("network", "Network"),
            ("flood_simulation", "TaskResult"),
            ("depth_tolerance_meters", "number"),
            ("station_radius_meters", "number"),
        ])
    }

    fn output_types(&self) -> JsonMap {
        type_tags(&[("failures", "object"), ("network", "Network")])
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn input_options(&self, ctx: &AnalysisContext, project_id: ProjectId) -> Result<JsonMap> {
        let mut options = JsonMap::new();
        options.insert("network".into(), network_options(ctx, project_id)?);
        options.insert(
            "flood_simulation".into(),
            task_options(ctx, project_id, &[TaskType::FloodSimulation])?,
        );
        Ok(options)
    }

    fn execute(&self, ctx: AnalysisContext, entry: LedgerEntry) -> TaskBody {
        Box::pin(async move {
            let inputs = entry.snapshot().inputs;
            let check = InputCheck::new(&entry, &inputs);

            let network = check.id("network").and_then(|id| match ctx.networks.get_network(id) {
                Ok(network) => Some(network),
                Err(_) => {
                    check.error(format!("Network {id} not found"));
                    None
                }
            });
            let flood = check.upstream(
                "flood_simulation",
                ctx.tasks.as_ref(),
                &[TaskType::FloodSimulation],
            );
            let depth_tolerance = check.number("depth_tolerance_meters");
            let station_radius = check.number("station_radius_meters");

            let raster = flood.as_ref().and_then(|result| {
                let Some(dataset_id) = result.output("flood").and_then(Value::as_u64) else {
                    check.error(format!("Task result {} has no flood dataset", result.id));
                    return None;
                };
                match ctx.datasets.rasters_for_dataset(dataset_id) {
                    Ok(rasters) if !rasters.is_empty() => rasters.into_iter().next(),
                    _ => {
                        check.error(format!("Dataset {dataset_id} has no raster data"));
                        None
                    }
                }
            });

            let (Some(network), Some(raster), Some(depth_tolerance), Some(station_radius)) =
                (network, raster, depth_tolerance, station_radius)
            else {
                return Ok(());
            };
            if entry.has_error() {
                return Ok(());
            }

            entry.rename(format!("Flood Network Failure: {}", network.name));
            let nodes = ctx.networks.network_nodes(network.id)?;
            let mut reader = RasterReader::for_record(ctx.blobs.clone(), &raster);
            let frames = reader.header().frames;

            let mut failed = BTreeSet::new();
            let mut failures = JsonMap::new();
            for frame in 0..frames {
                entry.write_status(format!(
                    "Evaluating flood timestep {}/{frames}",
                    frame + 1
                ));
                flooded_nodes(
                    &mut reader,
                    frame,
                    &nodes,
                    &mut failed,
                    depth_tolerance,
                    station_radius,
                )
                .await?;
                failures.insert(frame.to_string(), json!(failed));
            }
            log::info!(
                "{} of {} nodes in network {} fail across {frames} flood timesteps",
                failed.len(),
                nodes.len(),
                network.id
            );

            let mut outputs = JsonMap::new();
            outputs.insert("failures".into(), Value::Object(failures));
            outputs.insert("network".into(), json!(network.id));
            entry.set_outputs(outputs);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Point;
    use geonet_conversion::{write_tiled, Crs, RasterImage};
    use geonet_protocol::GeoTransform;
    use geonet_store::{BlobStore, MemoryBlobStore};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn node(id: NodeId, lon: f64, lat: f64) -> NetworkNode {
        NetworkNode {
            id,
            network_id: 1,
            name: format!("n{id}"),
            location: Point::new(lon, lat),
            metadata: JsonMap::new(),
        }
    }

    /// 4x1 raster over lon 0..4, lat 0..1 with two timesteps.
    async fn rising_flood(blobs: Arc<dyn BlobStore>) -> RasterReader {
        let image = RasterImage {
            width: 4,
            height: 1,
            frames: vec![vec![2.0, 0.0, 0.0, 0.0], vec![0.0, 0.2, 1.5, 0.1]],
            transform: GeoTransform {
                origin_x: 0.0,
                origin_y: 1.0,
                pixel_width: 1.0,
                pixel_height: -1.0,
            },
            nodata: None,
            crs: Crs::Wgs84,
        };
        write_tiled(blobs.as_ref(), "rasters/flood", &image, 2)
            .await
            .unwrap();
        RasterReader::open(blobs, "rasters/flood").await.unwrap()
    }

    #[tokio::test]
    async fn failures_accumulate_across_frames() {
        let blobs: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        let mut reader = rising_flood(blobs).await;
        let nodes = vec![node(1, 0.5, 0.5), node(2, 1.5, 0.5), node(3, 2.5, 0.5)];

        let mut failed = BTreeSet::new();
        flooded_nodes(&mut reader, 0, &nodes, &mut failed, 1.0, 1.0).await.unwrap();
        assert_eq!(failed, BTreeSet::from([1]));

        // Node 1 is dry again in frame 1 but stays failed.
        flooded_nodes(&mut reader, 1, &nodes, &mut failed, 1.0, 1.0).await.unwrap();
        assert_eq!(failed, BTreeSet::from([1, 3]));
    }
}
