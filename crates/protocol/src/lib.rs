//! # Geonet Protocol
//!
//! Records shared by every stage of the pipeline: networks, datasets, task results and the
//! feature type that vector sources are decoded into.

mod features;
mod records;
mod task;

pub use features::{
    feature_from_geojson, feature_to_geojson, features_from_collection, features_to_collection,
    FeatureError, GeometryFeature, JsonMap,
};
pub use records::{
    Chart, ChartId, Dataset, DatasetId, EdgeId, GeoTransform, Network, NetworkEdge, NetworkId,
    NetworkNode, NewChart, NewDataset, NewEdge, NewNetwork, NewNode, NewRasterData, NewVectorData,
    NodeId, ProjectId, RasterData, RasterHeader, RasterId, VectorData, VectorFeature, VectorId,
};
pub use task::{TaskResult, TaskResultId, TaskType, UnknownTaskType, INITIAL_STATUS};

/// Notification topic that carries every task result update for one project.
#[must_use]
pub fn analytics_topic(project_id: ProjectId) -> String {
    format!("analytics_{project_id}")
}

/// Milliseconds since the unix epoch, clamped to zero if the clock is before 1970.
#[must_use]
pub fn current_unix_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .ok()
        .and_then(|dur| u64::try_from(dur.as_millis()).ok())
        .unwrap_or(0)
}
