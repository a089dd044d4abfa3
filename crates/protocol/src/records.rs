use crate::features::JsonMap;
use geo::{Geometry, LineString, Point};
use serde::{Deserialize, Serialize};

pub type ProjectId = u64;
pub type NetworkId = u64;
pub type NodeId = u64;
pub type EdgeId = u64;
pub type DatasetId = u64;
pub type RasterId = u64;
pub type VectorId = u64;
pub type ChartId = u64;

/// Named grouping of nodes and edges derived from one vector source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Network {
    pub id: NetworkId,
    pub project_id: ProjectId,
    pub name: String,
    pub category: String,
    /// Vector data the network was extracted from
    pub vector_data_id: Option<VectorId>,
    #[serde(default)]
    pub metadata: JsonMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewNetwork {
    pub project_id: ProjectId,
    pub name: String,
    pub category: String,
    pub vector_data_id: Option<VectorId>,
    #[serde(default)]
    pub metadata: JsonMap,
}

/// Graph vertex at a WGS84 lon/lat location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkNode {
    pub id: NodeId,
    pub network_id: NetworkId,
    pub name: String,
    pub location: Point<f64>,
    #[serde(default)]
    pub metadata: JsonMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewNode {
    pub name: String,
    pub location: Point<f64>,
    #[serde(default)]
    pub metadata: JsonMap,
}

/// Graph edge; both endpoints always reference nodes of the same network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkEdge {
    pub id: EdgeId,
    pub network_id: NetworkId,
    pub name: String,
    pub line: LineString<f64>,
    #[serde(default)]
    pub metadata: JsonMap,
    pub from_node: NodeId,
    pub to_node: NodeId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEdge {
    pub name: String,
    pub line: LineString<f64>,
    #[serde(default)]
    pub metadata: JsonMap,
    pub from_node: NodeId,
    pub to_node: NodeId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: DatasetId,
    pub project_id: ProjectId,
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub metadata: JsonMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDataset {
    pub project_id: ProjectId,
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub metadata: JsonMap,
}

/// Affine pixel → world mapping (north-up, no rotation).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    /// World x of the top-left corner of pixel (0, 0)
    pub origin_x: f64,
    /// World y of the top-left corner of pixel (0, 0)
    pub origin_y: f64,
    pub pixel_width: f64,
    /// Negative for north-up rasters
    pub pixel_height: f64,
}

impl GeoTransform {
    /// Fractional (column, row) of a world coordinate.
    #[must_use]
    pub fn world_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.origin_x) / self.pixel_width,
            (y - self.origin_y) / self.pixel_height,
        )
    }

    /// World coordinate of a pixel's top-left corner.
    #[must_use]
    pub fn pixel_to_world(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.origin_x + col * self.pixel_width,
            self.origin_y + row * self.pixel_height,
        )
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self {
            origin_x: 0.0,
            origin_y: 0.0,
            pixel_width: 1.0,
            pixel_height: -1.0,
        }
    }
}

/// Layout of a tiled raster: one tile blob per (frame, tile column, tile row).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterHeader {
    pub width: u32,
    pub height: u32,
    pub frames: u32,
    pub tile_size: u32,
    pub transform: GeoTransform,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodata: Option<f64>,
    /// CRS of `transform`, e.g. `EPSG:3857`; absent means WGS84 lon/lat
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crs: Option<String>,
}

impl RasterHeader {
    #[must_use]
    pub fn tiles_x(&self) -> u32 {
        self.width.div_ceil(self.tile_size.max(1))
    }

    #[must_use]
    pub fn tiles_y(&self) -> u32 {
        self.height.div_ceil(self.tile_size.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterData {
    pub id: RasterId,
    pub dataset_id: DatasetId,
    pub name: String,
    /// Blob key prefix under which the header and tiles live
    pub blob_prefix: String,
    pub header: RasterHeader,
    #[serde(default)]
    pub metadata: JsonMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRasterData {
    pub dataset_id: DatasetId,
    pub name: String,
    pub blob_prefix: String,
    pub header: RasterHeader,
    #[serde(default)]
    pub metadata: JsonMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorData {
    pub id: VectorId,
    pub dataset_id: DatasetId,
    pub name: String,
    /// Blob key of the WGS84 GeoJSON feature collection
    pub blob_key: String,
    #[serde(default)]
    pub metadata: JsonMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewVectorData {
    pub dataset_id: DatasetId,
    pub name: String,
    pub blob_key: String,
    #[serde(default)]
    pub metadata: JsonMap,
}

/// Queryable feature row derived from a vector blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorFeature {
    pub id: u64,
    pub vector_data_id: VectorId,
    pub geometry: Geometry<f64>,
    #[serde(default)]
    pub properties: JsonMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chart {
    pub id: ChartId,
    pub project_id: ProjectId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub chart_data: serde_json::Value,
    #[serde(default)]
    pub metadata: JsonMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewChart {
    pub project_id: ProjectId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub chart_data: serde_json::Value,
    #[serde(default)]
    pub metadata: JsonMap,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_counts_round_up() {
        let header = RasterHeader {
            width: 513,
            height: 256,
            frames: 1,
            tile_size: 256,
            transform: GeoTransform::default(),
            nodata: None,
            crs: None,
        };
        assert_eq!(header.tiles_x(), 3);
        assert_eq!(header.tiles_y(), 1);
    }

    #[test]
    fn transform_inverts() {
        let transform = GeoTransform {
            origin_x: -71.2,
            origin_y: 42.5,
            pixel_width: 0.001,
            pixel_height: -0.001,
        };
        let (x, y) = transform.pixel_to_world(10.0, 20.0);
        let (col, row) = transform.world_to_pixel(x, y);
        assert!((col - 10.0).abs() < 1e-9);
        assert!((row - 20.0).abs() < 1e-9);
    }
}
