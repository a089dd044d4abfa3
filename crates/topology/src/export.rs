use crate::error::{Result, TopologyError};
use crate::interpret::{ExtractedGroup, GroupEdge, NodeTable};
use geo::{Geometry, Point};
use geonet_protocol::{
    feature_from_geojson, feature_to_geojson, GeometryFeature, JsonMap, NetworkEdge, NetworkNode,
    NewNode, NodeId,
};
use serde_json::{json, Value};
use std::collections::HashMap;

const NODE_ID: &str = "node_id";
const EDGE_ID: &str = "edge_id";
const NAME: &str = "name";
const FROM_POINT: &str = "from_point";
const TO_POINT: &str = "to_point";

fn lon_lat(point: Point<f64>) -> Value {
    json!({ "lon": point.x(), "lat": point.y() })
}

fn parse_lon_lat(value: Option<&Value>) -> Option<Point<f64>> {
    let value = value?;
    Some(Point::new(value.get("lon")?.as_f64()?, value.get("lat")?.as_f64()?))
}

/// Node features followed by edge features, each carrying its record id and metadata.
/// Edge features also carry the locations of their endpoint nodes as `from_point` and
/// `to_point` (`{"lon": .., "lat": ..}`).
#[must_use]
pub fn network_to_feature_collection(
    nodes: &[NetworkNode],
    edges: &[NetworkEdge],
) -> geojson::FeatureCollection {
    let locations: HashMap<NodeId, Point<f64>> =
        nodes.iter().map(|node| (node.id, node.location)).collect();

    let node_features = nodes.iter().map(|node| {
        let mut properties = node.metadata.clone();
        properties.insert(NODE_ID.into(), json!(node.id));
        properties.insert(NAME.into(), json!(node.name));
        feature_to_geojson(&GeometryFeature::new(node.location, properties))
    });

    let edge_features = edges.iter().map(|edge| {
        let first = edge.line.0.first().copied().map(Point::from);
        let last = edge.line.0.last().copied().map(Point::from);
        let from = locations.get(&edge.from_node).copied().or(first);
        let to = locations.get(&edge.to_node).copied().or(last);

        let mut properties = edge.metadata.clone();
        properties.insert(EDGE_ID.into(), json!(edge.id));
        properties.insert(NAME.into(), json!(edge.name));
        properties.insert(FROM_POINT.into(), from.map_or(Value::Null, lon_lat));
        properties.insert(TO_POINT.into(), to.map_or(Value::Null, lon_lat));
        feature_to_geojson(&GeometryFeature::new(edge.line.clone(), properties))
    });

    geojson::FeatureCollection {
        bbox: None,
        features: node_features.chain(edge_features).collect(),
        foreign_members: None,
    }
}

fn strip(properties: &JsonMap, keys: &[&str]) -> JsonMap {
    properties
        .iter()
        .filter(|(key, _)| !keys.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Rebuild nodes and edges from a collection written by [`network_to_feature_collection`].
///
/// Edges are linked to the nodes nearest their `from_point`/`to_point` within `tolerance`;
/// endpoints with no matching node feature get a fresh unnamed node.
pub fn network_from_feature_collection(
    collection: &geojson::FeatureCollection,
    tolerance: f64,
) -> Result<ExtractedGroup> {
    let mut table = NodeTable::new(tolerance);
    let mut pending = Vec::new();

    for (position, raw) in collection.features.iter().enumerate() {
        let feature = feature_from_geojson(raw)
            .map_err(|e| TopologyError::InvalidFeature(format!("feature {position}: {e}")))?;
        match feature.geometry {
            Geometry::Point(location) => {
                let name = feature.property_str(NAME).unwrap_or_default();
                let metadata = strip(&feature.properties, &[NODE_ID, NAME]);
                table.resolve(location, || NewNode {
                    name,
                    location,
                    metadata,
                });
            }
            Geometry::LineString(line) => pending.push((line, feature.properties)),
            _ => {
                return Err(TopologyError::InvalidFeature(format!(
                    "feature {position}: expected Point or LineString geometry"
                )))
            }
        }
    }

    let mut edges = Vec::with_capacity(pending.len());
    for (line, properties) in pending {
        let from_point = parse_lon_lat(properties.get(FROM_POINT))
            .or_else(|| line.0.first().copied().map(Point::from));
        let to_point = parse_lon_lat(properties.get(TO_POINT))
            .or_else(|| line.0.last().copied().map(Point::from));
        let (Some(from_point), Some(to_point)) = (from_point, to_point) else {
            log::warn!("Skipping edge feature without endpoints");
            continue;
        };
        let from = table.resolve(from_point, || NewNode {
            name: String::new(),
            location: from_point,
            metadata: JsonMap::new(),
        });
        let to = table.resolve(to_point, || NewNode {
            name: String::new(),
            location: to_point,
            metadata: JsonMap::new(),
        });
        let name = properties
            .get(NAME)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        edges.push(GroupEdge {
            from,
            to,
            name,
            line,
            metadata: strip(&properties, &[EDGE_ID, NAME, FROM_POINT, TO_POINT]),
        });
    }

    Ok(ExtractedGroup {
        nodes: table.into_nodes(),
        edges,
        skipped_edges: 0,
    })
}
