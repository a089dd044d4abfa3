use geo::{
    Coord, Geometry, GeometryCollection, LineString, MultiLineString, MultiPoint, MultiPolygon,
    Point, Polygon,
};
use thiserror::Error;

pub type JsonMap = serde_json::Map<String, serde_json::Value>;

/// A decoded (geometry, properties) pair. Never mutated after it is read from a source.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryFeature {
    pub geometry: Geometry<f64>,
    pub properties: JsonMap,
}

impl GeometryFeature {
    pub fn new(geometry: impl Into<Geometry<f64>>, properties: JsonMap) -> Self {
        Self {
            geometry: geometry.into(),
            properties,
        }
    }

    /// String value of a property; numbers are rendered, other types ignored.
    #[must_use]
    pub fn property_str(&self, key: &str) -> Option<String> {
        match self.properties.get(key)? {
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FeatureError {
    #[error("feature has no geometry")]
    MissingGeometry,

    #[error("position needs at least two coordinates")]
    InvalidPosition,
}

pub fn feature_from_geojson(feature: &geojson::Feature) -> Result<GeometryFeature, FeatureError> {
    let geometry = feature
        .geometry
        .as_ref()
        .ok_or(FeatureError::MissingGeometry)?;
    Ok(GeometryFeature {
        geometry: geometry_from_value(&geometry.value)?,
        properties: feature.properties.clone().unwrap_or_default(),
    })
}

#[must_use]
pub fn feature_to_geojson(feature: &GeometryFeature) -> geojson::Feature {
    geojson::Feature {
        bbox: None,
        geometry: Some(geojson::Geometry::new(geometry_to_value(&feature.geometry))),
        id: None,
        properties: Some(feature.properties.clone()),
        foreign_members: None,
    }
}

/// Decode every feature of a collection; features without usable geometry are skipped.
#[must_use]
pub fn features_from_collection(collection: &geojson::FeatureCollection) -> Vec<GeometryFeature> {
    collection
        .features
        .iter()
        .filter_map(|feature| feature_from_geojson(feature).ok())
        .collect()
}

#[must_use]
pub fn features_to_collection(features: &[GeometryFeature]) -> geojson::FeatureCollection {
    geojson::FeatureCollection {
        bbox: None,
        features: features.iter().map(feature_to_geojson).collect(),
        foreign_members: None,
    }
}

fn coord(position: &[f64]) -> Result<Coord<f64>, FeatureError> {
    match position {
        [x, y, ..] => Ok(Coord { x: *x, y: *y }),
        _ => Err(FeatureError::InvalidPosition),
    }
}

fn line_string(positions: &[Vec<f64>]) -> Result<LineString<f64>, FeatureError> {
    positions
        .iter()
        .map(|p| coord(p))
        .collect::<Result<Vec<_>, _>>()
        .map(LineString::new)
}

fn polygon(rings: &[Vec<Vec<f64>>]) -> Result<Polygon<f64>, FeatureError> {
    let mut rings = rings.iter().map(|ring| line_string(ring));
    let exterior = match rings.next() {
        Some(ring) => ring?,
        None => LineString::new(Vec::new()),
    };
    let interiors = rings.collect::<Result<Vec<_>, _>>()?;
    Ok(Polygon::new(exterior, interiors))
}

fn geometry_from_value(value: &geojson::Value) -> Result<Geometry<f64>, FeatureError> {
    use geojson::Value;

    Ok(match value {
        Value::Point(p) => Geometry::Point(Point::from(coord(p)?)),
        Value::MultiPoint(points) => Geometry::MultiPoint(MultiPoint::new(
            points
                .iter()
                .map(|p| coord(p).map(Point::from))
                .collect::<Result<Vec<_>, _>>()?,
        )),
        Value::LineString(line) => Geometry::LineString(line_string(line)?),
        Value::MultiLineString(lines) => Geometry::MultiLineString(MultiLineString::new(
            lines
                .iter()
                .map(|l| line_string(l))
                .collect::<Result<Vec<_>, _>>()?,
        )),
        Value::Polygon(rings) => Geometry::Polygon(polygon(rings)?),
        Value::MultiPolygon(polygons) => Geometry::MultiPolygon(MultiPolygon::new(
            polygons
                .iter()
                .map(|p| polygon(p))
                .collect::<Result<Vec<_>, _>>()?,
        )),
        Value::GeometryCollection(members) => Geometry::GeometryCollection(GeometryCollection(
            members
                .iter()
                .map(|g| geometry_from_value(&g.value))
                .collect::<Result<Vec<_>, _>>()?,
        )),
    })
}

fn position(c: Coord<f64>) -> Vec<f64> {
    vec![c.x, c.y]
}

fn line_positions(line: &LineString<f64>) -> Vec<Vec<f64>> {
    line.coords().map(|c| position(*c)).collect()
}

fn polygon_positions(polygon: &Polygon<f64>) -> Vec<Vec<Vec<f64>>> {
    std::iter::once(polygon.exterior())
        .chain(polygon.interiors())
        .map(line_positions)
        .collect()
}

fn geometry_to_value(geometry: &Geometry<f64>) -> geojson::Value {
    use geojson::Value;

    match geometry {
        Geometry::Point(p) => Value::Point(position(p.0)),
        Geometry::MultiPoint(points) => {
            Value::MultiPoint(points.iter().map(|p| position(p.0)).collect())
        }
        Geometry::Line(line) => Value::LineString(vec![position(line.start), position(line.end)]),
        Geometry::LineString(line) => Value::LineString(line_positions(line)),
        Geometry::MultiLineString(lines) => {
            Value::MultiLineString(lines.iter().map(line_positions).collect())
        }
        Geometry::Polygon(p) => Value::Polygon(polygon_positions(p)),
        Geometry::MultiPolygon(polygons) => {
            Value::MultiPolygon(polygons.iter().map(polygon_positions).collect())
        }
        Geometry::Rect(rect) => Value::Polygon(polygon_positions(&rect.to_polygon())),
        Geometry::Triangle(triangle) => Value::Polygon(polygon_positions(&triangle.to_polygon())),
        Geometry::GeometryCollection(members) => Value::GeometryCollection(
            members
                .iter()
                .map(|g| geojson::Geometry::new(geometry_to_value(g)))
                .collect(),
        ),
    }
}
