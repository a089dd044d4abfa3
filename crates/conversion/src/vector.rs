use crate::crs::Crs;
use crate::error::{ConversionError, Result};
use geo::{Geometry, LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon};
use geojson::GeoJson;
use geonet_protocol::{feature_from_geojson, features_to_collection, GeometryFeature, JsonMap};
use serde_json::Value;
use shapefile::{PolygonRing, Shape};
use std::io::{Cursor, Read};

/// Features decoded from one upload, already in WGS84.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorSource {
    pub name: String,
    pub features: Vec<GeometryFeature>,
    /// Upload parts the features were read from
    pub source_files: Vec<String>,
}

/// Serialize features as a GeoJSON feature collection.
pub fn write_geojson(features: &[GeometryFeature]) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(&features_to_collection(features))?)
}

/// Decode a GeoJSON document (collection, single feature or bare geometry) into WGS84
/// features. A top-level `crs` member is honored when it names a supported system.
pub fn read_geojson(bytes: &[u8]) -> Result<Vec<GeometryFeature>> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| ConversionError::Unsupported(format!("GeoJSON is not UTF-8: {e}")))?;
    let document: GeoJson = text.parse()?;
    let (features, crs) = match document {
        GeoJson::FeatureCollection(collection) => {
            let crs = collection
                .foreign_members
                .as_ref()
                .and_then(|members| members.get("crs"))
                .and_then(crs_from_member);
            let features: Vec<GeometryFeature> = collection
                .features
                .iter()
                .filter_map(|feature| match feature_from_geojson(feature) {
                    Ok(feature) => Some(feature),
                    Err(e) => {
                        log::debug!("Skipping feature: {e}");
                        None
                    }
                })
                .collect();
            (features, crs)
        }
        GeoJson::Feature(feature) => (
            vec![feature_from_geojson(&feature)
                .map_err(|e| ConversionError::Unsupported(e.to_string()))?],
            None,
        ),
        GeoJson::Geometry(geometry) => {
            let feature = geojson::Feature {
                bbox: None,
                geometry: Some(geometry),
                id: None,
                properties: None,
                foreign_members: None,
            };
            (
                vec![feature_from_geojson(&feature)
                    .map_err(|e| ConversionError::Unsupported(e.to_string()))?],
                None,
            )
        }
    };
    Ok(to_wgs84(features, &crs.unwrap_or(Crs::Wgs84)))
}

fn crs_from_member(member: &Value) -> Option<Crs> {
    member
        .get("properties")
        .and_then(|properties| properties.get("name"))
        .and_then(Value::as_str)
        .map(Crs::from_name)
}

fn to_wgs84(features: Vec<GeometryFeature>, crs: &Crs) -> Vec<GeometryFeature> {
    match crs {
        Crs::Wgs84 => features,
        Crs::Unknown(name) => {
            log::warn!("Unknown CRS {name}; passing coordinates through unchanged");
            features
        }
        Crs::WebMercator => features
            .into_iter()
            .map(|feature| GeometryFeature {
                geometry: crs.geometry_to_wgs84(&feature.geometry),
                properties: feature.properties,
            })
            .collect(),
    }
}

/// Extract every shapefile and GeoJSON document from a zip archive. Shapefile parts are
/// grouped by stem; a stem without a `.shp` part is ignored.
pub fn read_zip(bytes: &[u8]) -> Result<Vec<VectorSource>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    let mut parts: std::collections::BTreeMap<String, ShapefileParts> = Default::default();
    let mut sources = Vec::new();

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        if name.starts_with("__MACOSX/") {
            continue;
        }
        let Some((stem, extension)) = split_extension(&name) else {
            continue;
        };
        let mut contents = Vec::new();
        entry.read_to_end(&mut contents)?;
        let slot = parts.entry(stem.to_string()).or_default();
        match extension.as_str() {
            "shp" => slot.shp = Some(contents),
            "dbf" => slot.dbf = Some(contents),
            "prj" => slot.prj = Some(String::from_utf8_lossy(&contents).into_owned()),
            "json" | "geojson" => sources.push(VectorSource {
                name: file_stem(stem).to_string(),
                features: read_geojson(&contents)?,
                source_files: vec![name.clone()],
            }),
            _ => {
                log::debug!("Ignoring archive member {name}");
                continue;
            }
        }
        slot.files.push(name);
    }

    for (stem, part) in parts {
        let Some(shp) = part.shp else {
            continue;
        };
        let crs = part.prj.as_deref().map_or(Crs::Wgs84, Crs::from_prj);
        let features = read_shapefile(shp, part.dbf)?;
        sources.push(VectorSource {
            name: file_stem(&stem).to_string(),
            features: to_wgs84(features, &crs),
            source_files: part.files,
        });
    }
    Ok(sources)
}

#[derive(Default)]
struct ShapefileParts {
    shp: Option<Vec<u8>>,
    dbf: Option<Vec<u8>>,
    prj: Option<String>,
    files: Vec<String>,
}

fn split_extension(name: &str) -> Option<(&str, String)> {
    let (stem, extension) = name.rsplit_once('.')?;
    Some((stem, extension.to_ascii_lowercase()))
}

fn file_stem(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn read_shapefile(shp: Vec<u8>, dbf: Option<Vec<u8>>) -> Result<Vec<GeometryFeature>> {
    let shapes = shapefile::ShapeReader::new(Cursor::new(shp))
        .and_then(|reader| reader.read())
        .map_err(|e| ConversionError::ShapefileError(e.to_string()))?;
    let records = match dbf {
        Some(dbf) => shapefile::dbase::Reader::new(Cursor::new(dbf))
            .and_then(|mut reader| reader.read())
            .map_err(|e| ConversionError::ShapefileError(e.to_string()))?,
        None => Vec::new(),
    };

    let mut records = records.into_iter();
    let mut features = Vec::with_capacity(shapes.len());
    for shape in shapes {
        let properties = records.next().map(record_properties).unwrap_or_default();
        match shape_geometry(shape) {
            Some(geometry) => features.push(GeometryFeature::new(geometry, properties)),
            None => log::debug!("Skipping empty or unsupported shape"),
        }
    }
    Ok(features)
}

fn record_properties(record: shapefile::dbase::Record) -> JsonMap {
    use shapefile::dbase::FieldValue;
    let fields: std::collections::HashMap<String, FieldValue> = record.into();
    fields
        .into_iter()
        .map(|(name, value)| {
            let value = match value {
                FieldValue::Character(text) => text.map_or(Value::Null, Value::String),
                FieldValue::Numeric(number) => number.map_or(Value::Null, Value::from),
                FieldValue::Float(number) => number.map_or(Value::Null, |n| Value::from(f64::from(n))),
                FieldValue::Double(number) => Value::from(number),
                FieldValue::Integer(number) => Value::from(number),
                FieldValue::Logical(flag) => flag.map_or(Value::Null, Value::Bool),
                FieldValue::Memo(text) => Value::String(text),
                other => Value::String(format!("{other:?}")),
            };
            (name, value)
        })
        .collect()
}

trait PlanarPoint {
    fn point(&self) -> Point<f64>;
}

impl PlanarPoint for shapefile::Point {
    fn point(&self) -> Point<f64> {
        Point::new(self.x, self.y)
    }
}

impl PlanarPoint for shapefile::PointM {
    fn point(&self) -> Point<f64> {
        Point::new(self.x, self.y)
    }
}

impl PlanarPoint for shapefile::PointZ {
    fn point(&self) -> Point<f64> {
        Point::new(self.x, self.y)
    }
}

fn line<P: PlanarPoint>(points: &[P]) -> LineString<f64> {
    points.iter().map(PlanarPoint::point).collect()
}

fn lines<P: PlanarPoint>(parts: &[Vec<P>]) -> Option<Geometry<f64>> {
    match parts {
        [] => None,
        [single] => Some(line(single).into()),
        many => Some(MultiLineString::new(many.iter().map(|part| line(part)).collect()).into()),
    }
}

fn polygons<P: PlanarPoint>(rings: &[PolygonRing<P>]) -> Option<Geometry<f64>> {
    let mut polygons: Vec<Polygon<f64>> = Vec::new();
    for ring in rings {
        match ring {
            PolygonRing::Outer(points) => polygons.push(Polygon::new(line(points), Vec::new())),
            PolygonRing::Inner(points) => match polygons.last_mut() {
                Some(polygon) => polygon.interiors_push(line(points)),
                None => log::debug!("Inner ring before any outer ring; skipped"),
            },
        }
    }
    match polygons.len() {
        0 => None,
        1 => polygons.pop().map(Geometry::from),
        _ => Some(MultiPolygon::new(polygons).into()),
    }
}

fn points<P: PlanarPoint>(points: &[P]) -> Option<Geometry<f64>> {
    (!points.is_empty())
        .then(|| MultiPoint::new(points.iter().map(PlanarPoint::point).collect()).into())
}

fn shape_geometry(shape: Shape) -> Option<Geometry<f64>> {
    match shape {
        Shape::Point(p) => Some(p.point().into()),
        Shape::PointM(p) => Some(p.point().into()),
        Shape::PointZ(p) => Some(p.point().into()),
        Shape::Polyline(l) => lines(l.parts()),
        Shape::PolylineM(l) => lines(l.parts()),
        Shape::PolylineZ(l) => lines(l.parts()),
        Shape::Polygon(p) => polygons(p.rings()),
        Shape::PolygonM(p) => polygons(p.rings()),
        Shape::PolygonZ(p) => polygons(p.rings()),
        Shape::Multipoint(m) => points(m.points()),
        Shape::MultipointM(m) => points(m.points()),
        Shape::MultipointZ(m) => points(m.points()),
        Shape::Multipatch(_) | Shape::NullShape => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn mercator_collections_are_reprojected() {
        let doc = serde_json::json!({
            "type": "FeatureCollection",
            "crs": {"type": "name", "properties": {"name": "urn:ogc:def:crs:EPSG::3857"}},
            "features": [{
                "type": "Feature",
                "properties": {"name": "origin"},
                "geometry": {"type": "Point", "coordinates": [0.0, 0.0]}
            }, {
                "type": "Feature",
                "properties": {},
                "geometry": {"type": "Point", "coordinates": [111319.49079327357, 0.0]}
            }]
        });
        let features = read_geojson(&serde_json::to_vec(&doc).unwrap()).unwrap();
        assert_eq!(features.len(), 2);
        let Geometry::Point(second) = &features[1].geometry else {
            panic!("expected a point");
        };
        assert!((second.x() - 1.0).abs() < 1e-9);
        assert_eq!(features[0].property_str("name").as_deref(), Some("origin"));
    }

    #[test]
    fn bare_geometry_becomes_one_feature() {
        let features = read_geojson(br#"{"type":"LineString","coordinates":[[0,0],[1,1]]}"#).unwrap();
        assert_eq!(features.len(), 1);
        assert!(features[0].properties.is_empty());
    }

    #[test]
    fn invalid_documents_are_errors() {
        assert!(read_geojson(b"{\"type\": \"Nope\"}").is_err());
        assert!(read_geojson(&[0xff, 0xfe]).is_err());
    }

    #[test]
    fn multipart_polylines_become_multilines() {
        let parts = vec![
            vec![shapefile::Point::new(0.0, 0.0), shapefile::Point::new(1.0, 0.0)],
            vec![shapefile::Point::new(2.0, 0.0), shapefile::Point::new(3.0, 0.0)],
        ];
        assert!(matches!(lines(&parts), Some(Geometry::MultiLineString(m)) if m.0.len() == 2));
        assert!(lines::<shapefile::Point>(&[]).is_none());
    }
}
