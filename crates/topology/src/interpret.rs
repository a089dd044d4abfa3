use crate::error::Result;
use geo::{BoundingRect, Geometry, LineString, Point};
use geonet_geometry::{merge_touching_lines, snap_points_to_line, split_line_at_points, PointIndex};
use geonet_protocol::{GeometryFeature, JsonMap, NetworkEdge, NetworkId, NetworkNode, NewEdge, NewNode};
use geonet_store::NetworkStore;

/// Edge of an interpreted group; endpoints index into [`ExtractedGroup::nodes`].
#[derive(Debug, Clone, PartialEq)]
pub struct GroupEdge {
    pub from: usize,
    pub to: usize,
    pub name: String,
    pub line: LineString<f64>,
    pub metadata: JsonMap,
}

/// Nodes and edges of one feature group, not yet persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedGroup {
    pub nodes: Vec<NewNode>,
    pub edges: Vec<GroupEdge>,
    /// Edge pieces dropped because an end did not resolve to a node
    pub skipped_edges: usize,
}

impl ExtractedGroup {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }
}

/// Deduplicating node table keyed by location.
#[derive(Debug)]
pub(crate) struct NodeTable {
    nodes: Vec<NewNode>,
    index: PointIndex<usize>,
    tolerance: f64,
}

impl NodeTable {
    pub(crate) fn new(tolerance: f64) -> Self {
        Self {
            nodes: Vec::new(),
            index: PointIndex::new(),
            tolerance,
        }
    }

    /// Index of the node at `location`, creating it when none is within tolerance.
    pub(crate) fn resolve(&mut self, location: Point<f64>, make: impl FnOnce() -> NewNode) -> usize {
        if let Some(existing) = self.index.nearest_within(location, self.tolerance) {
            return *existing;
        }
        let idx = self.nodes.len();
        self.nodes.push(make());
        self.index.insert(location, idx);
        idx
    }

    pub(crate) fn nearest(&self, location: Point<f64>) -> Option<usize> {
        self.index.nearest_within(location, self.tolerance).copied()
    }

    pub(crate) fn into_nodes(self) -> Vec<NewNode> {
        self.nodes
    }
}

fn unnamed_node(location: Point<f64>) -> NewNode {
    NewNode {
        name: String::new(),
        location,
        metadata: JsonMap::new(),
    }
}

/// Split one feature list into point features and line features; multi-geometries are
/// flattened and every other geometry kind is ignored.
fn classify(features: &[GeometryFeature]) -> (Vec<GeometryFeature>, Vec<GeometryFeature>) {
    let mut points = Vec::new();
    let mut lines = Vec::new();
    for feature in features {
        let properties = &feature.properties;
        match &feature.geometry {
            Geometry::Point(p) => points.push(GeometryFeature::new(*p, properties.clone())),
            Geometry::MultiPoint(multi) => points.extend(
                multi
                    .iter()
                    .map(|p| GeometryFeature::new(*p, properties.clone())),
            ),
            Geometry::LineString(line) if line.0.len() >= 2 => {
                lines.push(GeometryFeature::new(line.clone(), properties.clone()));
            }
            Geometry::Line(line) => lines.push(GeometryFeature::new(
                LineString::from(vec![line.start, line.end]),
                properties.clone(),
            )),
            Geometry::MultiLineString(multi) => lines.extend(
                multi
                    .iter()
                    .filter(|line| line.0.len() >= 2)
                    .map(|line| GeometryFeature::new(line.clone(), properties.clone())),
            ),
            other => log::debug!("Ignoring non-network geometry {:?}", geometry_kind(other)),
        }
    }
    (points, lines)
}

fn geometry_kind(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}

fn as_line(feature: &GeometryFeature) -> Option<&LineString<f64>> {
    match &feature.geometry {
        Geometry::LineString(line) => Some(line),
        _ => None,
    }
}

/// Build the nodes and edges of one group of features.
///
/// Lines are merged until the count stops falling. Point features become nodes first so
/// they keep their names; line endpoints follow. Each line is then cut wherever a node sits
/// on it and every piece becomes an edge between the nodes nearest its two ends.
#[must_use]
pub fn interpret_group(features: &[GeometryFeature], tolerance: f64) -> ExtractedGroup {
    let (points, mut lines) = classify(features);

    loop {
        let merged = merge_touching_lines(&lines, tolerance);
        let reduced = merged.len() < lines.len();
        lines = merged;
        if !reduced {
            break;
        }
    }

    let mut table = NodeTable::new(tolerance);
    for feature in &points {
        if let Geometry::Point(location) = feature.geometry {
            table.resolve(location, || NewNode {
                name: feature.property_str("name").unwrap_or_default(),
                location,
                metadata: feature.properties.clone(),
            });
        }
    }
    for line in lines.iter().filter_map(as_line) {
        for end in [line.0.first(), line.0.last()].into_iter().flatten() {
            let location = Point::from(*end);
            table.resolve(location, || unnamed_node(location));
        }
    }

    let node_locations: Vec<Point<f64>> = table.nodes.iter().map(|node| node.location).collect();
    let mut edges = Vec::new();
    let mut skipped_edges = 0usize;
    for feature in &lines {
        let Some(line) = as_line(feature) else {
            continue;
        };
        let Some(bounds) = line.bounding_rect() else {
            continue;
        };
        // Nodes at the line's own ends never cut it.
        let own_ends = [line.0.first(), line.0.last()]
            .map(|end| end.and_then(|c| table.nearest(Point::from(*c))));
        let candidates: Vec<Point<f64>> = table
            .index
            .within_box(bounds.min().into(), bounds.max().into(), tolerance)
            .filter(|(_, idx)| !own_ends.contains(&Some(**idx)))
            .map(|(_, idx)| node_locations[*idx])
            .collect();
        let cuts: Vec<Point<f64>> = snap_points_to_line(&candidates, line, tolerance)
            .into_iter()
            .map(|snapped| snapped.snapped)
            // A cut that lands on an own end would leave a piece looping on that node.
            .filter(|cut| match table.nearest(*cut) {
                Some(idx) => !own_ends.contains(&Some(idx)),
                None => true,
            })
            .collect();

        let name = feature.property_str("name").unwrap_or_default();
        for piece in split_line_at_points(line, &cuts) {
            let ends = piece
                .0
                .first()
                .zip(piece.0.last())
                .map(|(start, end)| (table.nearest(Point::from(*start)), table.nearest(Point::from(*end))));
            match ends {
                Some((Some(from), Some(to))) => edges.push(GroupEdge {
                    from,
                    to,
                    name: name.clone(),
                    line: piece,
                    metadata: feature.properties.clone(),
                }),
                _ => {
                    skipped_edges += 1;
                    log::debug!(
                        "Dropping edge piece of {:?} with {} coordinates: endpoint has no node",
                        name,
                        piece.0.len()
                    );
                }
            }
        }
    }

    ExtractedGroup {
        nodes: table.into_nodes(),
        edges,
        skipped_edges,
    }
}

/// Persist an interpreted group: nodes first, then edges that reference them.
pub fn persist_group(
    store: &dyn NetworkStore,
    network_id: NetworkId,
    group: ExtractedGroup,
) -> Result<(Vec<NetworkNode>, Vec<NetworkEdge>)> {
    if group.is_empty() {
        return Ok((Vec::new(), Vec::new()));
    }
    let nodes = store.bulk_create_nodes(network_id, group.nodes)?;
    let edges: Vec<NewEdge> = group
        .edges
        .into_iter()
        .filter_map(|edge| {
            let from_node = nodes.get(edge.from)?.id;
            let to_node = nodes.get(edge.to)?.id;
            Some(NewEdge {
                name: edge.name,
                line: edge.line,
                metadata: edge.metadata,
                from_node,
                to_node,
            })
        })
        .collect();
    let edges = store.bulk_create_edges(network_id, edges)?;
    Ok((nodes, edges))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const TOL: f64 = 0.0001;

    fn line(coords: &[(f64, f64)]) -> GeometryFeature {
        GeometryFeature::new(LineString::from(coords.to_vec()), JsonMap::new())
    }

    fn station(x: f64, y: f64, name: &str) -> GeometryFeature {
        let mut properties = JsonMap::new();
        properties.insert("name".into(), json!(name));
        GeometryFeature::new(Point::new(x, y), properties)
    }

    #[test]
    fn empty_group_yields_nothing() {
        assert_eq!(interpret_group(&[], TOL), ExtractedGroup::default());
    }

    #[test]
    fn disjoint_lines_each_become_one_edge() {
        let group = interpret_group(
            &[line(&[(0.0, 0.0), (1.0, 0.0)]), line(&[(0.0, 1.0), (1.0, 1.0)])],
            TOL,
        );
        assert_eq!(group.nodes.len(), 4);
        assert_eq!(group.edges.len(), 2);
        assert_eq!((group.edges[0].from, group.edges[0].to), (0, 1));
        assert_eq!((group.edges[1].from, group.edges[1].to), (2, 3));
    }

    #[test]
    fn stations_on_a_line_split_it() {
        let group = interpret_group(
            &[
                line(&[(0.0, 0.0), (2.0, 0.0)]),
                station(1.0, 0.00005, "Central"),
            ],
            TOL,
        );
        assert_eq!(group.nodes[0].name, "Central");
        assert_eq!(group.nodes.len(), 3);
        assert_eq!(group.edges.len(), 2);
        let touching_station = group
            .edges
            .iter()
            .filter(|edge| edge.from == 0 || edge.to == 0)
            .count();
        assert_eq!(touching_station, 2);
    }

    #[test]
    fn near_coincident_endpoints_share_a_node() {
        let group = interpret_group(
            &[
                line(&[(0.0, 0.0), (1.0, 0.0)]),
                line(&[(1.00005, 0.0), (1.0, 1.0)]),
                line(&[(1.0, 0.00002), (2.0, 0.0)]),
            ],
            TOL,
        );
        assert_eq!(group.nodes.len(), 4);
        assert_eq!(group.edges.len(), 3);
        for edge in &group.edges {
            assert!(edge.from < group.nodes.len());
            assert!(edge.to < group.nodes.len());
        }
    }

    #[test]
    fn cuts_next_to_a_line_end_do_not_make_self_loops() {
        // The station is just over tolerance from (0, 0) but snaps to within it.
        let group = interpret_group(
            &[
                line(&[(0.0, 0.0), (2.0, 0.0)]),
                station(0.00008, 0.00009, "Corner"),
            ],
            TOL,
        );
        assert_eq!(group.nodes.len(), 3);
        assert_eq!(group.edges.len(), 1);
        assert!(group.edges.iter().all(|edge| edge.from != edge.to));
        assert_eq!(group.edges[0].line, LineString::from(vec![(0.0, 0.0), (2.0, 0.0)]));
    }

    #[test]
    fn polygons_are_ignored() {
        let polygon = geo::Polygon::new(
            LineString::from(vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 0.0)]),
            vec![],
        );
        let group = interpret_group(&[GeometryFeature::new(polygon, JsonMap::new())], TOL);
        assert!(group.is_empty());
    }
}
