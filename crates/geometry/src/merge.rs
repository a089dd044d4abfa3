use crate::index::PointIndex;
use geo::{BoundingRect, Coord, EuclideanDistance, Geometry, LineString, Point};
use geonet_protocol::{GeometryFeature, JsonMap};
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{RTree, AABB};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum End {
    Start,
    Finish,
}

#[derive(Debug, Clone, Copy)]
struct LineEnd {
    line: usize,
    end: End,
}

fn endpoint(line: &LineString<f64>, end: End) -> Option<Point<f64>> {
    match end {
        End::Start => line.0.first().copied().map(Point::from),
        End::Finish => line.0.last().copied().map(Point::from),
    }
}

fn other(end: End) -> End {
    match end {
        End::Start => End::Finish,
        End::Finish => End::Start,
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Union two property maps: keys present on one side are kept, empty values yield the
/// other side's value and conflicting values are joined with `", "`.
#[must_use]
pub fn merge_properties(a: &JsonMap, b: &JsonMap) -> JsonMap {
    let mut merged = a.clone();
    for (key, b_value) in b {
        let value = match a.get(key) {
            None => b_value.clone(),
            Some(a_value) if is_empty_value(a_value) => b_value.clone(),
            Some(a_value) if is_empty_value(b_value) || a_value == b_value => a_value.clone(),
            Some(a_value) => Value::String(format!("{}, {}", render(a_value), render(b_value))),
        };
        merged.insert(key.clone(), value);
    }
    merged
}

struct MergePass<'a> {
    lines: Vec<(usize, &'a LineString<f64>)>,
    endpoints: PointIndex<LineEnd>,
    extents: RTree<GeomWithData<Rectangle<[f64; 2]>, usize>>,
    tolerance: f64,
}

impl<'a> MergePass<'a> {
    fn new(features: &'a [GeometryFeature], tolerance: f64) -> Self {
        let lines: Vec<(usize, &LineString<f64>)> = features
            .iter()
            .enumerate()
            .filter_map(|(idx, feature)| match &feature.geometry {
                Geometry::LineString(line) if line.0.len() >= 2 => Some((idx, line)),
                _ => None,
            })
            .collect();

        let endpoints = PointIndex::bulk_load(lines.iter().flat_map(|(idx, line)| {
            [End::Start, End::Finish].into_iter().filter_map(move |end| {
                endpoint(line, end).map(|point| (point, LineEnd { line: *idx, end }))
            })
        }));

        let extents = RTree::bulk_load(
            lines
                .iter()
                .filter_map(|(idx, line)| {
                    let rect = line.bounding_rect()?;
                    Some(GeomWithData::new(
                        Rectangle::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
                        *idx,
                    ))
                })
                .collect(),
        );

        Self {
            lines,
            endpoints,
            extents,
            tolerance,
        }
    }

    /// The single other line end meeting `at`, if the junction is a plain two-way joint.
    fn partner(&self, features: &[GeometryFeature], at: LineEnd) -> Option<LineEnd> {
        let line = line_of(features, at.line)?;
        let junction = endpoint(line, at.end)?;

        let touching: Vec<LineEnd> = self
            .endpoints
            .within(junction, self.tolerance)
            .copied()
            .filter(|candidate| !(candidate.line == at.line && candidate.end == at.end))
            .collect();
        let [partner] = touching.as_slice() else {
            return None;
        };
        if partner.line == at.line {
            return None;
        }

        // A third line passing through the junction makes it a branch point.
        let t = self.tolerance;
        let envelope = AABB::from_corners(
            [junction.x() - t, junction.y() - t],
            [junction.x() + t, junction.y() + t],
        );
        let branches = self
            .extents
            .locate_in_envelope_intersecting(&envelope)
            .map(|entry| entry.data)
            .filter(|idx| *idx != at.line && *idx != partner.line)
            .filter_map(|idx| line_of(features, idx))
            .any(|other_line| junction.euclidean_distance(other_line) <= t);
        if branches {
            return None;
        }

        // The far ends meeting as well would close a ring.
        let partner_line = line_of(features, partner.line)?;
        let far_a = endpoint(line, other(at.end))?;
        let far_b = endpoint(partner_line, other(partner.end))?;
        if far_a.euclidean_distance(&far_b) <= t {
            return None;
        }

        Some(*partner)
    }
}

fn line_of(features: &[GeometryFeature], idx: usize) -> Option<&LineString<f64>> {
    match &features.get(idx)?.geometry {
        Geometry::LineString(line) => Some(line),
        _ => None,
    }
}

/// Join `a` and `b` at the ends that meet; the junction coordinate is kept once.
fn join(a: &LineString<f64>, a_end: End, b: &LineString<f64>, b_end: End) -> LineString<f64> {
    let mut coords: Vec<Coord<f64>> = a.0.clone();
    if a_end == End::Start {
        coords.reverse();
    }
    let mut tail: Vec<Coord<f64>> = b.0.clone();
    if b_end == End::Finish {
        tail.reverse();
    }
    coords.extend(tail.into_iter().skip(1));
    LineString::new(coords)
}

fn merge_pass(features: &[GeometryFeature], tolerance: f64) -> Option<Vec<GeometryFeature>> {
    let pass = MergePass::new(features, tolerance);
    let mut used = vec![false; features.len()];
    let mut replaced: Vec<Option<GeometryFeature>> = vec![None; features.len()];
    let mut merged_any = false;

    for (idx, line) in &pass.lines {
        for end in [End::Start, End::Finish] {
            if used[*idx] {
                break;
            }
            let Some(partner) = pass.partner(features, LineEnd { line: *idx, end }) else {
                continue;
            };
            if used[partner.line] {
                continue;
            }
            let Some(partner_line) = line_of(features, partner.line) else {
                continue;
            };
            let geometry = join(line, end, partner_line, partner.end);
            let properties = merge_properties(
                &features[*idx].properties,
                &features[partner.line].properties,
            );
            used[*idx] = true;
            used[partner.line] = true;
            replaced[*idx] = Some(GeometryFeature::new(geometry, properties));
            merged_any = true;
        }
    }
    if !merged_any {
        return None;
    }

    Some(
        features
            .iter()
            .enumerate()
            .filter_map(|(idx, feature)| match replaced[idx].take() {
                Some(merged) => Some(merged),
                None if used[idx] => None,
                None => Some(feature.clone()),
            })
            .collect(),
    )
}

/// Repeatedly union line features whose endpoints meet within `tolerance` until nothing
/// changes. Junctions touched by a third line are left alone, as are merges that would
/// turn the pair into a closed ring. Non-line features pass through untouched.
#[must_use]
pub fn merge_touching_lines(features: &[GeometryFeature], tolerance: f64) -> Vec<GeometryFeature> {
    let mut current = features.to_vec();
    let mut passes = 0usize;
    while let Some(next) = merge_pass(&current, tolerance) {
        passes += 1;
        current = next;
    }
    log::debug!(
        "Merged {} line features into {} in {passes} passes",
        features.len(),
        current.len()
    );
    current
}
