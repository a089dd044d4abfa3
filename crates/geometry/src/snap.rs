use geo::{Coord, LineString, Point};
use std::cmp::Ordering;

const POSITION_EPSILON: f64 = 1e-12;

/// Location along a line string: segment index plus the fraction along that segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinePosition {
    pub segment: usize,
    pub t: f64,
}

impl LinePosition {
    fn cmp_along(&self, other: &Self) -> Ordering {
        self.segment
            .cmp(&other.segment)
            .then(self.t.partial_cmp(&other.t).unwrap_or(Ordering::Equal))
    }

    /// Move a position sitting on a segment end to the start of the next segment.
    fn normalized(self, segments: usize) -> Self {
        if self.t >= 1.0 - POSITION_EPSILON && self.segment + 1 < segments {
            Self {
                segment: self.segment + 1,
                t: 0.0,
            }
        } else {
            self
        }
    }

    fn same_as(&self, other: &Self) -> bool {
        self.segment == other.segment && (self.t - other.t).abs() <= POSITION_EPSILON
    }
}

/// A candidate point moved onto a line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnappedPoint {
    /// Index of the candidate in the input slice
    pub index: usize,
    pub original: Point<f64>,
    pub snapped: Point<f64>,
    pub position: LinePosition,
    pub distance: f64,
}

fn project_onto_segment(p: Coord<f64>, a: Coord<f64>, b: Coord<f64>) -> (f64, Coord<f64>) {
    let ab = b - a;
    let len_sq = ab.x * ab.x + ab.y * ab.y;
    if len_sq <= 0.0 {
        return (0.0, a);
    }
    let ap = p - a;
    let t = ((ap.x * ab.x + ap.y * ab.y) / len_sq).clamp(0.0, 1.0);
    (t, a + ab * t)
}

fn distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
    (a.x - b.x).hypot(a.y - b.y)
}

/// Nearest location on `line` to `point`: (position, snapped location, distance).
/// `None` for lines with fewer than two coordinates.
#[must_use]
pub fn project_onto_line(point: Point<f64>, line: &LineString<f64>) -> Option<(LinePosition, Point<f64>, f64)> {
    let p = point.0;
    let mut best: Option<(LinePosition, Coord<f64>, f64)> = None;
    for (segment, window) in line.0.windows(2).enumerate() {
        let (t, projected) = project_onto_segment(p, window[0], window[1]);
        let d = distance(p, projected);
        if best.as_ref().map_or(true, |(_, _, best_d)| d < *best_d) {
            best = Some((LinePosition { segment, t }, projected, d));
        }
    }
    best.map(|(position, projected, d)| {
        let normalized = position.normalized(line.0.len().saturating_sub(1));
        (normalized, Point::from(projected), d)
    })
}

/// Move every candidate within `tolerance` of `line` onto its nearest location on the line.
/// Candidates further away are dropped; output keeps input order.
#[must_use]
pub fn snap_points_to_line(
    points: &[Point<f64>],
    line: &LineString<f64>,
    tolerance: f64,
) -> Vec<SnappedPoint> {
    points
        .iter()
        .enumerate()
        .filter_map(|(index, point)| {
            let (position, snapped, distance) = project_onto_line(*point, line)?;
            (distance <= tolerance).then_some(SnappedPoint {
                index,
                original: *point,
                snapped,
                position,
                distance,
            })
        })
        .collect()
}

fn interpolate(line: &LineString<f64>, position: LinePosition) -> Coord<f64> {
    let a = line.0[position.segment];
    let b = line.0[position.segment + 1];
    a + (b - a) * position.t
}

/// Cut `line` at the locations nearest to `points`.
///
/// Cuts at either end of the line are ignored and coincident cuts collapse, so no piece
/// is empty. A line without interior cuts comes back as a single piece.
#[must_use]
pub fn split_line_at_points(line: &LineString<f64>, points: &[Point<f64>]) -> Vec<LineString<f64>> {
    let coords = &line.0;
    if coords.len() < 2 {
        return vec![line.clone()];
    }
    let segments = coords.len() - 1;
    let is_start = |p: &LinePosition| p.segment == 0 && p.t <= POSITION_EPSILON;
    let is_end = |p: &LinePosition| p.segment + 1 == segments && p.t >= 1.0 - POSITION_EPSILON;

    let mut cuts: Vec<LinePosition> = points
        .iter()
        .filter_map(|point| project_onto_line(*point, line).map(|(position, _, _)| position))
        .filter(|position| !is_start(position) && !is_end(position))
        .collect();
    cuts.sort_by(LinePosition::cmp_along);
    cuts.dedup_by(|later, earlier| later.same_as(earlier));

    let mut pieces = Vec::with_capacity(cuts.len() + 1);
    let mut current = vec![coords[0]];
    let mut next_vertex = 1;
    for cut in cuts {
        while next_vertex <= cut.segment {
            current.push(coords[next_vertex]);
            next_vertex += 1;
        }
        let at = interpolate(line, cut);
        if current.last() != Some(&at) {
            current.push(at);
        }
        if current.len() >= 2 {
            pieces.push(LineString::new(std::mem::replace(&mut current, vec![at])));
        } else {
            current = vec![at];
        }
    }
    current.extend_from_slice(&coords[next_vertex..]);
    if current.len() >= 2 {
        pieces.push(LineString::new(current));
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::EuclideanLength;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn line() -> LineString<f64> {
        LineString::from(vec![(0.0, 0.0), (1.0, 0.0), (2.0, 0.0)])
    }

    #[test]
    fn snaps_only_nearby_candidates() {
        let snapped = snap_points_to_line(
            &[Point::new(0.5, 0.00005), Point::new(0.5, 0.5)],
            &line(),
            0.0001,
        );
        assert_eq!(snapped.len(), 1);
        assert_eq!(snapped[0].index, 0);
        assert_eq!(snapped[0].snapped, Point::new(0.5, 0.0));
        assert_eq!(snapped[0].position, LinePosition { segment: 0, t: 0.5 });
    }

    #[test]
    fn splits_at_interior_points() {
        let pieces = split_line_at_points(&line(), &[Point::new(1.5, 0.0), Point::new(0.5, 0.0)]);
        assert_eq!(
            pieces,
            vec![
                LineString::from(vec![(0.0, 0.0), (0.5, 0.0)]),
                LineString::from(vec![(0.5, 0.0), (1.0, 0.0), (1.5, 0.0)]),
                LineString::from(vec![(1.5, 0.0), (2.0, 0.0)]),
            ]
        );
    }

    #[test]
    fn endpoints_and_duplicates_do_not_create_empty_pieces() {
        let pieces = split_line_at_points(
            &line(),
            &[
                Point::new(0.0, 0.0),
                Point::new(2.0, 0.0),
                Point::new(1.0, 0.0),
                Point::new(1.0, 0.0),
            ],
        );
        assert_eq!(
            pieces,
            vec![
                LineString::from(vec![(0.0, 0.0), (1.0, 0.0)]),
                LineString::from(vec![(1.0, 0.0), (2.0, 0.0)]),
            ]
        );
    }

    #[test]
    fn no_cuts_returns_the_line() {
        assert_eq!(split_line_at_points(&line(), &[]), vec![line()]);
    }

    proptest! {
        #[test]
        fn pieces_preserve_length(cuts in proptest::collection::vec(0.0f64..2.0, 0..6)) {
            let points: Vec<Point<f64>> = cuts.iter().map(|x| Point::new(*x, 0.0)).collect();
            let pieces = split_line_at_points(&line(), &points);
            let total: f64 = pieces.iter().map(|piece| piece.euclidean_length()).sum();
            prop_assert!((total - 2.0).abs() < 1e-9);
            prop_assert!(pieces.iter().all(|piece| piece.0.len() >= 2));
        }
    }
}
