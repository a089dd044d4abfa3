use geo::Point;
use rstar::primitives::GeomWithData;
use rstar::{RTree, AABB};

type Entry<T> = GeomWithData<[f64; 2], T>;

/// R-tree of points carrying a payload, queried by tolerance radius.
#[derive(Debug, Clone)]
pub struct PointIndex<T> {
    tree: RTree<Entry<T>>,
}

impl<T> Default for PointIndex<T> {
    fn default() -> Self {
        Self { tree: RTree::new() }
    }
}

impl<T> PointIndex<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bulk_load(points: impl IntoIterator<Item = (Point<f64>, T)>) -> Self {
        let entries = points
            .into_iter()
            .map(|(point, data)| GeomWithData::new([point.x(), point.y()], data))
            .collect();
        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    pub fn insert(&mut self, point: Point<f64>, data: T) {
        self.tree.insert(GeomWithData::new([point.x(), point.y()], data));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Every payload within `tolerance` of `point` (inclusive), in no particular order.
    pub fn within(&self, point: Point<f64>, tolerance: f64) -> impl Iterator<Item = &T> {
        self.tree
            .locate_within_distance([point.x(), point.y()], tolerance * tolerance)
            .map(|entry| &entry.data)
    }

    /// Payloads inside the axis-aligned box `[min, max]`, grown by `margin` on every side.
    pub fn within_box(
        &self,
        min: Point<f64>,
        max: Point<f64>,
        margin: f64,
    ) -> impl Iterator<Item = (Point<f64>, &T)> {
        let envelope = AABB::from_corners(
            [min.x() - margin, min.y() - margin],
            [max.x() + margin, max.y() + margin],
        );
        self.tree
            .locate_in_envelope(&envelope)
            .map(|entry| (Point::new(entry.geom()[0], entry.geom()[1]), &entry.data))
    }

    /// Closest payload within `tolerance`, if any.
    #[must_use]
    pub fn nearest_within(&self, point: Point<f64>, tolerance: f64) -> Option<&T> {
        let query = [point.x(), point.y()];
        self.tree
            .nearest_neighbor(&query)
            .filter(|entry| {
                let [x, y] = *entry.geom();
                let (dx, dy) = (x - query[0], y - query[1]);
                dx * dx + dy * dy <= tolerance * tolerance
            })
            .map(|entry| &entry.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_points_within_radius() {
        let mut index = PointIndex::new();
        index.insert(Point::new(0.0, 0.0), 1u64);
        index.insert(Point::new(0.00005, 0.0), 2u64);
        index.insert(Point::new(1.0, 1.0), 3u64);

        let mut hits: Vec<u64> = index.within(Point::new(0.0, 0.0), 0.0001).copied().collect();
        hits.sort_unstable();
        assert_eq!(hits, vec![1, 2]);

        assert_eq!(index.nearest_within(Point::new(0.00004, 0.0), 0.0001), Some(&2));
        assert_eq!(index.nearest_within(Point::new(0.5, 0.5), 0.0001), None);
        assert_eq!(index.len(), 3);
    }
}
