use geo::{EuclideanDistance, Point};

/// Length of one degree of latitude, and of longitude at the equator.
pub const METERS_PER_DEGREE: f64 = 111_320.0;

/// Whether two points are within `tolerance` degrees of each other (inclusive).
#[must_use]
pub fn points_within_tolerance(p1: Point<f64>, p2: Point<f64>, tolerance: f64) -> bool {
    p1.euclidean_distance(&p2) <= tolerance
}

/// Convert a metric radius at `latitude` into `(dlon, dlat)` half-extents in degrees.
#[must_use]
pub fn meters_to_degrees(radius_meters: f64, latitude: f64) -> (f64, f64) {
    let dlat = radius_meters / METERS_PER_DEGREE;
    let cos_lat = latitude.to_radians().cos().abs().max(f64::EPSILON);
    (dlat / cos_lat, dlat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn tolerance_is_inclusive() {
        let a = Point::new(0.0, 0.0);
        assert!(points_within_tolerance(a, Point::new(0.0001, 0.0), 0.0001));
        assert!(!points_within_tolerance(a, Point::new(0.00011, 0.0), 0.0001));
    }

    #[test]
    fn longitude_extent_grows_with_latitude() {
        let (dlon_eq, dlat_eq) = meters_to_degrees(1_113.2, 0.0);
        assert!((dlat_eq - 0.01).abs() < 1e-12);
        assert!((dlon_eq - 0.01).abs() < 1e-12);

        let (dlon_60, dlat_60) = meters_to_degrees(1_113.2, 60.0);
        assert!((dlat_60 - 0.01).abs() < 1e-12);
        assert!((dlon_60 - 0.02).abs() < 1e-9);
    }

    #[test]
    fn poles_stay_finite() {
        let (dlon, _) = meters_to_degrees(100.0, 90.0);
        assert!(dlon.is_finite());
    }

    proptest! {
        #[test]
        fn tolerance_is_symmetric(
            x1 in -180.0f64..180.0, y1 in -90.0f64..90.0,
            x2 in -180.0f64..180.0, y2 in -90.0f64..90.0,
            tol in 0.0f64..1.0,
        ) {
            let a = Point::new(x1, y1);
            let b = Point::new(x2, y2);
            prop_assert_eq!(points_within_tolerance(a, b, tol), points_within_tolerance(b, a, tol));
            prop_assert!(points_within_tolerance(a, a, tol));
        }
    }
}
