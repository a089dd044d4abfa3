//! # Geonet Geometry
//!
//! Pure functions over WGS84 lon/lat geometry. Distances are Euclidean in degree space; the
//! callers pick tolerances in degrees (see [`meters_to_degrees`] for radius conversion).

mod index;
mod merge;
mod snap;
mod tolerance;

pub use index::PointIndex;
pub use merge::{merge_properties, merge_touching_lines};
pub use snap::{project_onto_line, snap_points_to_line, split_line_at_points, LinePosition, SnappedPoint};
pub use tolerance::{meters_to_degrees, points_within_tolerance, METERS_PER_DEGREE};
