//! Configuration-space geometry for time-optimal trajectory generation.
//!
//! Turns a polyline of joint-space waypoints into a C¹ curve parameterized
//! by arc length: straight runs joined by circular blends at the interior
//! waypoints, each blend bounded by a maximum deviation from its corner.
//! The temporal layer queries the curve for position, tangent, and
//! curvature, and for the arc lengths where the binding constraint on the
//! path velocity can change.

pub mod path;
pub mod segment;

pub use path::{Path, PathError};
pub use segment::{CircularSegment, LinearSegment, Segment};

/// Tolerance for degeneracy tests and boundary comparisons.
pub const EPSILON: f64 = 1e-6;
