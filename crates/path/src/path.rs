//! Piecewise C¹ joint-space path assembled from a waypoint polyline.

use nalgebra::DVector;
use thiserror::Error;

use crate::segment::{CircularSegment, LinearSegment, Segment};
use crate::EPSILON;

/// Failure modes of path construction.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PathError {
    #[error("at least two distinct waypoints are required, got {0}")]
    TooFewWaypoints(usize),
    #[error("waypoint {index} has dimension {got}, expected {expected}")]
    DimensionMismatch {
        index: usize,
        got: usize,
        expected: usize,
    },
    #[error("max_deviation must be positive, got {0}")]
    NonPositiveDeviation(f64),
}

/// A segment placed along the aggregate path.
#[derive(Debug, Clone)]
struct PlacedSegment {
    /// Arc length of the segment start along the whole path.
    start: f64,
    segment: Segment,
}

/// Arc-length-parameterized C¹ path through joint space.
///
/// Interior waypoints are rounded off with circular blends so the tangent
/// is continuous everywhere except at the recorded curvature
/// discontinuities (the blend tangency points).
#[derive(Debug, Clone)]
pub struct Path {
    segments: Vec<PlacedSegment>,
    length: f64,
    /// Arc lengths where the binding velocity constraint can change,
    /// paired with whether the curvature jumps there.
    switching_points: Vec<(f64, bool)>,
    dim: usize,
}

impl Path {
    /// Build a path through `waypoints`, blending interior corners with
    /// circular arcs that stay within `max_deviation` of each corner.
    ///
    /// Exactly coincident consecutive waypoints are dropped; runs of
    /// collinear waypoints collapse into a single straight segment.
    pub fn new(waypoints: &[DVector<f64>], max_deviation: f64) -> Result<Self, PathError> {
        if max_deviation <= 0.0 {
            return Err(PathError::NonPositiveDeviation(max_deviation));
        }
        let dim = waypoints.first().map_or(0, DVector::len);
        let mut points: Vec<&DVector<f64>> = Vec::with_capacity(waypoints.len());
        for (index, waypoint) in waypoints.iter().enumerate() {
            if waypoint.len() != dim {
                return Err(PathError::DimensionMismatch {
                    index,
                    got: waypoint.len(),
                    expected: dim,
                });
            }
            if points.last().map_or(true, |last| (waypoint - *last).norm() > EPSILON) {
                points.push(waypoint);
            }
        }
        if points.len() < 2 {
            return Err(PathError::TooFewWaypoints(points.len()));
        }

        let mut segments: Vec<Segment> = Vec::new();
        let mut start_config = points[0].clone();
        for i in 1..points.len() - 1 {
            let incoming = (points[i] - points[i - 1]).normalize();
            let outgoing = (points[i + 1] - points[i]).normalize();
            let cos_angle = incoming.dot(&outgoing);
            if cos_angle > 1.0 - EPSILON {
                // Straight through: the current run keeps going
                continue;
            }
            if cos_angle < -1.0 + EPSILON {
                // Full reversal: no tangent-continuous blend exists, so the
                // run breaks at the corner itself
                segments.push(Segment::Linear(LinearSegment::new(
                    start_config,
                    points[i].clone(),
                )));
                start_config = points[i].clone();
                continue;
            }
            // Blend against the midpoints of both edges so the tangency
            // distance never exceeds half of either edge and adjacent
            // blends cannot overlap.
            let before_mid = (points[i - 1] + points[i]) * 0.5;
            let after_mid = (points[i] + points[i + 1]) * 0.5;
            let blend = CircularSegment::new(&before_mid, points[i], &after_mid, max_deviation);
            if blend.length() > 0.0 {
                let blend_start = blend.config(0.0);
                if (&blend_start - &start_config).norm() > EPSILON {
                    segments.push(Segment::Linear(LinearSegment::new(
                        start_config,
                        blend_start,
                    )));
                }
                start_config = blend.config(blend.length());
                segments.push(Segment::Circular(blend));
            }
        }
        let goal = points[points.len() - 1];
        if (goal - &start_config).norm() > EPSILON {
            segments.push(Segment::Linear(LinearSegment::new(
                start_config,
                goal.clone(),
            )));
        }

        // Place segments along the aggregate arc length and collect the
        // switching points: intrinsic candidates plus every interior
        // segment boundary (all boundaries left after assembly carry a
        // curvature jump).
        let mut placed = Vec::with_capacity(segments.len());
        let mut switching_points: Vec<(f64, bool)> = Vec::new();
        let mut length = 0.0;
        for segment in segments {
            let start = length;
            for local in segment.switching_points() {
                switching_points.push((start + local, false));
            }
            length += segment.length();
            while switching_points
                .last()
                .map_or(false, |&(s, _)| s >= length)
            {
                switching_points.pop();
            }
            switching_points.push((length, true));
            placed.push(PlacedSegment { start, segment });
        }
        // The path end is not a switching point
        switching_points.pop();

        Ok(Self {
            segments: placed,
            length,
            switching_points,
            dim,
        })
    }

    /// Total arc length.
    pub fn length(&self) -> f64 {
        self.length
    }

    /// Configuration-space dimension.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Configuration at arc length `s` (clamped to the path).
    pub fn config(&self, s: f64) -> DVector<f64> {
        let (segment, local) = self.segment_at(s);
        segment.config(local)
    }

    /// Unit tangent at arc length `s` (clamped to the path).
    pub fn tangent(&self, s: f64) -> DVector<f64> {
        let (segment, local) = self.segment_at(s);
        segment.tangent(local)
    }

    /// Curvature at arc length `s` (clamped to the path).
    pub fn curvature(&self, s: f64) -> DVector<f64> {
        let (segment, local) = self.segment_at(s);
        segment.curvature(local)
    }

    /// First switching point strictly after `s`, with its curvature
    /// discontinuity flag; `(length, true)` once none remain.
    pub fn next_switching_point(&self, s: f64) -> (f64, bool) {
        self.switching_points
            .iter()
            .find(|&&(pos, _)| pos > s)
            .copied()
            .unwrap_or((self.length, true))
    }

    /// All switching points as (arc length, curvature discontinuity).
    pub fn switching_points(&self) -> &[(f64, bool)] {
        &self.switching_points
    }

    /// The segment owning arc length `s`, and `s` relative to its start.
    /// A boundary value belongs to the later segment.
    fn segment_at(&self, s: f64) -> (&Segment, f64) {
        let s = s.clamp(0.0, self.length);
        let index = self
            .segments
            .partition_point(|placed| placed.start <= s)
            .saturating_sub(1);
        let placed = &self.segments[index];
        (&placed.segment, s - placed.start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    fn v2(x: f64, y: f64) -> DVector<f64> {
        DVector::from_column_slice(&[x, y])
    }

    fn right_angle_waypoints() -> Vec<DVector<f64>> {
        vec![v2(0.0, 0.0), v2(1.0, 0.0), v2(1.0, 1.0)]
    }

    /// Tangency distance of a 90° blend with the given deviation.
    fn right_angle_tangency(deviation: f64) -> f64 {
        let half = FRAC_PI_2 / 2.0;
        deviation * half.sin() / (1.0 - half.cos())
    }

    #[test]
    fn right_angle_corner_layout() {
        let path = Path::new(&right_angle_waypoints(), 0.1).unwrap();
        assert_eq!(path.segments.len(), 3);

        let tangency = right_angle_tangency(0.1);
        let expected = 2.0 * (1.0 - tangency) + FRAC_PI_2 * tangency;
        assert_relative_eq!(path.length(), expected, epsilon = 1e-9);

        // Endpoints are preserved exactly
        assert_relative_eq!(path.config(0.0), v2(0.0, 0.0), epsilon = 1e-9);
        assert_relative_eq!(path.config(path.length()), v2(1.0, 1.0), epsilon = 1e-9);
    }

    #[test]
    fn length_is_sum_of_segment_lengths() {
        let path = Path::new(&right_angle_waypoints(), 0.1).unwrap();
        let total: f64 = path
            .segments
            .iter()
            .map(|placed| placed.segment.length())
            .sum();
        assert!((path.length() - total).abs() < 1e-9);
    }

    #[test]
    fn tangent_is_continuous_at_blend_boundaries() {
        let path = Path::new(&right_angle_waypoints(), 0.1).unwrap();
        for &(s, discontinuity) in path.switching_points() {
            assert!(discontinuity, "blend boundaries carry the discontinuity flag");
            let before = path.tangent(s - 1e-9);
            let after = path.tangent(s + 1e-9);
            assert!(
                before.dot(&after) >= 1.0 - 1e-6,
                "tangent jump at s = {s}: {before} vs {after}"
            );
        }
    }

    #[test]
    fn corner_deviation_stays_within_bound() {
        let deviation = 0.1;
        let path = Path::new(&right_angle_waypoints(), deviation).unwrap();
        let corner = v2(1.0, 0.0);
        let closest = (0..=1000)
            .map(|i| path.length() * f64::from(i) / 1000.0)
            .map(|s| (path.config(s) - &corner).norm())
            .fold(f64::MAX, f64::min);
        assert!(
            closest <= deviation + 1e-9,
            "path passes {closest} away from the corner, deviation bound {deviation}"
        );
    }

    #[test]
    fn chord_never_exceeds_arc_length() {
        let path = Path::new(&right_angle_waypoints(), 0.1).unwrap();
        let samples = 50;
        for i in 0..samples {
            for j in (i + 1)..=samples {
                let s1 = path.length() * f64::from(i) / f64::from(samples);
                let s2 = path.length() * f64::from(j) / f64::from(samples);
                let chord = (path.config(s2) - path.config(s1)).norm();
                assert!(
                    chord <= s2 - s1 + 1e-9,
                    "chord {chord} exceeds arc length {}",
                    s2 - s1
                );
            }
        }
    }

    #[test]
    fn collinear_waypoints_collapse_to_one_segment() {
        let waypoints = vec![v2(0.0, 0.0), v2(0.5, 0.0), v2(1.0, 0.0)];
        let path = Path::new(&waypoints, 0.1).unwrap();
        assert_eq!(path.segments.len(), 1);
        assert_relative_eq!(path.length(), 1.0, epsilon = 1e-12);
        assert!(path.switching_points().is_empty());
    }

    #[test]
    fn duplicate_waypoints_are_dropped() {
        let waypoints = vec![v2(0.0, 0.0), v2(0.0, 0.0), v2(1.0, 0.0)];
        let path = Path::new(&waypoints, 0.1).unwrap();
        assert_eq!(path.segments.len(), 1);
        assert_relative_eq!(path.length(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn rejects_degenerate_input() {
        assert!(matches!(
            Path::new(&right_angle_waypoints(), 0.0),
            Err(PathError::NonPositiveDeviation(_))
        ));
        assert!(matches!(
            Path::new(&[], 0.1),
            Err(PathError::TooFewWaypoints(0))
        ));
        assert!(matches!(
            Path::new(&[v2(1.0, 2.0)], 0.1),
            Err(PathError::TooFewWaypoints(1))
        ));
        let mixed = vec![v2(0.0, 0.0), DVector::from_column_slice(&[1.0, 0.0, 0.0])];
        assert!(matches!(
            Path::new(&mixed, 0.1),
            Err(PathError::DimensionMismatch { index: 1, .. })
        ));
    }

    #[test]
    fn switching_points_bracket_the_blend() {
        let path = Path::new(&right_angle_waypoints(), 0.1).unwrap();
        let tangency = right_angle_tangency(0.1);
        let arc_start = 1.0 - tangency;
        let arc_end = arc_start + FRAC_PI_2 * tangency;

        let (first, first_disc) = path.next_switching_point(0.0);
        assert!(first_disc);
        assert_relative_eq!(first, arc_start, epsilon = 1e-9);

        let (second, second_disc) = path.next_switching_point(first);
        assert!(second_disc);
        assert_relative_eq!(second, arc_end, epsilon = 1e-9);

        // Past the last switching point the query reports the path end
        let (end, end_disc) = path.next_switching_point(second);
        assert!(end_disc);
        assert_relative_eq!(end, path.length(), epsilon = 1e-12);
    }

    #[test]
    fn queries_clamp_to_path_range() {
        let path = Path::new(&right_angle_waypoints(), 0.1).unwrap();
        assert_relative_eq!(path.config(-0.5), v2(0.0, 0.0), epsilon = 1e-12);
        assert_relative_eq!(path.config(path.length() + 0.5), v2(1.0, 1.0), epsilon = 1e-12);
    }

    #[test]
    fn reversal_breaks_the_run_at_the_corner() {
        let waypoints = vec![v2(0.0, 0.0), v2(1.0, 0.0), v2(0.25, 0.0)];
        let path = Path::new(&waypoints, 0.1).unwrap();
        assert_eq!(path.segments.len(), 2);
        assert_relative_eq!(path.length(), 1.75, epsilon = 1e-12);
        assert_relative_eq!(path.config(path.length()), v2(0.25, 0.0), epsilon = 1e-12);
    }
}
