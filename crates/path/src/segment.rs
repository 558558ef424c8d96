//! Arc-length-parameterized path primitives: straight runs and circular
//! corner blends.

use std::f64::consts::PI;

use nalgebra::DVector;

use crate::EPSILON;

/// Straight segment between two joint-space configurations.
#[derive(Debug, Clone)]
pub struct LinearSegment {
    start: DVector<f64>,
    end: DVector<f64>,
    /// Cached ‖end − start‖.
    length: f64,
}

impl LinearSegment {
    pub fn new(start: DVector<f64>, end: DVector<f64>) -> Self {
        let length = (&end - &start).norm();
        Self { start, end, length }
    }

    pub fn length(&self) -> f64 {
        self.length
    }

    /// Configuration at arc length `s`, clamped to the segment.
    pub fn config(&self, s: f64) -> DVector<f64> {
        let u = (s / self.length).clamp(0.0, 1.0);
        &self.start + (&self.end - &self.start) * u
    }

    /// Unit first derivative w.r.t. arc length — constant along the run.
    pub fn tangent(&self) -> DVector<f64> {
        (&self.end - &self.start) / self.length
    }

    /// Second derivative w.r.t. arc length — zero on a straight run.
    pub fn curvature(&self) -> DVector<f64> {
        DVector::zeros(self.start.len())
    }
}

/// Circular blend replacing the sharp corner at an interior waypoint.
///
/// The arc lies in the plane spanned by the incoming and outgoing
/// directions, is tangent to both, and stays within `max_deviation` of the
/// corner. Degenerate corners (coincident bounds, collinear directions)
/// collapse to a zero-length arc that callers drop.
#[derive(Debug, Clone)]
pub struct CircularSegment {
    /// Arc center in joint space.
    center: DVector<f64>,
    /// In-plane unit vector from the center toward the first tangency point.
    x: DVector<f64>,
    /// In-plane unit vector along the incoming direction.
    y: DVector<f64>,
    radius: f64,
    /// Swept angle × radius.
    length: f64,
}

impl CircularSegment {
    /// Build the blend for `corner`, with tangency points bounded by
    /// `start` and `end` and the arc bounded by `max_deviation` from the
    /// corner.
    pub fn new(
        start: &DVector<f64>,
        corner: &DVector<f64>,
        end: &DVector<f64>,
        max_deviation: f64,
    ) -> Self {
        let degenerate = Self {
            center: corner.clone(),
            x: DVector::zeros(corner.len()),
            y: DVector::zeros(corner.len()),
            radius: 1.0,
            length: 0.0,
        };

        let in_chord = corner - start;
        let out_chord = end - corner;
        if in_chord.norm() < EPSILON || out_chord.norm() < EPSILON {
            return degenerate;
        }
        let start_direction = in_chord.normalize();
        let end_direction = out_chord.normalize();
        if (&start_direction - &end_direction).norm() < EPSILON {
            return degenerate;
        }

        // Direction change at the corner.
        let angle = start_direction.dot(&end_direction).clamp(-1.0, 1.0).acos();
        // Tangency distance: capped by the available chord on either side
        // and by the distance that keeps the arc within max_deviation.
        let distance = in_chord
            .norm()
            .min(out_chord.norm())
            .min(max_deviation * (0.5 * angle).sin() / (1.0 - (0.5 * angle).cos()));

        let radius = distance / (0.5 * angle).tan();
        let center =
            corner + (&end_direction - &start_direction).normalize() * (radius / (0.5 * angle).cos());
        let x = (corner - &start_direction * distance - &center).normalize();
        let y = start_direction;

        Self {
            center,
            x,
            y,
            radius,
            length: angle * radius,
        }
    }

    pub fn length(&self) -> f64 {
        self.length
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Configuration at arc length `s`, clamped to the arc.
    pub fn config(&self, s: f64) -> DVector<f64> {
        let angle = s.clamp(0.0, self.length) / self.radius;
        &self.center + (&self.x * angle.cos() + &self.y * angle.sin()) * self.radius
    }

    /// Unit first derivative w.r.t. arc length.
    pub fn tangent(&self, s: f64) -> DVector<f64> {
        let angle = s.clamp(0.0, self.length) / self.radius;
        -&self.x * angle.sin() + &self.y * angle.cos()
    }

    /// Second derivative w.r.t. arc length: magnitude 1/radius, pointing
    /// at the center.
    pub fn curvature(&self, s: f64) -> DVector<f64> {
        let angle = s.clamp(0.0, self.length) / self.radius;
        -(&self.x * angle.cos() + &self.y * angle.sin()) / self.radius
    }

    /// Arc lengths strictly inside the blend where some joint's tangent
    /// component peaks. The per-joint velocity limit curve is not
    /// differentiable there, so the temporal layer treats them as
    /// switching-point candidates. The tangency points themselves are
    /// excluded; those are the owning path's segment boundaries.
    pub fn switching_points(&self) -> Vec<f64> {
        let mut points = Vec::new();
        for i in 0..self.x.len() {
            let mut switching_angle = self.y[i].atan2(self.x[i]);
            if switching_angle < 0.0 {
                switching_angle += PI;
            }
            let switching_point = switching_angle * self.radius;
            if switching_point > EPSILON && switching_point < self.length - EPSILON {
                points.push(switching_point);
            }
        }
        points.sort_by(|a, b| a.partial_cmp(b).unwrap());
        points
    }
}

/// A path primitive: straight run or circular blend.
#[derive(Debug, Clone)]
pub enum Segment {
    Linear(LinearSegment),
    Circular(CircularSegment),
}

impl Segment {
    pub fn length(&self) -> f64 {
        match self {
            Segment::Linear(seg) => seg.length(),
            Segment::Circular(seg) => seg.length(),
        }
    }

    pub fn config(&self, s: f64) -> DVector<f64> {
        match self {
            Segment::Linear(seg) => seg.config(s),
            Segment::Circular(seg) => seg.config(s),
        }
    }

    pub fn tangent(&self, s: f64) -> DVector<f64> {
        match self {
            Segment::Linear(seg) => seg.tangent(),
            Segment::Circular(seg) => seg.tangent(s),
        }
    }

    pub fn curvature(&self, s: f64) -> DVector<f64> {
        match self {
            Segment::Linear(seg) => seg.curvature(),
            Segment::Circular(seg) => seg.curvature(s),
        }
    }

    /// Intrinsic switching-point candidates, as local arc lengths.
    pub fn switching_points(&self) -> Vec<f64> {
        match self {
            Segment::Linear(_) => Vec::new(),
            Segment::Circular(seg) => seg.switching_points(),
        }
    }
}
