//! Host-boundary retiming: discrete joint trajectories in, resampled
//! time-optimal trajectories out.
//!
//! This is the layer a controller stack talks to. It pre-filters the
//! incoming waypoints, solves the time-optimal profile over the blended
//! path, and overwrites the container with samples at a fixed interval
//! (or a fixed waypoint count).

use std::collections::HashMap;

use log::{debug, warn};
use nalgebra::DVector;

use kinetime_path::Path;

use crate::error::TimingError;
use crate::limits::{verify_scaling_factor, JointLimit, LimitType};
use crate::profile::{Trajectory, DEFAULT_TIME_STEP};

/// Maximum deviation from interior waypoints when blending. Units are rad
/// for revolute joints and m for prismatic ones; mixed groups are the
/// caller's problem to warn about.
pub const DEFAULT_PATH_TOLERANCE: f64 = 0.1;
/// Output sample spacing (s).
pub const DEFAULT_RESAMPLE_DT: f64 = 0.1;
/// Waypoints closer than this (∞-norm) to their predecessor are dropped
/// before blending.
pub const DEFAULT_MIN_ANGLE_CHANGE: f64 = 1e-3;

/// One sample of a discrete joint-space trajectory.
#[derive(Debug, Clone, PartialEq)]
pub struct JointTrajectoryPoint {
    pub positions: DVector<f64>,
    pub velocities: DVector<f64>,
    pub accelerations: DVector<f64>,
    /// Time offset from the start of the trajectory (s).
    pub time_from_start: f64,
}

/// Discrete joint-space trajectory, the exchange format with controllers.
#[derive(Debug, Clone, Default)]
pub struct JointTrajectory {
    pub joint_names: Vec<String>,
    pub points: Vec<JointTrajectoryPoint>,
}

impl JointTrajectory {
    pub fn new(joint_names: Vec<String>) -> Self {
        Self {
            joint_names,
            points: Vec::new(),
        }
    }

    /// Append a waypoint with zero velocity and acceleration.
    pub fn push_waypoint(&mut self, positions: DVector<f64>) {
        let dof = positions.len();
        self.points.push(JointTrajectoryPoint {
            positions,
            velocities: DVector::zeros(dof),
            accelerations: DVector::zeros(dof),
            time_from_start: 0.0,
        });
    }

    /// Duration of the stored trajectory (s).
    pub fn duration(&self) -> f64 {
        self.points.last().map_or(0.0, |point| point.time_from_start)
    }
}

/// Outcome of parameterizing a waypoint list.
enum Parameterized {
    /// Fewer than two distinct waypoints: nothing to time.
    Trivial(DVector<f64>),
    Solved(Trajectory),
}

/// Retiming options. Defaults match the usual controller setup: 0.1 blend
/// tolerance, 10 Hz output, 1e-3 waypoint pre-filter.
#[derive(Debug, Clone)]
pub struct Retimer {
    path_tolerance: f64,
    resample_dt: f64,
    min_angle_change: f64,
}

impl Default for Retimer {
    fn default() -> Self {
        Self {
            path_tolerance: DEFAULT_PATH_TOLERANCE,
            resample_dt: DEFAULT_RESAMPLE_DT,
            min_angle_change: DEFAULT_MIN_ANGLE_CHANGE,
        }
    }
}

impl Retimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum blend deviation at interior waypoints.
    pub fn with_path_tolerance(mut self, path_tolerance: f64) -> Self {
        self.path_tolerance = path_tolerance;
        self
    }

    /// Set the output sample spacing (s).
    pub fn with_resample_dt(mut self, resample_dt: f64) -> Self {
        self.resample_dt = resample_dt;
        self
    }

    /// Set the ∞-norm pre-filter distance for adjacent waypoints.
    pub fn with_min_angle_change(mut self, min_angle_change: f64) -> Self {
        self.min_angle_change = min_angle_change;
        self
    }

    /// Re-time `trajectory` in place: blend its waypoints, solve the
    /// time-optimal profile under `limits` (scaled by the two factors),
    /// and replace its points with samples every `resample_dt` seconds.
    ///
    /// Scaling factors outside (0, 1] fall back to 1.0 with a warning.
    pub fn compute_time_stamps(
        &self,
        trajectory: &mut JointTrajectory,
        limits: &[JointLimit],
        velocity_scale: f64,
        acceleration_scale: f64,
    ) -> Result<(), TimingError> {
        let (max_velocity, max_acceleration) =
            scaled_limit_vectors(limits, velocity_scale, acceleration_scale);
        match self.parameterize(trajectory, max_velocity, max_acceleration)? {
            Parameterized::Trivial(positions) => reset_to_rest(trajectory, positions),
            Parameterized::Solved(solved) => self.resample(trajectory, &solved, self.resample_dt),
        }
        Ok(())
    }

    /// Like [`compute_time_stamps`](Self::compute_time_stamps), with
    /// per-joint limit overrides keyed by joint name applied over `limits`.
    pub fn compute_time_stamps_with_limit_maps(
        &self,
        trajectory: &mut JointTrajectory,
        limits: &[JointLimit],
        velocity_overrides: &HashMap<String, f64>,
        acceleration_overrides: &HashMap<String, f64>,
        velocity_scale: f64,
        acceleration_scale: f64,
    ) -> Result<(), TimingError> {
        let merged: Vec<JointLimit> = trajectory
            .joint_names
            .iter()
            .zip(limits)
            .map(|(name, base)| JointLimit {
                max_velocity: velocity_overrides
                    .get(name)
                    .copied()
                    .unwrap_or(base.max_velocity),
                max_acceleration: acceleration_overrides
                    .get(name)
                    .copied()
                    .unwrap_or(base.max_acceleration),
            })
            .collect();
        self.compute_time_stamps(trajectory, &merged, velocity_scale, acceleration_scale)
    }

    /// Blend, validate, and solve; `Trivial` when fewer than two distinct
    /// waypoints survive the pre-filter.
    fn parameterize(
        &self,
        trajectory: &JointTrajectory,
        max_velocity: DVector<f64>,
        max_acceleration: DVector<f64>,
    ) -> Result<Parameterized, TimingError> {
        if trajectory.points.is_empty() {
            return Err(TimingError::EmptyTrajectory);
        }
        let dof = trajectory.joint_names.len();
        if max_velocity.len() != dof || max_acceleration.len() != dof {
            return Err(TimingError::LimitDimensionMismatch {
                velocity: max_velocity.len(),
                acceleration: max_acceleration.len(),
                path: dof,
            });
        }

        // Drop waypoints that barely move any joint; they destabilize the
        // blend geometry without changing the motion.
        let mut waypoints: Vec<DVector<f64>> = Vec::with_capacity(trajectory.points.len());
        for point in &trajectory.points {
            let diverse = waypoints.last().map_or(true, |last: &DVector<f64>| {
                (&point.positions - last).abs().max() > self.min_angle_change
            });
            if diverse {
                waypoints.push(point.positions.clone());
            }
        }
        if waypoints.len() < 2 {
            let resting = waypoints
                .into_iter()
                .next()
                .unwrap_or_else(|| trajectory.points[0].positions.clone());
            return Ok(Parameterized::Trivial(resting));
        }

        let path = Path::new(&waypoints, self.path_tolerance)?;
        let solved = Trajectory::generate(path, max_velocity, max_acceleration, DEFAULT_TIME_STEP)
            .map_err(|err| {
                warn!("time parameterization failed: {err}");
                err
            })?;
        Ok(Parameterized::Solved(solved))
    }

    /// Replace the container's points with samples spaced `resample_dt`
    /// apart; the final sample lands exactly on the duration.
    fn resample(&self, trajectory: &mut JointTrajectory, solved: &Trajectory, resample_dt: f64) {
        let duration = solved.duration();
        let sample_count = (duration / resample_dt).ceil() as usize;
        debug!(
            "retimed trajectory: duration {duration:.3} s, {} samples at {resample_dt} s",
            sample_count + 1
        );

        let mut points = Vec::with_capacity(sample_count + 1);
        for sample in 0..=sample_count {
            let time = (sample as f64 * resample_dt).min(duration);
            points.push(JointTrajectoryPoint {
                positions: solved.position(time),
                velocities: solved.velocity(time),
                accelerations: solved.acceleration(time),
                time_from_start: time,
            });
        }
        trajectory.points = points;
    }
}

/// Re-time `trajectory` into a fixed number of output waypoints instead of
/// a fixed spacing; the spacing is derived from the optimal duration, so
/// the realized count can be off by one from the request.
pub fn compute_time_stamps_with_count(
    num_waypoints: usize,
    trajectory: &mut JointTrajectory,
    limits: &[JointLimit],
    velocity_scale: f64,
    acceleration_scale: f64,
) -> Result<(), TimingError> {
    let num_waypoints = num_waypoints.max(2);
    let retimer = Retimer::default();
    let (max_velocity, max_acceleration) =
        scaled_limit_vectors(limits, velocity_scale, acceleration_scale);
    match retimer.parameterize(trajectory, max_velocity, max_acceleration)? {
        Parameterized::Trivial(positions) => reset_to_rest(trajectory, positions),
        Parameterized::Solved(solved) => {
            let resample_dt = solved.duration() / (num_waypoints - 1) as f64;
            retimer.resample(trajectory, &solved, resample_dt);
        }
    }
    Ok(())
}

/// Apply validated scaling factors to the per-joint limits.
fn scaled_limit_vectors(
    limits: &[JointLimit],
    velocity_scale: f64,
    acceleration_scale: f64,
) -> (DVector<f64>, DVector<f64>) {
    let velocity_scale = verify_scaling_factor(velocity_scale, LimitType::Velocity);
    let acceleration_scale = verify_scaling_factor(acceleration_scale, LimitType::Acceleration);
    let max_velocity =
        DVector::from_iterator(limits.len(), limits.iter().map(|l| l.max_velocity * velocity_scale));
    let max_acceleration = DVector::from_iterator(
        limits.len(),
        limits.iter().map(|l| l.max_acceleration * acceleration_scale),
    );
    (max_velocity, max_acceleration)
}

/// A trajectory with one distinct waypoint is already at its goal: a
/// single resting sample.
fn reset_to_rest(trajectory: &mut JointTrajectory, positions: DVector<f64>) {
    let dof = positions.len();
    trajectory.points = vec![JointTrajectoryPoint {
        positions,
        velocities: DVector::zeros(dof),
        accelerations: DVector::zeros(dof),
        time_from_start: 0.0,
    }];
}
