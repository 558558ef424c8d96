//! Time-optimal parameterization in the (arc length, path velocity)
//! phase plane.
//!
//! The profile alternates between forward integration at the maximum
//! feasible path acceleration and backward integration at the minimum,
//! switching wherever the binding constraint changes: at curvature
//! discontinuities, at local minima of the acceleration limit curve, and
//! where the minimum phase slope crosses the slope of the velocity limit
//! curve. Times are assigned afterwards by trapezoidal integration of
//! dt = ds / ṡ.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use nalgebra::DVector;

use kinetime_path::Path;

use crate::error::TimingError;
use crate::limits::LimitType;

/// Default phase-plane integration step (s).
pub const DEFAULT_TIME_STEP: f64 = 1e-3;

/// Tolerance for phase-plane comparisons and bisection termination
/// (arc-length units).
const EPSILON: f64 = 1e-6;
/// Arc-length stride of the coarse scan for velocity switching points;
/// each hit is refined down to `EPSILON` by bisection.
const SCAN_STEP: f64 = 1e-3;

/// One record of the solved velocity profile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrajectoryStep {
    /// Arc length along the path.
    pub path_pos: f64,
    /// Path velocity ṡ.
    pub path_vel: f64,
    /// Time from trajectory start (s).
    pub time: f64,
}

/// Phase-plane state during generation, before times are assigned.
#[derive(Debug, Clone, Copy)]
struct ProfilePoint {
    path_pos: f64,
    path_vel: f64,
}

/// Where a forward integration run stopped.
enum ForwardEnd {
    /// Passed the end of the path.
    ReachedEnd,
    /// Ran into the combined limit curve.
    HitLimitCurve,
}

/// A point where the profile leaves or rejoins the limit curve.
#[derive(Debug, Clone, Copy)]
struct SwitchingPoint {
    path_pos: f64,
    path_vel: f64,
    /// Path acceleration for the backward pass into this point.
    before_acceleration: f64,
    /// Path acceleration for the forward pass out of this point.
    after_acceleration: f64,
}

/// Time-optimal trajectory along a geometric path under per-joint
/// velocity and acceleration bounds.
///
/// Queries are clamped to `[0, duration]` and never fail. A query caches
/// the index of the bracketing profile step behind an atomic hint, so
/// repeated lookups around the same time are O(1) while the results stay
/// identical under any query order.
#[derive(Debug)]
pub struct Trajectory {
    path: Path,
    steps: Vec<TrajectoryStep>,
    step_hint: AtomicUsize,
}

impl Trajectory {
    /// Solve the time-optimal velocity profile for `path` under the given
    /// per-joint limits, integrating with `time_step`.
    pub fn generate(
        path: Path,
        max_velocity: DVector<f64>,
        max_acceleration: DVector<f64>,
        time_step: f64,
    ) -> Result<Self, TimingError> {
        let joint_count = path.dim();
        if max_velocity.len() != joint_count || max_acceleration.len() != joint_count {
            return Err(TimingError::LimitDimensionMismatch {
                velocity: max_velocity.len(),
                acceleration: max_acceleration.len(),
                path: joint_count,
            });
        }
        for i in 0..joint_count {
            if !max_velocity[i].is_finite() || max_velocity[i] <= 0.0 {
                return Err(TimingError::NonPositiveLimit {
                    joint: i,
                    limit_type: LimitType::Velocity,
                    value: max_velocity[i],
                });
            }
            if !max_acceleration[i].is_finite() || max_acceleration[i] <= 0.0 {
                return Err(TimingError::NonPositiveLimit {
                    joint: i,
                    limit_type: LimitType::Acceleration,
                    value: max_acceleration[i],
                });
            }
        }
        if !time_step.is_finite() || time_step <= 0.0 {
            return Err(TimingError::NonPositiveTimeStep(time_step));
        }

        let solver = Solver {
            path: &path,
            max_velocity: &max_velocity,
            max_acceleration: &max_acceleration,
            joint_count,
            time_step,
        };

        let mut profile = vec![ProfilePoint {
            path_pos: 0.0,
            path_vel: 0.0,
        }];
        let mut after_acceleration = solver.extreme_acceleration(0.0, 0.0, true);
        loop {
            match solver.integrate_forward(&mut profile, after_acceleration)? {
                ForwardEnd::ReachedEnd => break,
                ForwardEnd::HitLimitCurve => {}
            }
            let last_pos = profile.last().map_or(0.0, |point| point.path_pos);
            let Some(switching_point) = solver.next_switching_point(last_pos) else {
                break;
            };
            after_acceleration = switching_point.after_acceleration;
            solver.integrate_backward(
                &mut profile,
                switching_point.path_pos,
                switching_point.path_vel,
                switching_point.before_acceleration,
            )?;
        }
        // Close the profile with the final deceleration into rest at the
        // path end.
        let final_acceleration = solver.extreme_acceleration(path.length(), 0.0, false);
        solver.integrate_backward(&mut profile, path.length(), 0.0, final_acceleration)?;

        Ok(Self {
            steps: assign_times(&profile),
            path,
            step_hint: AtomicUsize::new(1),
        })
    }

    /// Total duration (s).
    pub fn duration(&self) -> f64 {
        self.steps.last().map_or(0.0, |step| step.time)
    }

    /// The geometric path this trajectory follows.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The solved profile steps, in time order.
    pub fn steps(&self) -> &[TrajectoryStep] {
        &self.steps
    }

    /// Joint configuration at `time` (clamped to `[0, duration]`).
    pub fn position(&self, time: f64) -> DVector<f64> {
        let (path_pos, _, _) = self.profile_state(time);
        self.path.config(path_pos)
    }

    /// Joint velocities at `time` (clamped to `[0, duration]`).
    pub fn velocity(&self, time: f64) -> DVector<f64> {
        let (path_pos, path_vel, _) = self.profile_state(time);
        self.path.tangent(path_pos) * path_vel
    }

    /// Joint accelerations at `time` (clamped to `[0, duration]`).
    pub fn acceleration(&self, time: f64) -> DVector<f64> {
        let (path_pos, path_vel, path_acc) = self.profile_state(time);
        self.path.tangent(path_pos) * path_acc
            + self.path.curvature(path_pos) * (path_vel * path_vel)
    }

    /// Reconstruct (s, ṡ, s̈) at `time`, assuming constant path
    /// acceleration between adjacent profile steps.
    fn profile_state(&self, time: f64) -> (f64, f64, f64) {
        let time = time.clamp(0.0, self.duration());
        let index = self.bracketing_step(time);
        let previous = &self.steps[index - 1];
        let current = &self.steps[index];

        let step_duration = current.time - previous.time;
        let acceleration = if step_duration > 0.0 {
            (current.path_vel - previous.path_vel) / step_duration
        } else {
            0.0
        };
        let elapsed = time - previous.time;
        let path_pos = previous.path_pos
            + elapsed * previous.path_vel
            + 0.5 * acceleration * elapsed * elapsed;
        let path_vel = previous.path_vel + elapsed * acceleration;
        (path_pos, path_vel, acceleration)
    }

    /// Index `i ≥ 1` such that `steps[i-1].time ≤ time < steps[i].time`
    /// (the last index once `time` reaches the end). Validates the cached
    /// hint before falling back to binary search.
    fn bracketing_step(&self, time: f64) -> usize {
        let count = self.steps.len();
        let hint = self.step_hint.load(Ordering::Relaxed);
        if hint >= 1
            && hint < count
            && self.steps[hint - 1].time <= time
            && time < self.steps[hint].time
        {
            return hint;
        }
        let index = self
            .steps
            .partition_point(|step| step.time <= time)
            .clamp(1, count - 1);
        self.step_hint.store(index, Ordering::Relaxed);
        index
    }
}

/// Assign times to the phase-plane profile by trapezoidal integration.
/// Zero-width steps are merged so recorded times stay strictly increasing.
fn assign_times(profile: &[ProfilePoint]) -> Vec<TrajectoryStep> {
    let mut steps: Vec<TrajectoryStep> = Vec::with_capacity(profile.len());
    steps.push(TrajectoryStep {
        path_pos: profile[0].path_pos,
        path_vel: profile[0].path_vel,
        time: 0.0,
    });
    for pair in profile.windows(2) {
        let (previous, current) = (pair[0], pair[1]);
        let average_vel = 0.5 * (previous.path_vel + current.path_vel);
        let dt = if average_vel > 0.0 {
            (current.path_pos - previous.path_pos) / average_vel
        } else {
            0.0
        };
        let last = steps.last_mut().expect("profile starts non-empty");
        if dt > 0.0 {
            let time = last.time + dt;
            steps.push(TrajectoryStep {
                path_pos: current.path_pos,
                path_vel: current.path_vel,
                time,
            });
        } else {
            last.path_pos = current.path_pos;
            last.path_vel = current.path_vel;
        }
    }
    steps
}

/// Phase-plane machinery shared by the integration passes.
struct Solver<'a> {
    path: &'a Path,
    max_velocity: &'a DVector<f64>,
    max_acceleration: &'a DVector<f64>,
    joint_count: usize,
    time_step: f64,
}

impl Solver<'_> {
    /// Largest ṡ at `path_pos` allowed by the per-joint velocity bounds.
    fn velocity_limit(&self, path_pos: f64) -> f64 {
        let tangent = self.path.tangent(path_pos);
        let mut limit = f64::INFINITY;
        for i in 0..self.joint_count {
            limit = limit.min(self.max_velocity[i] / tangent[i].abs());
        }
        limit
    }

    /// Slope of the velocity limit curve, from the binding joint.
    fn velocity_limit_slope(&self, path_pos: f64) -> f64 {
        let tangent = self.path.tangent(path_pos);
        let mut limit = f64::INFINITY;
        let mut active = 0;
        for i in 0..self.joint_count {
            let joint_limit = self.max_velocity[i] / tangent[i].abs();
            if joint_limit < limit {
                limit = joint_limit;
                active = i;
            }
        }
        let curvature = self.path.curvature(path_pos);
        -(self.max_velocity[active] * curvature[active])
            / (tangent[active] * tangent[active].abs())
    }

    /// Largest ṡ at `path_pos` for which some feasible path acceleration
    /// still exists: the pairwise bound over joints with conflicting
    /// acceleration demands, plus the direct bound from joints whose
    /// tangent component vanishes.
    fn acceleration_limit(&self, path_pos: f64) -> f64 {
        let tangent = self.path.tangent(path_pos);
        let curvature = self.path.curvature(path_pos);
        let mut limit = f64::INFINITY;
        for i in 0..self.joint_count {
            if tangent[i] != 0.0 {
                for j in (i + 1)..self.joint_count {
                    if tangent[j] != 0.0 {
                        let ratio_difference =
                            curvature[i] / tangent[i] - curvature[j] / tangent[j];
                        if ratio_difference != 0.0 {
                            limit = limit.min(
                                ((self.max_acceleration[i] / tangent[i].abs()
                                    + self.max_acceleration[j] / tangent[j].abs())
                                    / ratio_difference.abs())
                                .sqrt(),
                            );
                        }
                    }
                }
            } else if curvature[i] != 0.0 {
                limit = limit.min((self.max_acceleration[i] / curvature[i].abs()).sqrt());
            }
        }
        limit
    }

    /// Numeric slope of the acceleration limit curve.
    fn acceleration_limit_slope(&self, path_pos: f64) -> f64 {
        (self.acceleration_limit(path_pos + EPSILON) - self.acceleration_limit(path_pos - EPSILON))
            / (2.0 * EPSILON)
    }

    /// Extremal feasible path acceleration at `(path_pos, path_vel)`:
    /// the tightest joint bound on s̈ given |f′ᵢ·s̈ + f″ᵢ·ṡ²| ≤ aᵢ.
    fn extreme_acceleration(&self, path_pos: f64, path_vel: f64, maximize: bool) -> f64 {
        let tangent = self.path.tangent(path_pos);
        let curvature = self.path.curvature(path_pos);
        let factor = if maximize { 1.0 } else { -1.0 };
        let squared_vel = path_vel * path_vel;
        let mut bound = f64::INFINITY;
        for i in 0..self.joint_count {
            if tangent[i] != 0.0 {
                bound = bound.min(
                    self.max_acceleration[i] / tangent[i].abs()
                        - factor * curvature[i] * squared_vel / tangent[i],
                );
            }
        }
        factor * bound
    }

    /// Slope dṡ/ds of a trajectory arc through `(path_pos, path_vel)`
    /// driven by the extremal acceleration.
    fn phase_slope(&self, path_pos: f64, path_vel: f64, maximize: bool) -> f64 {
        self.extreme_acceleration(path_pos, path_vel, maximize) / path_vel
    }

    /// Integrate forward with maximum acceleration until the path end or
    /// the combined limit curve, landing exactly on curvature
    /// discontinuities and refining limit-curve crossings by bisection.
    fn integrate_forward(
        &self,
        profile: &mut Vec<ProfilePoint>,
        mut acceleration: f64,
    ) -> Result<ForwardEnd, TimingError> {
        let last = profile.last().expect("profile starts non-empty");
        let mut path_pos = last.path_pos;
        let mut path_vel = last.path_vel;

        let switching_points = self.path.switching_points();
        let mut discontinuity_index = 0;

        loop {
            while discontinuity_index < switching_points.len()
                && (switching_points[discontinuity_index].0 <= path_pos
                    || !switching_points[discontinuity_index].1)
            {
                discontinuity_index += 1;
            }
            let next_discontinuity = switching_points
                .get(discontinuity_index)
                .map(|&(pos, _)| pos);

            let old_path_pos = path_pos;
            let old_path_vel = path_vel;

            path_vel += self.time_step * acceleration;
            path_pos += self.time_step * 0.5 * (old_path_vel + path_vel);

            // Land exactly on the discontinuity so both of its sides get
            // sampled.
            if let Some(discontinuity) = next_discontinuity {
                if path_pos > discontinuity && path_pos > old_path_pos {
                    path_vel = old_path_vel
                        + (discontinuity - old_path_pos) * (path_vel - old_path_vel)
                            / (path_pos - old_path_pos);
                    path_pos = discontinuity;
                }
            }

            if !path_pos.is_finite() || !path_vel.is_finite() {
                return Err(TimingError::Infeasible {
                    path_pos: old_path_pos,
                    end_profile: Vec::new(),
                });
            }
            if path_pos > self.path.length() {
                profile.push(ProfilePoint { path_pos, path_vel });
                return Ok(ForwardEnd::ReachedEnd);
            }
            if path_vel < 0.0 {
                return Err(TimingError::Infeasible {
                    path_pos,
                    end_profile: Vec::new(),
                });
            }

            // Press onto the velocity limit curve while it acts as a sink.
            if path_vel > self.velocity_limit(path_pos)
                && self.phase_slope(old_path_pos, self.velocity_limit(old_path_pos), false)
                    <= self.velocity_limit_slope(old_path_pos)
            {
                path_vel = self.velocity_limit(path_pos);
            }

            profile.push(ProfilePoint { path_pos, path_vel });
            acceleration = self.extreme_acceleration(path_pos, path_vel, true);

            if path_vel > self.acceleration_limit(path_pos)
                || path_vel > self.velocity_limit(path_pos)
            {
                // Overshot the limit curve: bisect back to the crossing.
                let overshoot = profile.pop().expect("overshoot step was just pushed");
                let previous = *profile.last().expect("profile starts non-empty");
                let mut before = previous.path_pos;
                let mut before_vel = previous.path_vel;
                let mut after = overshoot.path_pos;
                let mut after_vel = overshoot.path_vel;
                while after - before > EPSILON {
                    let midpoint = 0.5 * (before + after);
                    let mut midpoint_vel = 0.5 * (before_vel + after_vel);
                    if midpoint_vel > self.velocity_limit(midpoint)
                        && self.phase_slope(before, self.velocity_limit(before), false)
                            <= self.velocity_limit_slope(before)
                    {
                        midpoint_vel = self.velocity_limit(midpoint);
                    }
                    if midpoint_vel > self.acceleration_limit(midpoint)
                        || midpoint_vel > self.velocity_limit(midpoint)
                    {
                        after = midpoint;
                        after_vel = midpoint_vel;
                    } else {
                        before = midpoint;
                        before_vel = midpoint_vel;
                    }
                }
                profile.push(ProfilePoint {
                    path_pos: before,
                    path_vel: before_vel,
                });

                let back = *profile.last().expect("crossing step was just pushed");
                if self.acceleration_limit(after) < self.velocity_limit(after) {
                    if next_discontinuity.map_or(false, |discontinuity| after > discontinuity) {
                        return Ok(ForwardEnd::HitLimitCurve);
                    }
                    if self.phase_slope(back.path_pos, back.path_vel, true)
                        > self.acceleration_limit_slope(back.path_pos)
                    {
                        return Ok(ForwardEnd::HitLimitCurve);
                    }
                } else if self.phase_slope(back.path_pos, back.path_vel, false)
                    > self.velocity_limit_slope(back.path_pos)
                {
                    return Ok(ForwardEnd::HitLimitCurve);
                }
            }
        }
    }

    /// Integrate backward from `(path_pos, path_vel)` with minimum
    /// acceleration until the trace intersects the forward profile, then
    /// splice the two at the intersection.
    fn integrate_backward(
        &self,
        profile: &mut Vec<ProfilePoint>,
        mut path_pos: f64,
        mut path_vel: f64,
        mut acceleration: f64,
    ) -> Result<(), TimingError> {
        let mut index = profile.len() - 1;
        let mut backward: VecDeque<ProfilePoint> = VecDeque::new();
        let mut slope = 0.0;

        while index > 1 || path_pos >= 0.0 {
            if profile[index - 1].path_pos <= path_pos {
                backward.push_front(ProfilePoint { path_pos, path_vel });
                path_vel -= self.time_step * acceleration;
                let front_vel = backward.front().expect("just pushed").path_vel;
                path_pos -= self.time_step * 0.5 * (path_vel + front_vel);
                acceleration = self.extreme_acceleration(path_pos, path_vel, false);
                let front = backward.front().expect("just pushed");
                slope = (front.path_vel - path_vel) / (front.path_pos - path_pos);

                if path_vel < 0.0 || !path_vel.is_finite() || !path_pos.is_finite() {
                    return Err(TimingError::Infeasible {
                        path_pos,
                        end_profile: backward
                            .iter()
                            .map(|point| (point.path_pos, point.path_vel))
                            .collect(),
                    });
                }
            } else {
                index -= 1;
            }

            // Intersection between the current forward segment and the
            // newest backward segment.
            let start1 = profile[index - 1];
            let start2 = profile[index];
            let front = *backward.front().expect("backward trace is non-empty");
            let forward_slope =
                (start2.path_vel - start1.path_vel) / (start2.path_pos - start1.path_pos);
            let intersection_pos = (start1.path_vel - path_vel + slope * path_pos
                - forward_slope * start1.path_pos)
                / (slope - forward_slope);
            if start1.path_pos.max(path_pos) - EPSILON <= intersection_pos
                && intersection_pos <= EPSILON + start2.path_pos.min(front.path_pos)
            {
                // Keep arc length monotone when the intersection lands a
                // rounding error outside the bracket.
                let intersection_pos = intersection_pos
                    .max(start1.path_pos.max(path_pos))
                    .min(start2.path_pos.min(front.path_pos));
                let intersection_vel =
                    start1.path_vel + forward_slope * (intersection_pos - start1.path_pos);
                profile.truncate(index);
                profile.push(ProfilePoint {
                    path_pos: intersection_pos,
                    path_vel: intersection_vel,
                });
                profile.extend(backward);
                return Ok(());
            }
        }

        Err(TimingError::Infeasible {
            path_pos,
            end_profile: backward
                .iter()
                .map(|point| (point.path_pos, point.path_vel))
                .collect(),
        })
    }

    /// The nearest switching point strictly after `path_pos`, or `None`
    /// when the rest of the path has none.
    fn next_switching_point(&self, path_pos: f64) -> Option<SwitchingPoint> {
        // Acceleration candidates sitting above the velocity limit curve
        // are unreachable; skip past them.
        let mut acceleration_candidate = None;
        let mut cursor = path_pos;
        while let Some(candidate) = self.next_acceleration_switching_point(cursor) {
            if candidate.path_vel <= self.velocity_limit(candidate.path_pos) {
                acceleration_candidate = Some(candidate);
                break;
            }
            cursor = candidate.path_pos;
        }

        // Velocity candidates above the acceleration limit curve are
        // likewise unreachable, unless they lie beyond the acceleration
        // candidate and never come into play.
        let acceleration_pos =
            acceleration_candidate.map_or(f64::INFINITY, |candidate| candidate.path_pos);
        let mut velocity_candidate = None;
        let mut cursor = path_pos;
        while let Some(candidate) = self.next_velocity_switching_point(cursor) {
            if candidate.path_pos > acceleration_pos
                || (candidate.path_vel
                    <= self.acceleration_limit(candidate.path_pos - EPSILON)
                    && candidate.path_vel
                        <= self.acceleration_limit(candidate.path_pos + EPSILON))
            {
                velocity_candidate = Some(candidate);
                break;
            }
            cursor = candidate.path_pos;
        }

        match (acceleration_candidate, velocity_candidate) {
            (Some(acc), Some(vel)) => {
                if acc.path_pos <= vel.path_pos {
                    Some(acc)
                } else {
                    Some(vel)
                }
            }
            (candidate, None) | (None, candidate) => candidate,
        }
    }

    /// Next switching point on the acceleration limit curve: a curvature
    /// discontinuity that passes the phase-slope admissibility test, or a
    /// local minimum of the curve.
    fn next_acceleration_switching_point(&self, path_pos: f64) -> Option<SwitchingPoint> {
        let mut switching_pos = path_pos;
        loop {
            let (next_pos, discontinuity) = self.path.next_switching_point(switching_pos);
            if next_pos > self.path.length() - EPSILON {
                return None;
            }
            switching_pos = next_pos;

            if discontinuity {
                let before_vel = self.acceleration_limit(switching_pos - EPSILON);
                let after_vel = self.acceleration_limit(switching_pos + EPSILON);
                let path_vel = before_vel.min(after_vel);
                let before_acceleration =
                    self.extreme_acceleration(switching_pos - EPSILON, path_vel, false);
                let after_acceleration =
                    self.extreme_acceleration(switching_pos + EPSILON, path_vel, true);

                let entering_holds = before_vel > after_vel
                    || self.phase_slope(switching_pos - EPSILON, path_vel, false)
                        > self.acceleration_limit_slope(switching_pos - 2.0 * EPSILON);
                let leaving_holds = before_vel < after_vel
                    || self.phase_slope(switching_pos + EPSILON, path_vel, true)
                        < self.acceleration_limit_slope(switching_pos + 2.0 * EPSILON);
                if entering_holds && leaving_holds {
                    return Some(SwitchingPoint {
                        path_pos: switching_pos,
                        path_vel,
                        before_acceleration,
                        after_acceleration,
                    });
                }
            } else {
                let path_vel = self.acceleration_limit(switching_pos);
                if self.acceleration_limit_slope(switching_pos - EPSILON) < 0.0
                    && self.acceleration_limit_slope(switching_pos + EPSILON) > 0.0
                {
                    return Some(SwitchingPoint {
                        path_pos: switching_pos,
                        path_vel,
                        before_acceleration: 0.0,
                        after_acceleration: 0.0,
                    });
                }
            }
        }
    }

    /// Next switching point on the velocity limit curve: where the minimum
    /// phase slope crosses the slope of the curve from above. Coarse scan
    /// followed by bisection.
    fn next_velocity_switching_point(&self, path_pos: f64) -> Option<SwitchingPoint> {
        let mut pos = path_pos;
        let mut crossed_from_below = false;
        loop {
            let min_slope = self.phase_slope(pos, self.velocity_limit(pos), false);
            let curve_slope = self.velocity_limit_slope(pos);
            if min_slope >= curve_slope {
                crossed_from_below = true;
            }
            if (crossed_from_below && min_slope <= curve_slope) || pos >= self.path.length() {
                break;
            }
            pos += SCAN_STEP;
        }
        if pos >= self.path.length() {
            return None;
        }

        let mut before = pos - SCAN_STEP;
        let mut after = pos;
        while after - before > EPSILON {
            let midpoint = 0.5 * (before + after);
            if self.phase_slope(midpoint, self.velocity_limit(midpoint), false)
                > self.velocity_limit_slope(midpoint)
            {
                before = midpoint;
            } else {
                after = midpoint;
            }
        }

        Some(SwitchingPoint {
            path_pos: after,
            path_vel: self.velocity_limit(after),
            before_acceleration: self.extreme_acceleration(
                before,
                self.velocity_limit(before),
                false,
            ),
            after_acceleration: self.extreme_acceleration(after, self.velocity_limit(after), true),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn v2(x: f64, y: f64) -> DVector<f64> {
        DVector::from_column_slice(&[x, y])
    }

    fn straight_line() -> Path {
        Path::new(&[v2(0.0, 0.0), v2(1.0, 0.0)], 0.1).unwrap()
    }

    fn right_angle() -> Path {
        Path::new(&[v2(0.0, 0.0), v2(1.0, 0.0), v2(1.0, 1.0)], 0.1).unwrap()
    }

    fn generate(path: Path, max_vel: f64, max_acc: f64) -> Trajectory {
        let dim = path.dim();
        Trajectory::generate(
            path,
            DVector::from_element(dim, max_vel),
            DVector::from_element(dim, max_acc),
            DEFAULT_TIME_STEP,
        )
        .unwrap()
    }

    #[test]
    fn straight_line_triangular_profile() {
        // Unit limits over a unit straight line: accelerate at 1 for 1 s
        // to ṡ = 1, decelerate symmetrically.
        let trajectory = generate(straight_line(), 1.0, 1.0);
        assert_relative_eq!(trajectory.duration(), 2.0, epsilon = 1e-2);

        // Peak velocity is reached at the apex
        let peak = trajectory.velocity(0.5 * trajectory.duration());
        assert_relative_eq!(peak.norm(), 1.0, epsilon = 1e-2);
    }

    #[test]
    fn starts_and_ends_at_rest_on_the_waypoints() {
        let trajectory = generate(right_angle(), 1.0, 1.0);
        let duration = trajectory.duration();

        assert_relative_eq!(trajectory.position(0.0), v2(0.0, 0.0), epsilon = 1e-6);
        assert_relative_eq!(trajectory.position(duration), v2(1.0, 1.0), epsilon = 1e-6);
        assert!(trajectory.velocity(0.0).norm() <= 1e-6);
        assert!(trajectory.velocity(duration).norm() <= 1e-6);
    }

    #[test]
    fn profile_steps_are_monotone() {
        let trajectory = generate(right_angle(), 1.0, 1.0);
        let steps = trajectory.steps();
        assert_eq!(steps[0].path_pos, 0.0);
        assert_eq!(steps[0].path_vel, 0.0);
        assert_eq!(steps[0].time, 0.0);

        let last = steps.last().unwrap();
        assert_relative_eq!(last.path_pos, trajectory.path().length(), epsilon = 1e-9);
        assert_eq!(last.path_vel, 0.0);

        for pair in steps.windows(2) {
            assert!(pair[1].time > pair[0].time, "times must strictly increase");
            assert!(
                pair[1].path_pos >= pair[0].path_pos,
                "arc length must not decrease"
            );
        }
    }

    #[test]
    fn respects_joint_limits_on_a_dense_grid() {
        let max_vel = 1.0;
        let max_acc = 1.0;
        let trajectory = generate(right_angle(), max_vel, max_acc);
        let duration = trajectory.duration();

        let samples = 400;
        for i in 0..=samples {
            let time = duration * f64::from(i) / f64::from(samples);
            let velocity = trajectory.velocity(time);
            let acceleration = trajectory.acceleration(time);
            for joint in 0..2 {
                assert!(
                    velocity[joint].abs() <= max_vel * (1.0 + 1e-3),
                    "joint {joint} velocity {} at t = {time}",
                    velocity[joint]
                );
                assert!(
                    acceleration[joint].abs() <= max_acc * (1.0 + 1e-2),
                    "joint {joint} acceleration {} at t = {time}",
                    acceleration[joint]
                );
            }
        }
    }

    #[test]
    fn faster_limits_shorten_the_trajectory() {
        let slow = generate(straight_line(), 1.0, 1.0);
        // Velocity scaled by k and acceleration by k² compress time by k.
        let fast = generate(straight_line(), 2.0, 4.0);
        let ratio = slow.duration() / fast.duration();
        assert!(
            (ratio - 2.0).abs() / 2.0 < 1e-3,
            "expected 2× speed-up, got {ratio}"
        );
    }

    #[test]
    fn queries_clamp_to_the_time_range() {
        let trajectory = generate(straight_line(), 1.0, 1.0);
        let duration = trajectory.duration();
        assert_eq!(trajectory.position(-1.0), trajectory.position(0.0));
        assert_eq!(
            trajectory.position(duration + 1.0),
            trajectory.position(duration)
        );
        assert_eq!(trajectory.velocity(duration + 1.0), trajectory.velocity(duration));
    }

    #[test]
    fn cached_lookups_are_order_independent() {
        let trajectory = generate(right_angle(), 1.0, 1.0);
        let duration = trajectory.duration();
        let t1 = 0.3 * duration;
        let t2 = 0.8 * duration;

        let first = trajectory.position(t1);
        let _ = trajectory.position(t2);
        let _ = trajectory.position(0.0);
        let again = trajectory.position(t1);
        assert_eq!(first, again, "cache must not change query results");
    }

    #[test]
    fn rejects_invalid_limits() {
        let limits_err = Trajectory::generate(
            straight_line(),
            v2(1.0, 0.0),
            v2(1.0, 1.0),
            DEFAULT_TIME_STEP,
        );
        assert!(matches!(
            limits_err,
            Err(TimingError::NonPositiveLimit {
                joint: 1,
                limit_type: LimitType::Velocity,
                ..
            })
        ));

        let acc_err = Trajectory::generate(
            straight_line(),
            v2(1.0, 1.0),
            v2(-1.0, 1.0),
            DEFAULT_TIME_STEP,
        );
        assert!(matches!(
            acc_err,
            Err(TimingError::NonPositiveLimit {
                joint: 0,
                limit_type: LimitType::Acceleration,
                ..
            })
        ));

        let dim_err = Trajectory::generate(
            straight_line(),
            DVector::from_column_slice(&[1.0]),
            v2(1.0, 1.0),
            DEFAULT_TIME_STEP,
        );
        assert!(matches!(
            dim_err,
            Err(TimingError::LimitDimensionMismatch { .. })
        ));

        let step_err =
            Trajectory::generate(straight_line(), v2(1.0, 1.0), v2(1.0, 1.0), 0.0);
        assert!(matches!(step_err, Err(TimingError::NonPositiveTimeStep(_))));
    }

    #[test]
    fn backward_pass_reports_unreachable_switching_points() {
        // A switching point demanding more speed than the forward profile
        // can reach leaves the backward trace with nothing to join: the
        // required deceleration exceeds what the limits allow.
        let path = straight_line();
        let max_velocity = v2(1.0, 1.0);
        let max_acceleration = v2(1.0, 1.0);
        let solver = Solver {
            path: &path,
            max_velocity: &max_velocity,
            max_acceleration: &max_acceleration,
            joint_count: 2,
            time_step: DEFAULT_TIME_STEP,
        };

        // Forward profile accelerating from rest: ṡ = √(2s)
        let mut profile: Vec<ProfilePoint> = (0..=10)
            .map(|i| {
                let path_pos = 0.1 * f64::from(i) * 0.5;
                ProfilePoint {
                    path_pos,
                    path_vel: (2.0 * path_pos).sqrt(),
                }
            })
            .collect();

        let result = solver.integrate_backward(&mut profile, 0.9, 3.0, -1.0);
        match result {
            Err(TimingError::Infeasible { end_profile, .. }) => {
                assert!(
                    !end_profile.is_empty(),
                    "diagnostic backward trace must be retained"
                );
            }
            other => panic!("expected infeasibility, got {other:?}"),
        }
    }

    #[test]
    fn three_joint_paths_parameterize() {
        let waypoints = vec![
            DVector::from_column_slice(&[0.0, 0.0, 0.0]),
            DVector::from_column_slice(&[0.8, 0.2, -0.4]),
            DVector::from_column_slice(&[1.0, 1.0, 0.3]),
            DVector::from_column_slice(&[0.2, 1.1, 0.5]),
        ];
        let path = Path::new(&waypoints, 0.05).unwrap();
        let goal = path.config(path.length());
        let trajectory = generate(path, 0.8, 1.5);

        assert!(trajectory.duration() > 0.0);
        assert_relative_eq!(
            trajectory.position(trajectory.duration()),
            goal,
            epsilon = 1e-6
        );
    }
}
