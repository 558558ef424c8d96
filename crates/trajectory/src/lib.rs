//! Time-optimal trajectory generation for multi-joint geometric paths.
//!
//! Given joint-space waypoints and per-joint velocity and acceleration
//! bounds, this crate blends the waypoints into a C¹ path
//! (`kinetime_path`), solves the time-optimal velocity profile along it by
//! phase-plane integration, and resamples the result for controllers that
//! consume discrete joint trajectories.
//!
//! The profile construction follows Kunz & Stilman, "Time-Optimal
//! Trajectory Generation for Path Following with Bounded Acceleration and
//! Velocity" (RSS 2012).

pub mod error;
pub mod limits;
pub mod profile;
pub mod retime;

pub use error::TimingError;
pub use kinetime_path::{Path, PathError};
pub use limits::{verify_scaling_factor, JointLimit, LimitType};
pub use profile::{Trajectory, TrajectoryStep, DEFAULT_TIME_STEP};
pub use retime::{
    compute_time_stamps_with_count, JointTrajectory, JointTrajectoryPoint, Retimer,
    DEFAULT_MIN_ANGLE_CHANGE, DEFAULT_PATH_TOLERANCE, DEFAULT_RESAMPLE_DT,
};
