//! Error types for time parameterization.

use thiserror::Error;

use kinetime_path::PathError;

use crate::limits::LimitType;

/// Failure modes of trajectory generation.
#[derive(Debug, Clone, Error)]
pub enum TimingError {
    /// Path construction failed before timing started.
    #[error(transparent)]
    Path(#[from] PathError),

    #[error("limit vectors have {velocity}/{acceleration} entries, path has dimension {path}")]
    LimitDimensionMismatch {
        velocity: usize,
        acceleration: usize,
        path: usize,
    },

    #[error("{limit_type} limit for joint {joint} must be positive and finite, got {value}")]
    NonPositiveLimit {
        joint: usize,
        limit_type: LimitType,
        value: f64,
    },

    #[error("time step must be positive, got {0}")]
    NonPositiveTimeStep(f64),

    #[error("trajectory has no points")]
    EmptyTrajectory,

    #[error(
        "no feasible velocity profile: the deceleration demanded near s = {path_pos:.6} \
         exceeds the acceleration limits"
    )]
    Infeasible {
        /// Arc length where the backward pass gave up.
        path_pos: f64,
        /// Partial backward profile as (arc length, path velocity), kept
        /// for diagnostics.
        end_profile: Vec<(f64, f64)>,
    },
}
