//! Per-joint kinematic limits and scaling-factor validation.

use std::fmt;

use log::warn;

/// Which limit a scaling factor applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitType {
    Velocity,
    Acceleration,
}

impl LimitType {
    /// Label used in diagnostics.
    pub fn label(self) -> &'static str {
        match self {
            LimitType::Velocity => "velocity",
            LimitType::Acceleration => "acceleration",
        }
    }
}

impl fmt::Display for LimitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Kinematic bounds for one joint (rad/s and rad/s², or m/s and m/s² for
/// prismatic joints).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointLimit {
    /// Maximum absolute joint velocity.
    pub max_velocity: f64,
    /// Maximum absolute joint acceleration.
    pub max_acceleration: f64,
}

impl JointLimit {
    pub fn new(max_velocity: f64, max_acceleration: f64) -> Self {
        Self {
            max_velocity,
            max_acceleration,
        }
    }
}

/// Clamp a requested scaling factor to (0, 1]. Out-of-range requests fall
/// back to 1.0 with a warning.
pub fn verify_scaling_factor(requested: f64, limit_type: LimitType) -> f64 {
    if requested > 0.0 && requested <= 1.0 {
        requested
    } else {
        warn!("invalid {limit_type} scaling factor {requested} specified, using 1.0 instead");
        1.0
    }
}
