// src/motion/kinematics.rs
//! The last stage between axis-space positions (what the planner and
//! G-code layer reason about) and motor-space positions (what per-motor
//! step geometry and the DDA actually drive). For a Cartesian machine
//! these coincide; for CoreXY and similar belt kinematics a single axis
//! move fans out across two motors, so the mapping has to happen before
//! `MotorGeometry::position_to_steps` and be undone when reporting the
//! machine position back.

use crate::motion::types::N_AXES;

/// Converts between axis-space deltas/positions (X, Y, Z, E) and
/// motor-space deltas/positions, ahead of per-motor step geometry.
/// Implementations only need to handle X/Y; Z and E pass straight
/// through on every kinematics this core supports.
pub trait Kinematics: Send + Sync {
    /// Axis-space displacement -> motor-space displacement.
    fn axis_delta_to_motor_delta(&self, axis_delta: [f64; N_AXES]) -> [f64; N_AXES];

    /// Motor-space position -> axis-space position (the inverse of the
    /// above, used to report `machine_position()`).
    fn motor_to_axis_position(&self, motor_position: [f64; N_AXES]) -> [f64; N_AXES];
}

/// Motors correspond directly to axes: no fan-out.
#[derive(Debug, Clone, Copy, Default)]
pub struct CartesianKinematics;

impl Kinematics for CartesianKinematics {
    fn axis_delta_to_motor_delta(&self, axis_delta: [f64; N_AXES]) -> [f64; N_AXES] {
        axis_delta
    }

    fn motor_to_axis_position(&self, motor_position: [f64; N_AXES]) -> [f64; N_AXES] {
        motor_position
    }
}

/// Belt-driven CoreXY: motor A = X + Y, motor B = X - Y. Z and E are
/// independent and pass through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoreXyKinematics;

impl Kinematics for CoreXyKinematics {
    fn axis_delta_to_motor_delta(&self, axis_delta: [f64; N_AXES]) -> [f64; N_AXES] {
        let mut motor = axis_delta;
        motor[0] = axis_delta[0] + axis_delta[1];
        motor[1] = axis_delta[0] - axis_delta[1];
        motor
    }

    fn motor_to_axis_position(&self, motor_position: [f64; N_AXES]) -> [f64; N_AXES] {
        let mut axis = motor_position;
        axis[0] = (motor_position[0] + motor_position[1]) / 2.0;
        axis[1] = (motor_position[0] - motor_position[1]) / 2.0;
        axis
    }
}

/// Builds the kinematics implementation named by `printer.kinematics` in
/// config (`"cartesian"` by default; `"corexy"` selects CoreXY). Any
/// other value falls back to Cartesian rather than failing config load,
/// matching how an unrecognized legacy config key is just ignored.
pub fn from_name(name: &str) -> Box<dyn Kinematics> {
    match name.to_ascii_lowercase().as_str() {
        "corexy" | "core_xy" | "core-xy" => Box::new(CoreXyKinematics),
        _ => Box::new(CartesianKinematics),
    }
}

/// Direction a motor turns relative to positive travel in its axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    Normal,
    Reversed,
}

/// How a motor's travel maps to axis position: linear (steps-per-unit
/// is constant) or radius mode (the axis value is itself an angle, used
/// for rotary/extruder-style axes where `steps_per_unit` is degrees- or
/// radius-scaled rather than a flat mm ratio).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadiusMode {
    Linear,
    Radius,
}

/// Per-motor step geometry, the last stage between a motor-space
/// floating-point position and the integer step counts the DDA runtime
/// emits. Built from `MotorConfig` (`steps_per_unit`, `polarity`) and
/// the owning axis's `AxisMode` (`radius` maps to `RadiusMode::Radius`).
#[derive(Debug, Clone, Copy)]
pub struct MotorGeometry {
    pub steps_per_unit: f64,
    pub polarity: Polarity,
    pub radius_mode: RadiusMode,
}

impl MotorGeometry {
    pub fn new(steps_per_unit: f64, polarity: Polarity, radius_mode: RadiusMode) -> Self {
        Self {
            steps_per_unit,
            polarity,
            radius_mode,
        }
    }

    /// Convert a motor-space position (mm, or degrees in `Radius` mode)
    /// into an absolute, signed integer step count.
    pub fn position_to_steps(&self, position: f64) -> i64 {
        let raw = (position * self.steps_per_unit).round() as i64;
        match self.polarity {
            Polarity::Normal => raw,
            Polarity::Reversed => -raw,
        }
    }
}
