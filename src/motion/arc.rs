// src/motion/arc.rs
//! G2/G3 arc support: lowers a circular arc into a series of straight
//! chords short enough that the worst-case deviation from the true
//! circle stays within `chordal_tolerance`, then hands each chord to
//! the planner as an ordinary line. The planner and executor never see
//! an arc as such — by the time a move reaches `PlannerEntry` it is
//! always a straight line, matching §4's "plan_line / plan_arc"
//! split in the external interface while keeping the buffer itself
//! uniform.

use crate::motion::error::ReturnCode;
use crate::motion::types::N_AXES;
use std::f64::consts::PI;

/// Relative radius mismatch between the arc's start and end points
/// beyond which the move is rejected as ill-specified, matching the
/// `ArcSpecificationError` return code (§6, §7).
pub const ARC_RADIUS_TOLERANCE: f64 = 0.001; // 0.1%

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArcDirection {
    Clockwise,
    CounterClockwise,
}

/// Describes one G2/G3 arc move in the XY plane (the common case); Z
/// and the remaining axes move linearly across the arc's chords,
/// giving a helix when Z changes.
#[derive(Debug, Clone, Copy)]
pub struct ArcSpec {
    pub start: [f64; N_AXES],
    pub end: [f64; N_AXES],
    pub center_offset: [f64; 2], // I, J relative to `start`, in-plane
    pub direction: ArcDirection,
    pub chordal_tolerance: f64,
}

/// Lower an arc into a sequence of absolute target positions (chord
/// endpoints, the last of which equals `spec.end` exactly), each
/// intended to be fed to the planner as a line in turn.
pub fn lower_to_chords(spec: &ArcSpec) -> Result<Vec<[f64; N_AXES]>, ReturnCode> {
    let center = [
        spec.start[0] + spec.center_offset[0],
        spec.start[1] + spec.center_offset[1],
    ];

    let radius_start = dist2(&[spec.start[0], spec.start[1]], &center);
    let radius_end = dist2(&[spec.end[0], spec.end[1]], &center);
    if radius_start < 1e-9 {
        return Err(ReturnCode::ArcSpecificationError);
    }
    let relative_error = (radius_start - radius_end).abs() / radius_start;
    if relative_error > ARC_RADIUS_TOLERANCE {
        return Err(ReturnCode::ArcSpecificationError);
    }

    let angle_start = (spec.start[1] - center[1]).atan2(spec.start[0] - center[0]);
    let angle_end = (spec.end[1] - center[1]).atan2(spec.end[0] - center[0]);

    let mut sweep = match spec.direction {
        ArcDirection::CounterClockwise => angle_end - angle_start,
        ArcDirection::Clockwise => angle_start - angle_end,
    };
    if sweep <= 0.0 {
        sweep += 2.0 * PI;
    }
    // A full circle (start == end) still sweeps the full turn rather
    // than collapsing to a zero-length move.
    if sweep.abs() < 1e-9 {
        sweep = 2.0 * PI;
    }

    let tolerance = spec.chordal_tolerance.max(1e-6);
    let radius = radius_start;
    // Max angular step keeping the chord's sagitta within `tolerance`:
    // sagitta = r * (1 - cos(theta/2)) <= tolerance
    let max_half_angle = (1.0 - (tolerance / radius).min(1.0)).acos();
    let max_step = (2.0 * max_half_angle).max(1e-6);
    let segment_count = (sweep.abs() / max_step).ceil().max(1.0) as usize;

    let signed_step = match spec.direction {
        ArcDirection::CounterClockwise => sweep.abs() / segment_count as f64,
        ArcDirection::Clockwise => -(sweep.abs() / segment_count as f64),
    };

    let mut chords = Vec::with_capacity(segment_count);
    for i in 1..=segment_count {
        let t = i as f64 / segment_count as f64;
        let angle = angle_start + signed_step * i as f64;
        let mut point = spec.start;
        if i == segment_count {
            point = spec.end;
        } else {
            point[0] = center[0] + radius * angle.cos();
            point[1] = center[1] + radius * angle.sin();
            for axis in 2..N_AXES {
                point[axis] = spec.start[axis] + (spec.end[axis] - spec.start[axis]) * t;
            }
        }
        chords.push(point);
    }
    Ok(chords)
}

fn dist2(a: &[f64; 2], b: &[f64; 2]) -> f64 {
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quarter_circle_lowers_to_multiple_chords() {
        let spec = ArcSpec {
            start: [10.0, 0.0, 0.0, 0.0],
            end: [0.0, 10.0, 0.0, 0.0],
            center_offset: [-10.0, 0.0],
            direction: ArcDirection::CounterClockwise,
            chordal_tolerance: 0.01,
        };
        let chords = lower_to_chords(&spec).unwrap();
        assert!(chords.len() > 1);
        let last = *chords.last().unwrap();
        assert!((last[0] - 0.0).abs() < 1e-6);
        assert!((last[1] - 10.0).abs() < 1e-6);
    }

    #[test]
    fn mismatched_radius_is_rejected() {
        let spec = ArcSpec {
            start: [10.0, 0.0, 0.0, 0.0],
            end: [0.0, 20.0, 0.0, 0.0],
            center_offset: [-10.0, 0.0],
            direction: ArcDirection::CounterClockwise,
            chordal_tolerance: 0.01,
        };
        assert_eq!(lower_to_chords(&spec), Err(ReturnCode::ArcSpecificationError));
    }

    #[test]
    fn full_circle_sweeps_a_full_turn() {
        let spec = ArcSpec {
            start: [10.0, 0.0, 0.0, 0.0],
            end: [10.0, 0.0, 0.0, 0.0],
            center_offset: [-10.0, 0.0],
            direction: ArcDirection::CounterClockwise,
            chordal_tolerance: 0.01,
        };
        let chords = lower_to_chords(&spec).unwrap();
        assert!(chords.len() > 4);
    }
}
