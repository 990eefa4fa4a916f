// src/motion/executor.rs
//! The segment executor ("aline"): turns one planner entry's
//! entry/cruise/exit velocities into a jerk-limited S-curve made of a
//! head, an optional body, and a tail, each with a closed-form
//! duration and length.
//!
//! The S-curve used here is the symmetric constant-jerk ("bang-bang
//! jerk") ramp: jerk is held at `+J` for the first half of a phase and
//! `-J` for the second half, giving continuous, ramping acceleration
//! (a true S-curve) with no free middle plateau. This keeps every
//! phase's duration and length in closed form:
//!
//! - `duration = 2 * sqrt(|dv| / J)`
//! - `length = (v_start + v_end) / 2 * duration`
//!
//! (the average-velocity form is exact for this profile, not an
//! approximation — the symmetric jerk ramp's velocity-time integral
//! always works out to the trapezoid area). No bit-identical velocity
//! curve is implied or required (§8); only that the stated invariants
//! — continuity across phases, correct total length, and a converged
//! cruise velocity when a full trapezoid doesn't fit — hold.

use crate::motion::error::ReturnCode;
use crate::motion::types::{PLANNER_ITERATION_ERROR_PERCENT, PLANNER_ITERATION_MAX};

/// A fully resolved head/body/tail decomposition for one move.
#[derive(Debug, Clone, Copy)]
pub struct MoveProfile {
    pub entry_velocity: f64,
    pub cruise_velocity: f64,
    pub exit_velocity: f64,
    pub head_time: f64,
    pub head_length: f64,
    pub body_time: f64,
    pub body_length: f64,
    pub tail_time: f64,
    pub tail_length: f64,
}

impl MoveProfile {
    pub fn total_length(&self) -> f64 {
        self.head_length + self.body_length + self.tail_length
    }

    pub fn total_time(&self) -> f64 {
        self.head_time + self.body_time + self.tail_time
    }
}

/// Phase duration and length for a symmetric constant-jerk ramp from
/// `v_start` to `v_end` under jerk `jerk`.
fn phase(v_start: f64, v_end: f64, jerk: f64) -> (f64, f64) {
    let dv = (v_end - v_start).abs();
    if dv < 1e-9 || jerk <= 0.0 {
        return (0.0, 0.0);
    }
    let time = 2.0 * (dv / jerk).sqrt();
    let length = (v_start + v_end) / 2.0 * time;
    (time, length)
}

/// Build the head/body/tail decomposition for a move of the given
/// `length`, with the planner-assigned `entry`/`cruise`/`exit`
/// velocities and `jerk`. If the requested cruise velocity can't be
/// reached and braked back down within `length` (the "HT case", head
/// and tail alone exceed the move length), iteratively lowers the
/// cruise velocity by bisection until head+tail fits, up to
/// `PLANNER_ITERATION_MAX` iterations. Returns `FAILED_TO_CONVERGE`
/// (with the best-effort profile still usable) if the iteration does
/// not close within `PLANNER_ITERATION_ERROR_PERCENT` of `length`.
pub fn build_profile(
    length: f64,
    entry: f64,
    cruise: f64,
    exit: f64,
    jerk: f64,
) -> (MoveProfile, ReturnCode) {
    let (head_time, head_length) = phase(entry, cruise, jerk);
    let (tail_time, tail_length) = phase(cruise, exit, jerk);

    if head_length + tail_length <= length {
        let body_length = length - head_length - tail_length;
        let body_time = if cruise > 1e-9 { body_length / cruise } else { 0.0 };
        return (
            MoveProfile {
                entry_velocity: entry,
                cruise_velocity: cruise,
                exit_velocity: exit,
                head_time,
                head_length,
                body_time,
                body_length,
                tail_time,
                tail_length,
            },
            ReturnCode::Ok,
        );
    }

    // HT case: no room for a body. Bisect the cruise velocity between
    // max(entry, exit) (guaranteed to fit, possibly with head or tail
    // collapsing to zero) and the originally requested cruise.
    let lo_bound = entry.max(exit);
    let mut lo = lo_bound;
    let mut hi = cruise.max(lo_bound);
    let mut best = cruise;
    let mut converged = false;

    for _ in 0..PLANNER_ITERATION_MAX {
        let mid = (lo + hi) / 2.0;
        let (ht, hl) = phase(entry, mid, jerk);
        let (tt, tl) = phase(mid, exit, jerk);
        let _ = (ht, tt);
        let needed = hl + tl;
        let error = (needed - length).abs() / length.max(1e-9);
        best = mid;
        if error <= PLANNER_ITERATION_ERROR_PERCENT {
            converged = true;
            break;
        }
        if needed > length {
            hi = mid;
        } else {
            lo = mid;
        }
    }

    let (head_time, head_length) = phase(entry, best, jerk);
    let (tail_time, tail_length) = phase(best, exit, jerk);
    let profile = MoveProfile {
        entry_velocity: entry,
        cruise_velocity: best,
        exit_velocity: exit,
        head_time,
        head_length,
        body_time: 0.0,
        body_length: 0.0,
        tail_time,
        tail_length,
    };

    if converged {
        (profile, ReturnCode::Ok)
    } else {
        (profile, ReturnCode::FailedToConverge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trapezoid_with_room_for_a_body() {
        let (profile, code) = build_profile(100.0, 0.0, 20.0, 0.0, 4000.0);
        assert_eq!(code, ReturnCode::Ok);
        assert!(profile.body_length > 0.0);
        assert!((profile.total_length() - 100.0).abs() < 1e-6);
    }

    #[test]
    fn ht_case_converges_without_a_body() {
        let (profile, code) = build_profile(1.0, 0.0, 50.0, 0.0, 2000.0);
        assert_eq!(code, ReturnCode::Ok);
        assert_eq!(profile.body_length, 0.0);
        assert!(profile.cruise_velocity < 50.0);
        assert!((profile.total_length() - 1.0).abs() / 1.0 <= PLANNER_ITERATION_ERROR_PERCENT);
    }

    #[test]
    fn zero_velocity_delta_collapses_phase() {
        let (time, length) = phase(10.0, 10.0, 1000.0);
        assert_eq!(time, 0.0);
        assert_eq!(length, 0.0);
    }
}
