// src/motion/planner.rs
//! The look-ahead planner (§4.1): a fixed-capacity ring buffer of
//! `PlannerEntry` values with jerk/junction-deviation velocity
//! planning. New moves are appended at the write cursor; the executor
//! consumes from the run cursor. A backward pass runs over the newly
//! widened tail of the buffer every time an entry is appended, and a
//! forward pass then bounds each entry's cruise velocity by what's
//! actually reachable from its (possibly just-lowered) entry velocity.

use crate::motion::error::ReturnCode;
use crate::motion::junction::JunctionDeviation;
use crate::motion::types::{MarkerKind, PlannerEntry, N_AXES};

/// Resolved per-axis limits the planner enforces, built from
/// `crate::config::AxisConfig`.
#[derive(Debug, Clone, Copy)]
pub struct AxisRuntimeParams {
    pub velocity_max: f64,
    pub feedrate_max: f64,
    pub travel_min: f64,
    pub travel_max: f64,
    pub jerk_max: f64,
    pub junction_deviation: f64,
    pub participates_in_travel_limits: bool,
}

impl From<&crate::config::AxisConfig> for AxisRuntimeParams {
    fn from(cfg: &crate::config::AxisConfig) -> Self {
        Self {
            velocity_max: cfg.velocity_max,
            feedrate_max: cfg.feedrate_max,
            travel_min: cfg.travel_min,
            travel_max: cfg.travel_max,
            jerk_max: cfg.jerk_max,
            junction_deviation: cfg.junction_deviation,
            participates_in_travel_limits: !matches!(
                cfg.axis_mode,
                crate::config::AxisMode::Disabled | crate::config::AxisMode::Inhibited
            ),
        }
    }
}

/// The axis-name-to-slot mapping the rest of the motion core assumes:
/// index 0 is X, 1 is Y, 2 is Z, 3 is E.
pub const AXIS_NAMES: [&str; N_AXES] = ["x", "y", "z", "e"];

pub struct Planner {
    axes: [AxisRuntimeParams; N_AXES],
    junction_acceleration: f64,
    min_line_length: f64,
    buffer: Vec<PlannerEntry>,
    capacity: usize,
    run: usize,
    len: usize,
    position: [f64; N_AXES],
}

impl Planner {
    pub fn new(config: &crate::config::Config) -> Self {
        let mut axes = [AxisRuntimeParams::from(&crate::config::AxisConfig::default()); N_AXES];
        for (i, name) in AXIS_NAMES.iter().enumerate() {
            if let Some(axis_cfg) = config.motion.axes.get(*name) {
                axes[i] = AxisRuntimeParams::from(axis_cfg);
            }
        }
        let capacity = config.motion.global.planner_buffer_size.max(2);
        Self {
            axes,
            junction_acceleration: config.motion.global.junction_acceleration,
            min_line_length: config.motion.global.min_line_length,
            buffer: Vec::with_capacity(capacity),
            capacity,
            run: 0,
            len: 0,
            position: [0.0; N_AXES],
        }
    }

    pub fn position(&self) -> [f64; N_AXES] {
        self.position
    }

    pub fn set_position(&mut self, position: [f64; N_AXES]) {
        self.position = position;
    }

    pub fn queue_len(&self) -> usize {
        self.len
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.run = 0;
        self.len = 0;
    }

    fn physical_index(&self, logical: usize) -> usize {
        (self.run + logical) % self.capacity
    }

    /// The entry the executor is currently (or about to start) running.
    pub fn current_mut(&mut self) -> Option<&mut PlannerEntry> {
        if self.len == 0 {
            return None;
        }
        let idx = self.physical_index(0);
        Some(&mut self.buffer[idx])
    }

    pub fn current(&self) -> Option<&PlannerEntry> {
        if self.len == 0 {
            return None;
        }
        Some(&self.buffer[self.physical_index(0)])
    }

    /// Drop the current (fully executed) entry.
    pub fn retire_current(&mut self) {
        if self.len == 0 {
            return;
        }
        self.run = (self.run + 1) % self.capacity;
        self.len -= 1;
    }

    fn projected_limit(&self, unit: &[f64; N_AXES], per_axis: impl Fn(&AxisRuntimeParams) -> f64) -> f64 {
        let mut limit = f64::INFINITY;
        for i in 0..N_AXES {
            let component = unit[i].abs();
            if component > 1e-9 {
                limit = limit.min(per_axis(&self.axes[i]) / component);
            }
        }
        if limit.is_finite() { limit } else { 0.0 }
    }

    pub fn plan_line(&mut self, target: [f64; N_AXES], feedrate_mm_per_min: f64) -> ReturnCode {
        if self.len == self.capacity {
            return ReturnCode::BufferFull;
        }

        let mut delta = [0.0; N_AXES];
        for i in 0..N_AXES {
            delta[i] = target[i] - self.position[i];
        }
        let length = delta.iter().map(|d| d * d).sum::<f64>().sqrt();
        if length < self.min_line_length {
            return ReturnCode::ZeroLengthMove;
        }
        let mut unit = [0.0; N_AXES];
        for i in 0..N_AXES {
            unit[i] = delta[i] / length;
        }

        for i in 0..N_AXES {
            if !self.axes[i].participates_in_travel_limits {
                continue;
            }
            if target[i] < self.axes[i].travel_min || target[i] > self.axes[i].travel_max {
                return ReturnCode::MaxTravelExceeded;
            }
        }

        let requested_velocity = feedrate_mm_per_min / 60.0;
        let velocity_limit = self.projected_limit(&unit, |a| a.velocity_max);
        let cruise_velocity = requested_velocity.min(velocity_limit);
        let jerk = self.projected_limit(&unit, |a| a.jerk_max);

        let mut entry = PlannerEntry::line(target, delta, unit, length, feedrate_mm_per_min, jerk);
        entry.cruise_velocity = cruise_velocity;
        entry.exit_velocity = 0.0;
        entry.entry_velocity = 0.0;

        self.push(entry);
        self.position = target;
        self.recalculate();
        ReturnCode::Ok
    }

    pub fn plan_dwell(&mut self, seconds: f64) -> ReturnCode {
        if self.len == self.capacity {
            return ReturnCode::BufferFull;
        }
        self.push(PlannerEntry::dwell(self.position, seconds));
        ReturnCode::Ok
    }

    pub fn plan_marker(&mut self, kind: MarkerKind) -> ReturnCode {
        if self.len == self.capacity {
            return ReturnCode::BufferFull;
        }
        self.push(PlannerEntry::marker(self.position, kind));
        ReturnCode::Ok
    }

    fn push(&mut self, entry: PlannerEntry) {
        let idx = self.physical_index(self.len);
        if idx < self.buffer.len() {
            self.buffer[idx] = entry;
        } else {
            self.buffer.push(entry);
        }
        self.len += 1;
    }

    /// A single representative acceleration for a move, derived from
    /// its jerk and the velocity change it's expected to absorb — the
    /// same relationship the executor's closed-form S-curve duration
    /// uses (`a_peak = sqrt(jerk * dv)`), so the planner's reachability
    /// check stays consistent with what the executor can actually fly.
    fn effective_acceleration(entry: &PlannerEntry) -> f64 {
        (entry.jerk * entry.cruise_velocity.max(1.0)).sqrt().max(1.0)
    }

    /// Backward pass then forward pass over the whole active window,
    /// re-run after every append. With a bounded buffer this is cheap
    /// and keeps the implementation simple; a production firmware would
    /// stop early once a pair is unchanged (§4.1), which is a pure
    /// performance optimization, not a correctness requirement.
    fn recalculate(&mut self) {
        if self.len < 2 {
            if self.len == 1 {
                let idx = self.physical_index(0);
                let entry = &mut self.buffer[idx];
                if entry.exact_stop {
                    entry.exit_velocity = 0.0;
                }
            }
            return;
        }

        // Backward pass: walk from the newest entry toward the oldest.
        for logical in (1..self.len).rev() {
            let curr_idx = self.physical_index(logical);
            let prev_idx = self.physical_index(logical - 1);

            let junction_limit = if self.buffer[prev_idx].is_motion() && self.buffer[curr_idx].is_motion() {
                JunctionDeviation::new(self.axes_min_junction_deviation())
                    .calculate_junction_speed(
                        &self.buffer[prev_idx].unit_vector,
                        &self.buffer[curr_idx].unit_vector,
                        self.junction_acceleration,
                    )
            } else {
                0.0
            };

            let curr_exit = self.buffer[curr_idx].exit_velocity;
            let curr_cruise = self.buffer[curr_idx].cruise_velocity;
            let curr_length = self.buffer[curr_idx].length;
            let accel = Self::effective_acceleration(&self.buffer[curr_idx]);

            let reachable_entry = (curr_exit * curr_exit + 2.0 * accel * curr_length).sqrt();
            let max_entry = curr_cruise.min(junction_limit).min(reachable_entry);

            self.buffer[curr_idx].entry_velocity = max_entry;
            self.buffer[prev_idx].exit_velocity = max_entry;
        }
        let first_idx = self.physical_index(0);
        self.buffer[first_idx].entry_velocity = 0.0;

        // Forward pass: an entry's cruise can't ask for more velocity
        // than its own entry velocity plus what jerk allows it to gain
        // across its length.
        for logical in 0..self.len {
            let idx = self.physical_index(logical);
            let entry = &mut self.buffer[idx];
            let accel = Self::effective_acceleration(entry);
            let reachable_cruise = (entry.entry_velocity * entry.entry_velocity + 2.0 * accel * entry.length).sqrt();
            entry.cruise_velocity = entry.cruise_velocity.min(reachable_cruise).max(entry.entry_velocity);
            if entry.exact_stop {
                entry.exit_velocity = 0.0;
            }
        }
        let last_idx = self.physical_index(self.len - 1);
        if self.buffer[last_idx].exact_stop {
            self.buffer[last_idx].exit_velocity = 0.0;
        }
    }

    fn axes_min_junction_deviation(&self) -> f64 {
        self.axes
            .iter()
            .filter(|a| a.participates_in_travel_limits)
            .map(|a| a.junction_deviation)
            .fold(f64::INFINITY, f64::min)
            .min(0.05)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn planner() -> Planner {
        Planner::new(&Config::default())
    }

    #[test]
    fn plan_line_rejects_sub_minimum_moves() {
        let mut p = planner();
        let code = p.plan_line([0.001, 0.0, 0.0, 0.0], 1000.0);
        assert_eq!(code, ReturnCode::ZeroLengthMove);
    }

    #[test]
    fn plan_line_accepts_and_queues_a_move() {
        let mut p = planner();
        let code = p.plan_line([10.0, 0.0, 0.0, 0.0], 1000.0);
        assert_eq!(code, ReturnCode::Ok);
        assert_eq!(p.queue_len(), 1);
    }

    #[test]
    fn straight_continuation_keeps_full_cruise_speed_at_the_junction() {
        let mut p = planner();
        assert_eq!(p.plan_line([50.0, 0.0, 0.0, 0.0], 6000.0), ReturnCode::Ok);
        assert_eq!(p.plan_line([100.0, 0.0, 0.0, 0.0], 6000.0), ReturnCode::Ok);
        let first = p.current().unwrap();
        assert!(first.exit_velocity > 0.0);
    }

    #[test]
    fn buffer_full_rejects_further_moves() {
        let mut p = Planner::new(&Config::default());
        let mut last_code = ReturnCode::Ok;
        for i in 0..100 {
            last_code = p.plan_line([i as f64 * 0.1 + 1.0, 0.0, 0.0, 0.0], 1000.0);
            if last_code != ReturnCode::Ok {
                break;
            }
        }
        assert_eq!(last_code, ReturnCode::BufferFull);
    }

    #[test]
    fn excessive_feedrate_is_accepted_and_clipped_to_the_axis_projection() {
        let mut p = planner();
        let code = p.plan_line([10.0, 0.0, 0.0, 0.0], 1_000_000_000.0);
        assert_eq!(code, ReturnCode::Ok);
        let entry = p.current().unwrap();
        assert_eq!(entry.cruise_velocity, p.axes[0].velocity_max);
    }

    #[test]
    fn travel_limit_is_enforced() {
        let mut p = planner();
        let code = p.plan_line([1.0e9, 0.0, 0.0, 0.0], 1000.0);
        assert_eq!(code, ReturnCode::MaxTravelExceeded);
    }
}
