// src/motion/mod.rs
//! The motion core (§3-§6): a look-ahead planner feeding a jerk-limited
//! segment executor, which in turn drives a Bresenham-style stepper
//! DDA. Everything in the submodules below is synchronous, integer- or
//! float-deterministic, and has no `tokio` dependency — `MotionController`
//! is the thin async facade the rest of the firmware talks to.

pub mod arc;
pub mod error;
pub mod executor;
pub mod junction;
pub mod kinematics;
pub mod planner;
pub mod state_machine;
pub mod stepper;
pub mod types;
pub mod virtual_clock;

pub use error::{MotionResult, ReturnCode};
pub use state_machine::MotionState;
pub use types::{MarkerKind, MoveKind, N_AXES, PositionViews};

use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::Config;
use crate::hardware::HardwareManager;
use crate::motion::executor::{build_profile, MoveProfile};
use crate::motion::kinematics::{Kinematics, MotorGeometry, Polarity, RadiusMode};
use crate::motion::planner::{Planner, AXIS_NAMES};
use crate::motion::state_machine::MotionStateMachine;
use crate::motion::stepper::{DdaRuntime, DdaSegment, RecordingStepSink, StepSink};
use crate::motion::virtual_clock::{Tickable, VirtualClock};
use crate::printer::PrinterState;

/// Simulated DDA interrupt frequency. This core runs every segment at
/// the same fixed rate rather than computing a per-segment timer
/// reload the way a real target would to keep its step rate near one
/// tick per step; `stepper::postscale_period` exists to size that
/// reload against a real target's 16-bit timer and is deliberately not
/// wired into this fixed-rate host pipeline. A real MCU target derives
/// its tick rate from a hardware timer prescaler instead; the host
/// core just needs a fixed, deterministic mapping from seconds to
/// ticks.
const DDA_TICK_HZ: f64 = 1_000_000.0;

/// Assembles the planner, executor, and DDA into one synchronous
/// state machine, generic over the `StepSink` that actually receives
/// pulses (real GPIO on a target, `RecordingStepSink` on the host).
pub struct MotionCore<S: StepSink> {
    planner: Planner,
    dda: DdaRuntime,
    state_machine: MotionStateMachine,
    kinematics: Box<dyn Kinematics>,
    geometry: [MotorGeometry; N_AXES],
    pending_segments: VecDeque<DdaSegment>,
    /// Length (same units as `PlannerEntry::length`) each queued
    /// segment in `pending_segments` contributes, kept in lockstep so a
    /// feedhold can recover how much distance is left to brake in.
    pending_segment_lengths: VecDeque<f64>,
    current_segment: Option<DdaSegment>,
    /// Length the currently loaded DDA segment contributes, mirroring
    /// `pending_segment_lengths` for whatever was just popped off it.
    current_segment_length: f64,
    /// Axis-space displacement and total length of the entry the DDA is
    /// currently working through, used to prorate `runtime_position` as
    /// each of its segments completes.
    current_entry_axis_delta: [f64; N_AXES],
    current_entry_length: f64,
    /// `position_runtime` (§3): position as of the last fully completed
    /// segment, distinct from the look-ahead `planner` position and the
    /// integer-step `machine` position.
    runtime_position: [f64; N_AXES],
    machine_steps: [i64; N_AXES],
    hold_requested: bool,
    /// Whether `planner.current()` has already been handed to the DDA
    /// via `load_line_entry`/`load_dwell_entry`. `advance()` only
    /// retires the current entry when this is true — otherwise the
    /// very first `advance()` call after a fresh queue push (from
    /// `kickstart`, with nothing yet loaded) would discard the entry
    /// before it ever ran.
    entry_loaded: bool,
    last_marker: Option<MarkerKind>,
    /// Nominal segment duration the executor slices head/body/tail into
    /// (§4.2 `ESTD_SEGMENT_USEC`), seconds.
    segment_target_seconds: f64,
    /// Floor below which a phase is kept as a single segment rather than
    /// being sliced further (§4.2 `MIN_SEGMENT_TIME`), seconds.
    segment_min_seconds: f64,
    /// Physical-length floor a sliced segment must not fall under (§4.2
    /// `MIN_SEGMENT_LENGTH`), mm.
    segment_min_length: f64,
    /// Jerk of the currently loaded line entry, kept so a feedhold can
    /// rebuild its tail down to a zero exit velocity.
    entry_jerk: f64,
    sink: S,
}

impl<S: StepSink> MotionCore<S> {
    pub fn new(config: &Config, sink: S) -> Self {
        let mut geometry = [MotorGeometry::new(80.0, Polarity::Normal, RadiusMode::Linear); N_AXES];
        for (i, name) in AXIS_NAMES.iter().enumerate() {
            if let Some(motor_cfg) = config.motion.motors.get(*name) {
                let polarity = match motor_cfg.polarity {
                    crate::config::MotorPolarity::Normal => Polarity::Normal,
                    crate::config::MotorPolarity::Reversed => Polarity::Reversed,
                };
                let radius_mode = match config.motion.axes.get(*name).map(|a| a.axis_mode) {
                    Some(crate::config::AxisMode::Radius) => RadiusMode::Radius,
                    _ => RadiusMode::Linear,
                };
                geometry[i] = MotorGeometry::new(motor_cfg.steps_per_unit(), polarity, radius_mode);
            }
        }
        Self {
            planner: Planner::new(config),
            dda: DdaRuntime::new(),
            state_machine: MotionStateMachine::new(),
            kinematics: crate::motion::kinematics::from_name(&config.printer.kinematics),
            geometry,
            pending_segments: VecDeque::new(),
            pending_segment_lengths: VecDeque::new(),
            current_segment: None,
            current_segment_length: 0.0,
            current_entry_axis_delta: [0.0; N_AXES],
            current_entry_length: 0.0,
            runtime_position: [0.0; N_AXES],
            machine_steps: [0; N_AXES],
            hold_requested: false,
            entry_loaded: false,
            last_marker: None,
            segment_target_seconds: config.motion.global.estimated_segment_usec as f64 / 1_000_000.0,
            segment_min_seconds: config.motion.global.min_segment_time,
            segment_min_length: config.motion.global.min_segment_length,
            entry_jerk: 0.0,
            sink,
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn queue_len(&self) -> usize {
        self.planner.queue_len()
    }

    pub fn state(&self) -> MotionState {
        self.state_machine.state()
    }

    pub fn position(&self) -> PositionViews {
        PositionViews {
            planner: self.planner.position(),
            runtime: self.runtime_position,
            machine: self.machine_position(),
        }
    }

    pub fn set_position(&mut self, position: [f64; N_AXES]) {
        self.planner.set_position(position);
        self.runtime_position = position;
        let motor_position = self.kinematics.axis_delta_to_motor_delta(position);
        for i in 0..N_AXES {
            self.machine_steps[i] = self.geometry[i].position_to_steps(motor_position[i]);
        }
    }

    pub fn queue_line(&mut self, target: [f64; N_AXES], feedrate_mm_per_min: f64) -> ReturnCode {
        if !self.state_machine.is_accepting_new_moves() {
            return ReturnCode::Again;
        }
        let code = self.planner.plan_line(target, feedrate_mm_per_min);
        if code == ReturnCode::Ok {
            self.kickstart();
        }
        code
    }

    pub fn queue_dwell(&mut self, seconds: f64) -> ReturnCode {
        if !self.state_machine.is_accepting_new_moves() {
            return ReturnCode::Again;
        }
        let code = self.planner.plan_dwell(seconds);
        if code == ReturnCode::Ok {
            self.kickstart();
        }
        code
    }

    pub fn queue_marker(&mut self, kind: MarkerKind) -> ReturnCode {
        if !self.state_machine.is_accepting_new_moves() {
            return ReturnCode::Again;
        }
        let code = self.planner.plan_marker(kind);
        if code == ReturnCode::Ok {
            self.kickstart();
        }
        code
    }

    pub fn queue_arc(&mut self, spec: &crate::motion::arc::ArcSpec, feedrate_mm_per_min: f64) -> ReturnCode {
        let chords = match crate::motion::arc::lower_to_chords(spec) {
            Ok(chords) => chords,
            Err(code) => return code,
        };
        for chord in chords {
            let code = self.queue_line(chord, feedrate_mm_per_min);
            if code != ReturnCode::Ok {
                return code;
            }
        }
        ReturnCode::Ok
    }

    pub fn take_last_marker(&mut self) -> Option<MarkerKind> {
        self.last_marker.take()
    }

    /// `!` / feedhold: force the running entry's exit velocity to zero
    /// and re-plan its still-undispatched segments into a fresh tail
    /// that brakes to a stop within whatever distance is left in the
    /// move (§4.5). The segment already loaded into the DDA is already
    /// in flight and can't be truncated, so the brake begins at the
    /// next segment boundary rather than instantaneously — never past
    /// the end of the currently running move.
    pub fn request_hold(&mut self) -> ReturnCode {
        let code = self.state_machine.request_hold();
        if code == ReturnCode::Ok {
            self.hold_requested = true;
            self.replan_running_tail_to_zero();
        }
        code
    }

    pub fn request_resume(&mut self) -> ReturnCode {
        self.hold_requested = false;
        let code = self.state_machine.request_resume();
        if code == ReturnCode::Ok {
            self.kickstart();
        }
        code
    }

    pub fn request_end(&mut self) -> ReturnCode {
        self.hold_requested = false;
        self.pending_segments.clear();
        self.pending_segment_lengths.clear();
        self.current_segment = None;
        self.planner.clear();
        self.state_machine.request_end()
    }

    /// Rebuild the still-undispatched segments of the running entry
    /// into a tail that brakes to zero within the distance they still
    /// cover, instead of letting the entry finish at its originally
    /// planned (possibly nonzero) exit velocity.
    fn replan_running_tail_to_zero(&mut self) {
        if self.pending_segments.is_empty() {
            return;
        }
        let remaining_length: f64 = self.pending_segment_lengths.iter().sum();
        if remaining_length <= 1e-9 {
            return;
        }

        // Each queued segment already runs at a fixed, self-consistent
        // rate (length / duration); use the rate of the next one due to
        // run as the velocity the brake starts from.
        let first = self.pending_segments.front().unwrap();
        let first_length = *self.pending_segment_lengths.front().unwrap();
        let first_duration = first.ticks as f64 / DDA_TICK_HZ;
        let velocity_now = if first_duration > 1e-9 {
            first_length / first_duration
        } else {
            0.0
        };

        let mut remaining_motor_steps = [0i64; N_AXES];
        for seg in &self.pending_segments {
            for i in 0..N_AXES {
                remaining_motor_steps[i] += seg.motor_steps[i] as i64;
            }
        }

        let (profile, code) = build_profile(remaining_length, velocity_now, velocity_now, 0.0, self.entry_jerk);
        if code != ReturnCode::Ok {
            tracing::warn!(
                ?code,
                remaining_length,
                velocity_now,
                "feedhold tail replan could not fully brake within the remaining move distance"
            );
        }

        let segments = self.slice_profile_into_segments(&profile, &remaining_motor_steps);
        self.pending_segments.clear();
        self.pending_segment_lengths.clear();
        for (ticks, motor_steps, length) in segments {
            self.pending_segments.push_back(DdaSegment { ticks, motor_steps });
            self.pending_segment_lengths.push_back(length);
        }
    }

    fn machine_position(&self) -> [f64; N_AXES] {
        let mut motor_position = [0.0; N_AXES];
        for i in 0..N_AXES {
            let signed_steps = match self.geometry[i].polarity {
                Polarity::Normal => self.machine_steps[i],
                Polarity::Reversed => -self.machine_steps[i],
            };
            motor_position[i] = signed_steps as f64 / self.geometry[i].steps_per_unit.max(1e-9);
        }
        self.kinematics.motor_to_axis_position(motor_position)
    }

    fn kickstart(&mut self) {
        if !self.dda.is_running() && self.current_segment.is_none() {
            self.advance();
        }
    }

    /// Load whatever should run next: another queued segment of the
    /// current entry, the next entry in the planner, or nothing.
    fn advance(&mut self) {
        // The segment that was loaded into the DDA on entry to this call
        // has just run to completion (or never existed); commit its
        // share of the running entry's axis delta to `runtime_position`
        // before moving on, so §3's "position as of the last completed
        // segment" stays accurate at every segment boundary, not just
        // at the end of the entry.
        if self.current_segment_length > 1e-12 && self.current_entry_length > 1e-12 {
            let fraction = self.current_segment_length / self.current_entry_length;
            for i in 0..N_AXES {
                self.runtime_position[i] += self.current_entry_axis_delta[i] * fraction;
            }
        }
        self.current_segment_length = 0.0;

        if let Some(seg) = self.pending_segments.pop_front() {
            self.current_segment_length = self.pending_segment_lengths.pop_front().unwrap_or(0.0);
            self.dda.load(&seg);
            self.current_segment = Some(seg);
            return;
        }

        if self.entry_loaded {
            self.planner.retire_current();
            self.entry_loaded = false;
        }
        self.current_segment = None;

        if self.hold_requested {
            self.state_machine.on_hold_complete();
            return;
        }

        loop {
            let kind = match self.planner.current() {
                Some(entry) => entry.kind,
                None => {
                    self.state_machine.on_queue_empty();
                    return;
                }
            };
            match kind {
                MoveKind::Marker(marker_kind) => {
                    self.last_marker = Some(marker_kind);
                    self.planner.retire_current();
                    continue;
                }
                MoveKind::Stop | MoveKind::End => {
                    self.planner.retire_current();
                    continue;
                }
                MoveKind::Dwell => {
                    self.load_dwell_entry();
                    return;
                }
                MoveKind::Line => {
                    self.load_line_entry();
                    return;
                }
            }
        }
    }

    fn load_dwell_entry(&mut self) {
        let seconds = match self.planner.current() {
            Some(entry) => entry.dwell_seconds,
            None => return,
        };
        let ticks = ((seconds * DDA_TICK_HZ).round() as u32).max(1);
        let seg = DdaSegment {
            ticks,
            motor_steps: [0; N_AXES],
        };
        self.dda.begin_entry();
        self.dda.load(&seg);
        self.current_segment = Some(seg);
        self.entry_loaded = true;
        self.state_machine.on_motion_started();
    }

    fn load_line_entry(&mut self) {
        let entry = match self.planner.current() {
            Some(entry) => entry.clone(),
            None => return,
        };
        let exit_velocity = if self.hold_requested { 0.0 } else { entry.exit_velocity };

        let (profile, code) = build_profile(
            entry.length,
            entry.entry_velocity,
            entry.cruise_velocity,
            exit_velocity,
            entry.jerk,
        );
        if code != ReturnCode::Ok {
            tracing::warn!(
                ?code,
                length = entry.length,
                cruise_velocity = entry.cruise_velocity,
                "segment executor profile did not converge to the requested cruise velocity"
            );
        }

        let motor_delta = self.kinematics.axis_delta_to_motor_delta(entry.axis_delta);
        let mut motor_target_steps = [0i64; N_AXES];
        for i in 0..N_AXES {
            motor_target_steps[i] = self.geometry[i].position_to_steps(motor_delta[i]);
        }

        let segments = self.slice_profile_into_segments(&profile, &motor_target_steps);
        if segments.is_empty() {
            // Rounded down to nothing runnable (a vanishingly short move);
            // retire it without ever having queued a DDA segment.
            self.planner.retire_current();
            return;
        }

        self.entry_jerk = entry.jerk;
        self.current_entry_axis_delta = entry.axis_delta;
        self.current_entry_length = profile.total_length().max(1e-9);
        self.pending_segments.clear();
        self.pending_segment_lengths.clear();
        self.dda.begin_entry();
        for (ticks, motor_steps, length) in segments {
            self.pending_segments.push_back(DdaSegment { ticks, motor_steps });
            self.pending_segment_lengths.push_back(length);
        }

        let first = self.pending_segments.pop_front().unwrap();
        self.current_segment_length = self.pending_segment_lengths.pop_front().unwrap_or(0.0);
        self.dda.load(&first);
        self.current_segment = Some(first);
        self.entry_loaded = true;
        self.state_machine.on_motion_started();
    }

    /// Slice a resolved head/body/tail profile into near-
    /// `segment_target_seconds` chunks (§4.2 "segment cadence") rather
    /// than handing the DDA one giant segment per phase — a real
    /// target's load-next-segment interrupt fires at roughly this
    /// cadence, and exercising that here keeps the
    /// single-producer/single-consumer segment slot actually busy the
    /// way §5's concurrency model assumes. Returns, for each chunk, its
    /// DDA tick count, its per-motor step counts, and the length (in
    /// `motor_target_steps`' units) it covers.
    fn slice_profile_into_segments(
        &self,
        profile: &MoveProfile,
        motor_target_steps: &[i64; N_AXES],
    ) -> Vec<(u32, [i32; N_AXES], f64)> {
        let total_length = profile.total_length().max(1e-9);
        let phases = [
            (profile.head_time, profile.head_length),
            (profile.body_time, profile.body_length),
            (profile.tail_time, profile.tail_length),
        ];

        let mut durations: Vec<f64> = Vec::new();
        let mut length_fractions: Vec<f64> = Vec::new();
        let mut lengths: Vec<f64> = Vec::new();
        for (time, length) in phases {
            if time <= 0.0 {
                continue;
            }
            // MIN_SEGMENT_LENGTH is a physical-length floor; convert it to
            // an equivalent time floor using this phase's average velocity
            // so both minimums can be enforced by the one time-based slicer.
            let velocity = length / time;
            let length_floor_seconds = if velocity > 1e-9 {
                self.segment_min_length / velocity
            } else {
                0.0
            };
            let min_seconds = self.segment_min_seconds.max(length_floor_seconds);
            for sub_time in slice_phase_duration(time, self.segment_target_seconds, min_seconds) {
                let sub_length = length * (sub_time / time);
                durations.push(sub_time);
                length_fractions.push(sub_length / total_length);
                lengths.push(sub_length);
            }
        }

        if durations.is_empty() {
            return Vec::new();
        }

        let segment_steps = split_steps_into_segments(motor_target_steps, &length_fractions);
        durations
            .into_iter()
            .zip(segment_steps)
            .zip(lengths)
            .map(|((duration, motor_steps), length)| {
                let ticks = ((duration * DDA_TICK_HZ).round() as u32).max(1);
                (ticks, motor_steps, length)
            })
            .collect()
    }
}

/// Slice one phase's duration into chunks near `target` seconds long,
/// never shorter than `min_time` — folding the whole phase into a single
/// segment when it's already at or below that floor (the common case for
/// short HT-case moves). The returned durations always sum to exactly
/// `phase_time`, so no phase boundary ever loses or gains time.
fn slice_phase_duration(phase_time: f64, target: f64, min_time: f64) -> Vec<f64> {
    let floor = target.max(min_time).max(1e-6);
    if phase_time <= floor {
        return vec![phase_time];
    }
    let mut count = (phase_time / target).round().max(1.0) as usize;
    if phase_time / count as f64 < min_time {
        count = (phase_time / min_time).floor().max(1.0) as usize;
    }
    vec![phase_time / count as f64; count]
}

/// Split each motor's total signed step count across an arbitrary number
/// of segments by length fraction, carrying the rounding remainder
/// forward so the sum across every segment always equals the original
/// total exactly (§8 invariant 3: zero cumulative step drift).
fn split_steps_into_segments(total_steps: &[i64; N_AXES], fractions: &[f64]) -> Vec<[i32; N_AXES]> {
    let mut result = vec![[0i32; N_AXES]; fractions.len()];
    for axis in 0..N_AXES {
        let total = total_steps[axis];
        let mut allocated = 0i64;
        let mut cumulative_fraction = 0.0;
        for (segment, result_segment) in result.iter_mut().enumerate() {
            cumulative_fraction += fractions[segment];
            let target_cumulative = (total as f64 * cumulative_fraction).round() as i64;
            result_segment[axis] = (target_cumulative - allocated) as i32;
            allocated = target_cumulative;
        }
        let sum: i64 = result.iter().map(|p| p[axis] as i64).sum();
        if sum != total {
            let last = result.len() - 1;
            result[last][axis] += (total - sum) as i32;
        }
    }
    result
}

impl<S: StepSink> Tickable for MotionCore<S> {
    fn dda_tick(&mut self) -> bool {
        if !self.dda.is_running() {
            return true;
        }
        let done = self.dda.tick(&mut self.sink);
        if done {
            if let Some(seg) = self.current_segment.take() {
                for i in 0..N_AXES {
                    self.machine_steps[i] += seg.motor_steps[i] as i64;
                }
            }
        }
        done
    }

    fn load_next_segment(&mut self) {
        self.advance();
    }
}

/// Number of virtual-clock ticks driven per [`MotionController::update`]
/// call — the async facade's equivalent of one scheduler quantum.
const TICKS_PER_UPDATE: u32 = 2_000;

/// Async-friendly wrapper the rest of the firmware talks to, owning a
/// [`MotionCore`] plus the host [`VirtualClock`] that steps it and the
/// [`HardwareManager`] handle used for side effects (homing) the core
/// itself has no business knowing about.
pub struct MotionController {
    state: Arc<RwLock<PrinterState>>,
    hardware_manager: HardwareManager,
    core: MotionCore<RecordingStepSink>,
    clock: VirtualClock,
}

impl MotionController {
    pub fn new(state: Arc<RwLock<PrinterState>>, hardware_manager: HardwareManager, config: &Config) -> Self {
        Self {
            state,
            hardware_manager,
            core: MotionCore::new(config, RecordingStepSink::default()),
            clock: VirtualClock::new(),
        }
    }

    pub async fn queue_linear_move(
        &mut self,
        target: [f64; 3],
        feedrate: Option<f64>,
        extrude: Option<f64>,
    ) -> Result<(), ReturnCode> {
        let current = self.core.position().planner;
        let target_e = match extrude {
            Some(e) => current[3] + e,
            None => current[3],
        };
        let target_4d = [target[0], target[1], target[2], target_e];
        let feedrate_mm_per_min = feedrate.unwrap_or(1500.0);

        let code = self.core.queue_line(target_4d, feedrate_mm_per_min);
        self.pump();
        if code.is_ok() {
            let mut state = self.state.write().await;
            state.position = [target_4d[0], target_4d[1], target_4d[2]];
            Ok(())
        } else {
            Err(code)
        }
    }

    pub async fn queue_home(&mut self) -> Result<(), ReturnCode> {
        tracing::info!("Homing all axes");
        let _ = self.hardware_manager.send_command("home_all").await;
        self.core.set_position([0.0; 4]);
        let mut state = self.state.write().await;
        state.position = [0.0, 0.0, 0.0];
        Ok(())
    }

    /// Queue a dwell (G4). Doesn't touch `PrinterState::position`.
    pub async fn queue_dwell(&mut self, seconds: f64) -> Result<(), ReturnCode> {
        let code = self.core.queue_dwell(seconds);
        self.pump();
        code.is_ok().then_some(()).ok_or(code)
    }

    /// Queue a non-motion program marker (spindle/coolant/tool-change/stop).
    pub async fn queue_marker(&mut self, kind: MarkerKind) -> Result<(), ReturnCode> {
        let code = self.core.queue_marker(kind);
        self.pump();
        code.is_ok().then_some(()).ok_or(code)
    }

    /// Queue an arc (G2/G3), lowered to chords and fed through `queue_line`.
    pub async fn queue_arc(
        &mut self,
        spec: &crate::motion::arc::ArcSpec,
        feedrate_mm_per_min: f64,
    ) -> Result<(), ReturnCode> {
        let code = self.core.queue_arc(spec, feedrate_mm_per_min);
        self.pump();
        if code.is_ok() {
            let machine = self.core.position().machine;
            let mut state = self.state.write().await;
            state.position = [machine[0], machine[1], machine[2]];
            Ok(())
        } else {
            Err(code)
        }
    }

    /// Pop the most recently retired program marker, if any, so the
    /// G-code layer can act on it (e.g. actually toggle a spindle relay).
    pub fn take_last_marker(&mut self) -> Option<MarkerKind> {
        self.core.take_last_marker()
    }

    pub fn emergency_stop(&mut self) {
        tracing::warn!("Emergency stop activated - clearing motion queue");
        self.core.request_end();
    }

    pub fn pause_queue(&mut self) -> ReturnCode {
        self.core.request_hold()
    }

    pub fn resume_queue(&mut self) -> ReturnCode {
        self.core.request_resume()
    }

    pub fn cancel_queue(&mut self) -> ReturnCode {
        self.core.request_end()
    }

    pub fn get_queue_state(&self) -> MotionState {
        self.core.state()
    }

    pub async fn update(&mut self) -> Result<(), ReturnCode> {
        self.pump();
        Ok(())
    }

    fn pump(&mut self) {
        for _ in 0..TICKS_PER_UPDATE {
            self.clock.step(&mut self.core);
        }
    }

    pub fn queue_length(&self) -> usize {
        self.core.queue_len()
    }

    pub fn get_current_position(&self) -> [f64; 4] {
        self.core.position().machine
    }

    pub fn set_position(&mut self, position: [f64; 4]) {
        self.core.set_position(position);
    }
}

impl std::fmt::Debug for MotionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MotionController")
            .field("hardware_manager", &self.hardware_manager)
            .field("queue_length", &self.core.queue_len())
            .field("position", &self.core.position().machine)
            .finish()
    }
}

impl Default for MotionController {
    fn default() -> Self {
        let state = Arc::new(RwLock::new(PrinterState::new()));
        let hardware_manager = HardwareManager::new(Config::default());
        let config = Config::default();
        MotionController::new(state, hardware_manager, &config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::stepper::RecordingStepSink;

    fn core() -> MotionCore<RecordingStepSink> {
        MotionCore::new(&Config::default(), RecordingStepSink::default())
    }

    #[test]
    fn corexy_kinematics_still_converges_on_the_commanded_axis_position() {
        let mut config = Config::default();
        config.printer.kinematics = "corexy".to_string();
        let mut c = MotionCore::new(&config, RecordingStepSink::default());
        assert_eq!(c.queue_line([20.0, 10.0, 0.0, 0.0], 3000.0), ReturnCode::Ok);
        let mut clock = VirtualClock::new();
        let went_idle = clock.run_until_idle(&mut c, |core| core.state() == MotionState::Idle, 4_000_000);
        assert!(went_idle);
        let pos = c.position().machine;
        assert!((pos[0] - 20.0).abs() < 0.02);
        assert!((pos[1] - 10.0).abs() < 0.02);
    }

    #[test]
    fn a_freshly_queued_line_is_not_retired_before_it_runs() {
        // Regression: advance() must not discard planner.current() on
        // the very first kickstart, before load_line_entry ever loads a
        // segment into the DDA.
        let mut c = core();
        assert_eq!(c.queue_line([10.0, 0.0, 0.0, 0.0], 1000.0), ReturnCode::Ok);
        assert_eq!(c.queue_len(), 1);
        assert_eq!(c.state(), MotionState::Running);
    }

    #[test]
    fn queuing_a_line_eventually_reaches_the_target() {
        let mut c = core();
        assert_eq!(c.queue_line([10.0, 0.0, 0.0, 0.0], 1000.0), ReturnCode::Ok);
        let mut clock = VirtualClock::new();
        let went_idle = clock.run_until_idle(&mut c, |core| core.state() == MotionState::Idle, 2_000_000);
        assert!(went_idle);
        let pos = c.position().machine;
        assert!((pos[0] - 10.0).abs() < 0.01);
    }

    #[test]
    fn dwell_consumes_ticks_without_stepping() {
        let mut c = core();
        assert_eq!(c.queue_dwell(0.001), ReturnCode::Ok);
        let mut clock = VirtualClock::new();
        let went_idle = clock.run_until_idle(&mut c, |core| core.state() == MotionState::Idle, 2_000_000);
        assert!(went_idle);
        assert_eq!(c.sink().steps, [0; N_AXES]);
    }

    #[test]
    fn marker_is_surfaced_and_retired_without_motion() {
        let mut c = core();
        assert_eq!(c.queue_marker(MarkerKind::SpindleOnCw), ReturnCode::Ok);
        let mut clock = VirtualClock::new();
        clock.run_until_idle(&mut c, |core| core.state() == MotionState::Idle, 1000);
        assert_eq!(c.take_last_marker(), Some(MarkerKind::SpindleOnCw));
    }

    #[test]
    fn hold_then_resume_completes_the_queue() {
        let mut c = core();
        c.queue_line([50.0, 0.0, 0.0, 0.0], 3000.0);
        c.queue_line([100.0, 0.0, 0.0, 0.0], 3000.0);
        assert_eq!(c.request_hold(), ReturnCode::Ok);
        let mut clock = VirtualClock::new();
        clock.run_until_idle(&mut c, |core| core.state() == MotionState::Held, 5_000_000);
        assert_eq!(c.state(), MotionState::Held);
        assert_eq!(c.request_resume(), ReturnCode::Ok);
        let went_idle = clock.run_until_idle(&mut c, |core| core.state() == MotionState::Idle, 5_000_000);
        assert!(went_idle);
    }

    #[test]
    fn slice_phase_duration_preserves_total_and_respects_the_floor() {
        let chunks = slice_phase_duration(0.1, 0.01, 0.005);
        let total: f64 = chunks.iter().sum();
        assert!((total - 0.1).abs() < 1e-9);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(*c >= 0.005 - 1e-9);
        }

        // A phase shorter than the floor is left as a single segment.
        let short = slice_phase_duration(0.002, 0.01, 0.005);
        assert_eq!(short, vec![0.002]);
    }

    #[test]
    fn split_steps_into_segments_never_drops_a_step() {
        let total = [1_000_000i64, -333, 0, 7];
        let fractions = vec![0.1, 0.2, 0.05, 0.3, 0.35];
        let segments = split_steps_into_segments(&total, &fractions);
        assert_eq!(segments.len(), 5);
        for axis in 0..N_AXES {
            let sum: i64 = segments.iter().map(|s| s[axis] as i64).sum();
            assert_eq!(sum, total[axis]);
        }
    }

    /// A long enough move must be sliced into several segment-cadence
    /// chunks rather than one giant segment per phase, exercising
    /// `estimated_segment_usec`/`min_segment_time` end to end.
    #[test]
    fn a_long_move_is_sliced_into_several_segment_cadence_chunks() {
        let mut c = core();
        assert_eq!(c.queue_line([200.0, 0.0, 0.0, 0.0], 6000.0), ReturnCode::Ok);
        // load_line_entry() already ran during queue_line's kickstart;
        // the remaining queued chunks (beyond the one already loaded
        // into the DDA) prove the phase was sliced, not handed over whole.
        assert!(c.pending_segments.len() > 1);
    }

    /// A feedhold requested mid-move must re-plan the still-undispatched
    /// segments into a tail braking to zero (§4.5), not let the running
    /// entry finish at whatever exit velocity it was originally planned
    /// with.
    #[test]
    fn feedhold_decelerates_the_running_move_to_zero_before_holding() {
        let mut c = core();
        assert_eq!(c.queue_line([200.0, 0.0, 0.0, 0.0], 6000.0), ReturnCode::Ok);
        let mut clock = VirtualClock::new();
        // Run partway into the move so it is in its cruise phase, not
        // still in its head, before holding.
        for _ in 0..200_000 {
            clock.step(&mut c);
        }
        assert_eq!(c.state(), MotionState::Running);
        assert_eq!(c.request_hold(), ReturnCode::Ok);

        let velocities: Vec<f64> = c
            .pending_segments
            .iter()
            .zip(c.pending_segment_lengths.iter())
            .map(|(seg, length)| length / (seg.ticks as f64 / DDA_TICK_HZ))
            .collect();
        assert!(!velocities.is_empty());
        let last = *velocities.last().unwrap();
        assert!(last < 1.0, "expected the replanned tail to brake near zero, got {last}");
        for pair in velocities.windows(2) {
            assert!(pair[1] <= pair[0] + 1e-6, "velocity rose across the replanned tail: {pair:?}");
        }

        let went_held = clock.run_until_idle(&mut c, |core| core.state() == MotionState::Held, 5_000_000);
        assert!(went_held);
        assert_eq!(c.state(), MotionState::Held);
    }

    /// `position().runtime` tracks the position as of the last fully
    /// completed segment (§3), distinct from the look-ahead planner
    /// position while a move is still in flight.
    #[test]
    fn runtime_position_lags_planner_position_mid_move_then_converges() {
        let mut c = core();
        assert_eq!(c.queue_line([100.0, 0.0, 0.0, 0.0], 3000.0), ReturnCode::Ok);
        let mut clock = VirtualClock::new();
        for _ in 0..50_000 {
            clock.step(&mut c);
        }
        let mid = c.position();
        assert!(mid.runtime[0] > 0.0);
        assert!(mid.runtime[0] < mid.planner[0] - 1e-6);

        let went_idle = clock.run_until_idle(&mut c, |core| core.state() == MotionState::Idle, 5_000_000);
        assert!(went_idle);
        let end = c.position();
        assert!((end.runtime[0] - 100.0).abs() < 0.02);
        assert!((end.runtime[0] - end.planner[0]).abs() < 1e-6);
    }
}
