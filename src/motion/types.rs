// src/motion/types.rs
//! Shared constants and plain data types for the motion core.

/// Number of logical axes the core tracks (X, Y, Z, E). Extending to a
/// fifth or sixth motor (e.g. a second Z or a CoreXY B axis) only
/// requires widening this constant and the per-axis config maps.
pub const N_AXES: usize = 4;

/// A move shorter than this (mm) is rejected as `ZeroLengthMove`.
pub const MIN_LINE_LENGTH: f64 = 0.03;

/// Below this (mm/min) two adjacent cruise velocities are treated as
/// equal for the purposes of junction planning.
pub const PLANNER_VELOCITY_TOLERANCE_MM_PER_MIN: f64 = 2.0;

/// Bounded-iteration HT-case solver limits (§4.2, §8).
pub const PLANNER_ITERATION_MAX: u32 = 10;
pub const PLANNER_ITERATION_ERROR_PERCENT: f64 = 0.10;

/// What kind of motion a planner entry represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveKind {
    Line,
    Dwell,
    Marker(MarkerKind),
    Stop,
    End,
}

/// Non-motion program markers that still occupy a planner slot so they
/// execute in queue order relative to surrounding moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    SpindleOnCw,
    SpindleOnCcw,
    SpindleOff,
    ToolChange,
    CoolantMist,
    CoolantFlood,
    CoolantOff,
    ProgramStop,
    ProgramEnd,
}

/// Where a planner entry sits in the segment executor's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Not yet reached by the executor.
    Off,
    /// Just became the running entry; segment lengths not yet computed.
    New,
    /// Entry has been carved into head/body/tail and is being stepped.
    Running,
    Head,
    Body,
    Tail,
}

/// A single buffered move or marker, the unit the planner operates on.
#[derive(Debug, Clone)]
pub struct PlannerEntry {
    pub kind: MoveKind,
    pub run_state: RunState,

    /// Absolute target position in machine units this entry ends at.
    pub target: [f64; N_AXES],
    /// Signed per-axis displacement from the previous entry's target.
    pub axis_delta: [f64; N_AXES],
    /// Unit vector of `axis_delta`; all zero for dwells/markers.
    pub unit_vector: [f64; N_AXES],
    /// Cartesian length of `axis_delta`, mm.
    pub length: f64,

    /// Requested feedrate in mm/min (G-code `F` convention), as given.
    pub requested_feedrate_mm_per_min: f64,

    pub entry_velocity: f64,
    pub cruise_velocity: f64,
    pub exit_velocity: f64,

    /// Effective jerk (mm/s^3) used to size this move's head/tail.
    pub jerk: f64,

    /// True if the program asked for an exact stop at this entry's end
    /// (forces `exit_velocity = 0`).
    pub exact_stop: bool,

    /// Dwell duration in seconds, meaningful only for `MoveKind::Dwell`.
    pub dwell_seconds: f64,
}

impl PlannerEntry {
    pub fn line(
        target: [f64; N_AXES],
        axis_delta: [f64; N_AXES],
        unit_vector: [f64; N_AXES],
        length: f64,
        requested_feedrate_mm_per_min: f64,
        jerk: f64,
    ) -> Self {
        Self {
            kind: MoveKind::Line,
            run_state: RunState::Off,
            target,
            axis_delta,
            unit_vector,
            length,
            requested_feedrate_mm_per_min,
            entry_velocity: 0.0,
            cruise_velocity: 0.0,
            exit_velocity: 0.0,
            jerk,
            exact_stop: false,
            dwell_seconds: 0.0,
        }
    }

    pub fn dwell(target: [f64; N_AXES], seconds: f64) -> Self {
        Self {
            kind: MoveKind::Dwell,
            run_state: RunState::Off,
            target,
            axis_delta: [0.0; N_AXES],
            unit_vector: [0.0; N_AXES],
            length: 0.0,
            requested_feedrate_mm_per_min: 0.0,
            entry_velocity: 0.0,
            cruise_velocity: 0.0,
            exit_velocity: 0.0,
            jerk: 0.0,
            exact_stop: true,
            dwell_seconds: seconds,
        }
    }

    pub fn marker(target: [f64; N_AXES], kind: MarkerKind) -> Self {
        Self {
            kind: MoveKind::Marker(kind),
            run_state: RunState::Off,
            target,
            axis_delta: [0.0; N_AXES],
            unit_vector: [0.0; N_AXES],
            length: 0.0,
            requested_feedrate_mm_per_min: 0.0,
            entry_velocity: 0.0,
            cruise_velocity: 0.0,
            exit_velocity: 0.0,
            jerk: 0.0,
            exact_stop: true,
            dwell_seconds: 0.0,
        }
    }

    pub fn is_motion(&self) -> bool {
        matches!(self.kind, MoveKind::Line)
    }
}

/// The three position views described in §3: the planner's running
/// target, the position the executor has committed to a segment, and
/// the position actually reached by integer step counts.
#[derive(Debug, Clone, Copy, Default)]
pub struct PositionViews {
    pub planner: [f64; N_AXES],
    pub runtime: [f64; N_AXES],
    pub machine: [f64; N_AXES],
}
