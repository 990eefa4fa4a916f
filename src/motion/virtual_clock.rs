// src/motion/virtual_clock.rs
//! Host-side stand-in for the two interrupt contexts a real MCU target
//! would use to drive the motion core: a high-priority DDA tick and a
//! lower-priority "load next segment" context. On the host there is no
//! real interrupt controller, so `VirtualClock` just calls both
//! handlers in priority order for each logical tick, advancing a
//! monotonic tick counter rather than sleeping — this lets tests and
//! benchmarks run the whole planner/executor/DDA pipeline without a
//! `tokio` runtime or real wall-clock time.

/// Implemented by whatever owns the DDA runtime (`MotionCore`).
pub trait Tickable {
    /// Highest-priority context: advance the DDA by one tick. Returns
    /// `true` if a segment just completed and the lower-priority
    /// context should be given a chance to load the next one.
    fn dda_tick(&mut self) -> bool;

    /// Lower-priority context: load the next segment, or service a
    /// pending dwell/marker. Called once after `dda_tick` signals
    /// completion, never while a segment is still running.
    fn load_next_segment(&mut self);
}

#[derive(Debug, Default)]
pub struct VirtualClock {
    ticks_elapsed: u64,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self { ticks_elapsed: 0 }
    }

    pub fn ticks_elapsed(&self) -> u64 {
        self.ticks_elapsed
    }

    /// Advance by exactly one logical DDA tick.
    pub fn step<T: Tickable>(&mut self, target: &mut T) {
        let segment_done = target.dda_tick();
        if segment_done {
            target.load_next_segment();
        }
        self.ticks_elapsed += 1;
    }

    /// Advance until `is_idle` reports true or `max_ticks` elapses,
    /// returning whether it actually went idle (vs. timing out) — used
    /// by tests to run a move to completion without an unbounded loop.
    pub fn run_until_idle<T: Tickable>(
        &mut self,
        target: &mut T,
        is_idle: impl Fn(&T) -> bool,
        max_ticks: u64,
    ) -> bool {
        for _ in 0..max_ticks {
            if is_idle(target) {
                return true;
            }
            self.step(target);
        }
        is_idle(target)
    }
}
