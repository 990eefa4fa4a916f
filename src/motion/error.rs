// src/motion/error.rs
use thiserror::Error;

/// The closed set of outcomes the motion core ever surfaces.
///
/// `Ok`/`Again`/`Noop`/`Complete` are normal control flow, not failures;
/// callers match on them the same way they'd match any other status code.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ReturnCode {
    #[error("ok")]
    Ok,
    #[error("try again")]
    Again,
    #[error("no work to do")]
    Noop,
    #[error("complete")]
    Complete,
    #[error("planner buffer full")]
    BufferFull,
    #[error("move is shorter than the minimum line length")]
    ZeroLengthMove,
    #[error("requested feed rate exceeds an axis maximum")]
    MaxFeedRateExceeded,
    #[error("move exceeds axis travel limits")]
    MaxTravelExceeded,
    #[error("arc start/end radius mismatch exceeds tolerance")]
    ArcSpecificationError,
    #[error("HT iteration did not converge, using best-effort velocity")]
    FailedToConverge,
    #[error("motion core error: {0}")]
    Error(&'static str),
}

impl ReturnCode {
    /// Backpressure codes never indicate a problem; §7 says they must never log.
    pub fn is_backpressure(self) -> bool {
        matches!(self, ReturnCode::Again | ReturnCode::BufferFull)
    }

    pub fn is_ok(self) -> bool {
        matches!(self, ReturnCode::Ok | ReturnCode::Complete | ReturnCode::Noop)
    }
}

pub type MotionResult<T> = Result<T, ReturnCode>;
