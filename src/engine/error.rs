use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::ReservationState;

#[derive(Debug)]
pub enum EngineError {
    /// Unknown venue/sport/court/slot/client/reservation id.
    NotFound(Ulid),
    /// Malformed or oversized date range.
    InvalidRange(&'static str),
    /// Booking conflict. Carries the occupying reservation's id, or the
    /// slot's own id when the slot is deactivated and not bookable at all.
    SlotUnavailable(Ulid),
    /// Illegal lifecycle move.
    InvalidTransition { from: ReservationState },
    /// Deposit or price violates an invariant.
    InvalidAmount(&'static str),
    /// Finalize attempted before the reservation's slot date.
    TooEarly { date: NaiveDate },
    /// No applicable rate for the sport/band.
    NoRateDefined(Ulid),
    /// Lock acquisition exceeded the configured bound. No write happened.
    Timeout,
    LimitExceeded(&'static str),
    WalError(String),
}

impl EngineError {
    /// Expected business outcomes, as opposed to infrastructure failures.
    /// The presentation layer renders these as user-facing messages (4xx)
    /// and everything else as a generic failure (5xx).
    pub fn is_business(&self) -> bool {
        !matches!(
            self,
            EngineError::Timeout | EngineError::WalError(_) | EngineError::LimitExceeded(_)
        )
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::InvalidRange(msg) => write!(f, "invalid range: {msg}"),
            EngineError::SlotUnavailable(id) => {
                write!(f, "slot unavailable: occupied or deactivated ({id})")
            }
            EngineError::InvalidTransition { from } => {
                write!(f, "invalid transition from state: {from}")
            }
            EngineError::InvalidAmount(msg) => write!(f, "invalid amount: {msg}"),
            EngineError::TooEarly { date } => {
                write!(f, "cannot finalize before slot date {date}")
            }
            EngineError::NoRateDefined(sport_id) => {
                write!(f, "no rate defined for sport: {sport_id}")
            }
            EngineError::Timeout => write!(f, "operation timed out"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
