//! Hard limits on catalog and input sizes. Violations surface as
//! `EngineError::LimitExceeded`.

pub const MAX_NAME_LEN: usize = 128;
pub const MAX_ADDRESS_LEN: usize = 256;
pub const MAX_CANCEL_REASON_LEN: usize = 256;

pub const MAX_VENUES: usize = 1_000;
pub const MAX_SPORTS: usize = 100;
pub const MAX_COURTS_PER_VENUE: usize = 200;
pub const MAX_SLOTS_PER_COURT: usize = 96;
pub const MAX_CLIENTS: usize = 1_000_000;

/// Reservation dates outside this window are rejected outright; everything
/// downstream (range expansion, period truncation) can assume sane years.
pub const MIN_RESERVATION_YEAR: i32 = 2000;
pub const MAX_RESERVATION_YEAR: i32 = 2100;
