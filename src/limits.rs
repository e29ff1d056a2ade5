use crate::model::Ms;

pub const MAX_NAME_LEN: usize = 256;
pub const MAX_TEXT_LEN: usize = 4096;
pub const MAX_EMAIL_LEN: usize = 320;

/// 2000-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
/// 2200-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 7_258_118_400_000;
/// A single reservation may not exceed 31 days.
pub const MAX_SPAN_DURATION_MS: Ms = 31 * 24 * 3_600_000;

pub const MAX_ROOM_CAPACITY: u32 = 100_000;
pub const MAX_RESERVATIONS_PER_ROOM: usize = 100_000;
pub const MAX_STUDENTS_PER_CLASS: usize = 10_000;
