use crate::limits::*;
use crate::model::*;

use super::EngineError;

/// Turn raw bounds into a span: `start < end`, both inside the valid window.
pub(crate) fn validate_span(start: Ms, end: Ms) -> Result<Span, EngineError> {
    if start >= end {
        return Err(EngineError::InvalidInterval);
    }
    if start < MIN_VALID_TIMESTAMP_MS || end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    let span = Span::new(start, end);
    if span.duration_ms() > MAX_SPAN_DURATION_MS {
        return Err(EngineError::LimitExceeded("span too wide"));
    }
    Ok(span)
}

pub(crate) fn check_capacity(room: &Room, requested: u32) -> Result<(), EngineError> {
    if requested > room.capacity {
        return Err(EngineError::CapacityExceeded {
            requested,
            capacity: room.capacity,
        });
    }
    Ok(())
}

/// Any ACTIVE reservation on this room sharing an instant with `span` is a conflict.
pub(crate) fn check_no_overlap(rs: &RoomState, span: &Span) -> Result<(), EngineError> {
    match rs.active_overlapping(span).next() {
        Some(existing) => Err(EngineError::SlotUnavailable(existing.id)),
        None => Ok(()),
    }
}

pub(crate) fn check_text(value: &str, max: usize, what: &'static str) -> Result<(), EngineError> {
    if value.len() > max {
        return Err(EngineError::LimitExceeded(what));
    }
    Ok(())
}

pub(crate) fn require_present(value: &str, what: &'static str) -> Result<(), EngineError> {
    if value.trim().is_empty() {
        return Err(EngineError::InvalidInput(what));
    }
    Ok(())
}
