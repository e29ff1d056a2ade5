use ulid::Ulid;

#[derive(Debug)]
pub enum EngineError {
    NotFound(Ulid),
    AlreadyExists(Ulid),
    /// `start >= end`.
    InvalidInterval,
    CapacityExceeded {
        requested: u32,
        capacity: u32,
    },
    /// Overlaps the given active reservation.
    SlotUnavailable(Ulid),
    InvalidRole(Ulid),
    NotConfirmed(Ulid),
    Unauthorized,
    InvalidInput(&'static str),
    LimitExceeded(&'static str),
    StoreFailure(String),
}

impl EngineError {
    /// Only infrastructure failures are worth retrying; everything else is a
    /// rejected intent and will be rejected again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::StoreFailure(_))
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::InvalidInterval => write!(f, "invalid interval: start must be before end"),
            EngineError::CapacityExceeded { requested, capacity } => {
                write!(f, "{requested} attendees exceed room capacity {capacity}")
            }
            EngineError::SlotUnavailable(id) => {
                write!(f, "time slot not available: overlaps reservation {id}")
            }
            EngineError::InvalidRole(id) => write!(f, "user {id} is not a student"),
            EngineError::NotConfirmed(id) => write!(f, "user {id} is not confirmed"),
            EngineError::Unauthorized => write!(f, "not authorized"),
            EngineError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::StoreFailure(e) => write!(f, "store failure: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
