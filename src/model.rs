use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::limits::MAX_SPAN_DURATION_MS;

/// Unix milliseconds, UTC — the only time type.
pub type Ms = i64;

/// Normalize a timezone-aware instant to unix milliseconds.
pub fn to_ms<Tz: TimeZone>(dt: &DateTime<Tz>) -> Ms {
    dt.timestamp_millis()
}

/// Render unix milliseconds as an RFC 3339 UTC string.
pub fn to_rfc3339(ms: Ms) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_default()
}

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

// ── Actors ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Admin,
    Professor,
    Student,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Professor => "PROFESSOR",
            Role::Student => "STUDENT",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ADMIN" => Ok(Role::Admin),
            "PROFESSOR" => Ok(Role::Professor),
            "STUDENT" => Ok(Role::Student),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Ulid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub confirmed: bool,
}

// ── Catalog ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Building {
    pub id: Ulid,
    pub name: String,
    pub address: String,
    pub campus: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: Ulid,
    pub building_id: Ulid,
    pub name: String,
    /// Maximum attendees per reservation (>= 1).
    pub capacity: u32,
    /// Free-form equipment note (projector, whiteboard, ...).
    pub resources: String,
    pub description: String,
}

/// Partial room update. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomPatch {
    pub name: Option<String>,
    pub capacity: Option<u32>,
    pub resources: Option<String>,
    pub description: Option<String>,
}

// ── Rosters ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Class {
    pub id: Ulid,
    pub professor_id: Ulid,
    pub name: String,
    pub description: String,
    pub subject: String,
}

/// Partial class update. Absent or empty fields leave the value unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub subject: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ClassState {
    pub class: Class,
    pub students: BTreeSet<Ulid>,
}

impl ClassState {
    pub fn new(class: Class) -> Self {
        Self {
            class,
            students: BTreeSet::new(),
        }
    }
}

// ── Reservations ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReservationStatus {
    Active,
    Cancelled,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Active => "ACTIVE",
            ReservationStatus::Cancelled => "CANCELLED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub room_id: Ulid,
    pub user_id: Ulid,
    pub class_id: Option<Ulid>,
    pub span: Span,
    pub purpose: String,
    pub estimated_attendees: u32,
    pub status: ReservationStatus,
}

impl Reservation {
    pub fn is_active(&self) -> bool {
        self.status == ReservationStatus::Active
    }
}

/// Input to `Engine::create_reservation`. Times are raw so that an
/// inverted interval can be reported instead of panicking in `Span::new`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReservation {
    pub id: Ulid,
    pub room_id: Ulid,
    pub user_id: Ulid,
    pub class_id: Option<Ulid>,
    pub start: Ms,
    pub end: Ms,
    pub purpose: String,
    pub estimated_attendees: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReservationFilter {
    pub room_id: Option<Ulid>,
    pub user_id: Option<Ulid>,
    pub class_id: Option<Ulid>,
    pub status: Option<ReservationStatus>,
    /// Keep reservations starting at or after this instant.
    pub from: Option<Ms>,
    /// Keep reservations ending at or before this instant.
    pub to: Option<Ms>,
}

impl ReservationFilter {
    pub fn matches(&self, r: &Reservation) -> bool {
        self.room_id.is_none_or(|id| r.room_id == id)
            && self.user_id.is_none_or(|id| r.user_id == id)
            && self.class_id.is_none_or(|id| r.class_id == Some(id))
            && self.status.is_none_or(|s| r.status == s)
            && self.from.is_none_or(|from| r.span.start >= from)
            && self.to.is_none_or(|to| r.span.end <= to)
    }
}

/// A room together with its reservation book.
#[derive(Debug, Clone)]
pub struct RoomState {
    pub room: Room,
    /// All reservations (any status), sorted by `span.start`.
    pub reservations: Vec<Reservation>,
    active: usize,
}

impl RoomState {
    pub fn new(room: Room) -> Self {
        Self {
            room,
            reservations: Vec::new(),
            active: 0,
        }
    }

    /// Insert reservation maintaining sort order by span.start.
    pub fn insert_reservation(&mut self, reservation: Reservation) {
        if reservation.is_active() {
            self.active += 1;
        }
        let pos = self
            .reservations
            .partition_point(|r| r.span.start <= reservation.span.start);
        self.reservations.insert(pos, reservation);
    }

    /// ACTIVE → CANCELLED. Returns false if the reservation is unknown or
    /// already cancelled.
    pub fn cancel(&mut self, id: &Ulid) -> bool {
        match self.reservations.iter_mut().find(|r| r.id == *id) {
            Some(r) if r.is_active() => {
                r.status = ReservationStatus::Cancelled;
                self.active -= 1;
                true
            }
            _ => false,
        }
    }

    /// Number of ACTIVE reservations.
    pub fn active_count(&self) -> usize {
        self.active
    }

    pub fn reservation(&self, id: &Ulid) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == *id)
    }

    pub fn reservation_mut(&mut self, id: &Ulid) -> Option<&mut Reservation> {
        self.reservations.iter_mut().find(|r| r.id == *id)
    }

    /// Return only reservations (any status) whose span overlaps the query window.
    ///
    /// Both ends are binary searched. No reservation is longer than
    /// `MAX_SPAN_DURATION_MS`, so one starting at or before
    /// `query.start - MAX_SPAN_DURATION_MS` has ended by `query.start`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Reservation> {
        let horizon = query.start.saturating_sub(MAX_SPAN_DURATION_MS);
        let left_bound = self.reservations.partition_point(|r| r.span.start <= horizon);
        // Everything at index >= right_bound starts at or after query.end → can't overlap.
        let right_bound = self
            .reservations
            .partition_point(|r| r.span.start < query.end)
            .max(left_bound);
        self.reservations[left_bound..right_bound]
            .iter()
            .filter(move |r| r.span.end > query.start)
    }

    pub fn active_overlapping(&self, query: &Span) -> impl Iterator<Item = &Reservation> {
        self.overlapping(query).filter(|r| r.is_active())
    }
}

/// The event types — flat, no nesting. This is the journal record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    UserRegistered {
        id: Ulid,
        name: String,
        email: String,
        role: Role,
    },
    UserConfirmed {
        id: Ulid,
    },
    BuildingCreated {
        id: Ulid,
        name: String,
        address: String,
        campus: String,
    },
    RoomCreated {
        id: Ulid,
        building_id: Ulid,
        name: String,
        capacity: u32,
        resources: String,
        description: String,
    },
    RoomUpdated {
        id: Ulid,
        name: String,
        capacity: u32,
        resources: String,
        description: String,
    },
    ClassCreated {
        id: Ulid,
        professor_id: Ulid,
        name: String,
        description: String,
        subject: String,
    },
    ClassUpdated {
        id: Ulid,
        name: String,
        description: String,
        subject: String,
    },
    ClassDeleted {
        id: Ulid,
    },
    StudentEnrolled {
        class_id: Ulid,
        student_id: Ulid,
    },
    StudentUnenrolled {
        class_id: Ulid,
        student_id: Ulid,
    },
    ReservationCreated {
        id: Ulid,
        room_id: Ulid,
        user_id: Ulid,
        class_id: Option<Ulid>,
        span: Span,
        purpose: String,
        estimated_attendees: u32,
    },
    ReservationCancelled {
        id: Ulid,
        room_id: Ulid,
    },
}

// ── Query result types ───────────────────────────────────────────

/// Denormalized reservation row for public listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicReservation {
    pub id: Ulid,
    pub room_id: Ulid,
    pub room_name: String,
    pub building_id: Ulid,
    pub building_name: String,
    pub user_id: Ulid,
    pub user_name: Option<String>,
    pub user_email: Option<String>,
    pub start_time: String,
    pub end_time: String,
    pub purpose: String,
    pub estimated_attendees: u32,
    pub status: &'static str,
}
