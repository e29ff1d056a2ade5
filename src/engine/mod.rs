mod conflict;
mod directory;
mod error;
pub mod journal;
mod ledger;
mod queries;
mod roster;

pub use error::EngineError;
pub use journal::{EventLog, MemoryLog, WalLog};

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock, RwLockReadGuard};
use ulid::Ulid;

use crate::model::*;
use crate::wal::Wal;

pub type SharedRoomState = Arc<RwLock<RoomState>>;
pub type SharedClassState = Arc<RwLock<ClassState>>;

/// In-memory booking state rebuilt from, and committed through, an [`EventLog`].
///
/// Locking: every mutation first takes `commit_barrier` shared, then at most
/// one class lock, then room locks in ascending id order. Compaction takes
/// `commit_barrier` exclusively.
pub struct Engine {
    pub(super) users: DashMap<Ulid, User>,
    /// Lowercased email → user id.
    pub(super) emails: DashMap<String, Ulid>,
    pub(super) buildings: DashMap<Ulid, Building>,
    pub(super) rooms: DashMap<Ulid, SharedRoomState>,
    pub(super) classes: DashMap<Ulid, SharedClassState>,
    /// Reverse lookup: reservation id → room id
    pub(super) reservation_to_room: DashMap<Ulid, Ulid>,
    /// Class id → reservations that reference it.
    pub(super) class_reservations: DashMap<Ulid, HashSet<Ulid>>,
    /// Serializes directory writes (user, building and room creation).
    pub(super) directory_lock: Mutex<()>,
    commit_barrier: RwLock<()>,
    log: Arc<dyn EventLog>,
}

impl Engine {
    /// Open a file-backed engine, replaying the journal at `path`.
    /// Must be called inside a tokio runtime.
    pub fn open(path: &Path) -> std::io::Result<Self> {
        let events = Wal::replay(path)?;
        let log = Arc::new(WalLog::open(path)?);
        let engine = Self::with_log(log, &events);
        tracing::info!(
            "replayed {} journal events: {} users, {} rooms, {} classes, {} reservations",
            events.len(),
            engine.users.len(),
            engine.rooms.len(),
            engine.classes.len(),
            engine.reservation_to_room.len()
        );
        Ok(engine)
    }

    /// Engine whose journal lives only in memory.
    pub fn in_memory() -> Self {
        Self::with_log(Arc::new(MemoryLog::new()), &[])
    }

    /// Build an engine over `log`, first applying `history` in order.
    pub fn with_log(log: Arc<dyn EventLog>, history: &[Event]) -> Self {
        let engine = Self {
            users: DashMap::new(),
            emails: DashMap::new(),
            buildings: DashMap::new(),
            rooms: DashMap::new(),
            classes: DashMap::new(),
            reservation_to_room: DashMap::new(),
            class_reservations: DashMap::new(),
            directory_lock: Mutex::new(()),
            commit_barrier: RwLock::new(()),
            log,
        };
        for event in history {
            engine.replay_event(event);
        }
        engine
    }

    /// Apply one historical event. We're the sole owner of every lock here, so
    /// try_read/try_write always succeed; never block, since this may run
    /// inside an async context.
    fn replay_event(&self, event: &Event) {
        match event {
            Event::UserRegistered { .. }
            | Event::UserConfirmed { .. }
            | Event::BuildingCreated { .. }
            | Event::RoomCreated { .. }
            | Event::ClassCreated { .. } => self.apply_directory(event),
            Event::RoomUpdated { id: room_id, .. }
            | Event::ReservationCreated { room_id, .. }
            | Event::ReservationCancelled { room_id, .. } => {
                let Some(rs) = self.room(room_id) else {
                    tracing::warn!("replay: event for unknown room {room_id} skipped");
                    return;
                };
                let Ok(mut guard) = rs.try_write() else {
                    tracing::warn!("replay: room {room_id} unexpectedly locked");
                    return;
                };
                self.apply_to_room(&mut guard, event);
            }
            Event::ClassUpdated { id: class_id, .. }
            | Event::StudentEnrolled { class_id, .. }
            | Event::StudentUnenrolled { class_id, .. } => {
                let Some(cs) = self.class_state(class_id) else {
                    tracing::warn!("replay: event for unknown class {class_id} skipped");
                    return;
                };
                let Ok(mut guard) = cs.try_write() else {
                    tracing::warn!("replay: class {class_id} unexpectedly locked");
                    return;
                };
                apply_to_class(&mut guard, event);
            }
            Event::ClassDeleted { id } => {
                for (room_id, reservation_id) in self.class_reservation_refs(id) {
                    if let Some(rs) = self.room(&room_id)
                        && let Ok(mut guard) = rs.try_write()
                        && let Some(r) = guard.reservation_mut(&reservation_id)
                    {
                        r.class_id = None;
                    }
                }
                self.class_reservations.remove(id);
                self.classes.remove(id);
            }
        }
    }

    // ── Commit path ──────────────────────────────────────────────

    /// Shared side of the commit barrier. Take it before any entity lock.
    pub(super) async fn begin_commit(&self) -> RwLockReadGuard<'_, ()> {
        self.commit_barrier.read().await
    }

    /// Durably log `event`. The caller applies it to memory only on success.
    pub(super) async fn persist(&self, event: &Event) -> Result<(), EngineError> {
        self.log.append(event).await.inspect_err(|e| {
            metrics::counter!(crate::observability::STORE_FAILURES_TOTAL).increment(1);
            tracing::error!("journal append failed: {e}");
        })
    }

    /// Journal-append + apply for room-scoped events. Caller holds the room write lock.
    pub(super) async fn persist_and_apply_room(
        &self,
        rs: &mut RoomState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.persist(event).await?;
        self.apply_to_room(rs, event);
        Ok(())
    }

    /// Journal-append + apply for class-scoped events. Caller holds the class write lock.
    pub(super) async fn persist_and_apply_class(
        &self,
        cs: &mut ClassState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.persist(event).await?;
        apply_to_class(cs, event);
        Ok(())
    }

    /// Journal-append + apply for events that create top-level records.
    pub(super) async fn persist_and_apply_directory(&self, event: &Event) -> Result<(), EngineError> {
        self.persist(event).await?;
        self.apply_directory(event);
        Ok(())
    }

    fn apply_directory(&self, event: &Event) {
        match event {
            Event::UserRegistered {
                id,
                name,
                email,
                role,
            } => {
                self.emails.insert(email.to_lowercase(), *id);
                self.users.insert(
                    *id,
                    User {
                        id: *id,
                        name: name.clone(),
                        email: email.clone(),
                        role: *role,
                        confirmed: false,
                    },
                );
            }
            Event::UserConfirmed { id } => {
                if let Some(mut user) = self.users.get_mut(id) {
                    user.confirmed = true;
                }
            }
            Event::BuildingCreated {
                id,
                name,
                address,
                campus,
            } => {
                self.buildings.insert(
                    *id,
                    Building {
                        id: *id,
                        name: name.clone(),
                        address: address.clone(),
                        campus: campus.clone(),
                    },
                );
            }
            Event::RoomCreated {
                id,
                building_id,
                name,
                capacity,
                resources,
                description,
            } => {
                let room = Room {
                    id: *id,
                    building_id: *building_id,
                    name: name.clone(),
                    capacity: *capacity,
                    resources: resources.clone(),
                    description: description.clone(),
                };
                self.rooms.insert(*id, Arc::new(RwLock::new(RoomState::new(room))));
            }
            Event::ClassCreated {
                id,
                professor_id,
                name,
                description,
                subject,
            } => {
                let class = Class {
                    id: *id,
                    professor_id: *professor_id,
                    name: name.clone(),
                    description: description.clone(),
                    subject: subject.clone(),
                };
                self.classes.insert(*id, Arc::new(RwLock::new(ClassState::new(class))));
            }
            _ => {}
        }
    }

    /// Apply a room-scoped event (no locking — caller holds the lock).
    pub(super) fn apply_to_room(&self, rs: &mut RoomState, event: &Event) {
        match event {
            Event::RoomUpdated {
                name,
                capacity,
                resources,
                description,
                ..
            } => {
                rs.room.name = name.clone();
                rs.room.capacity = *capacity;
                rs.room.resources = resources.clone();
                rs.room.description = description.clone();
            }
            Event::ReservationCreated {
                id,
                room_id,
                user_id,
                class_id,
                span,
                purpose,
                estimated_attendees,
            } => {
                rs.insert_reservation(Reservation {
                    id: *id,
                    room_id: *room_id,
                    user_id: *user_id,
                    class_id: *class_id,
                    span: *span,
                    purpose: purpose.clone(),
                    estimated_attendees: *estimated_attendees,
                    status: ReservationStatus::Active,
                });
                self.reservation_to_room.insert(*id, *room_id);
                if let Some(cid) = class_id {
                    self.class_reservations.entry(*cid).or_default().insert(*id);
                }
            }
            Event::ReservationCancelled { id, .. } => {
                rs.cancel(id);
            }
            _ => {}
        }
    }

    // ── Lookups ──────────────────────────────────────────────────

    pub(super) fn room(&self, id: &Ulid) -> Option<SharedRoomState> {
        self.rooms.get(id).map(|e| e.value().clone())
    }

    pub(super) fn class_state(&self, id: &Ulid) -> Option<SharedClassState> {
        self.classes.get(id).map(|e| e.value().clone())
    }

    /// `(room_id, reservation_id)` pairs referencing a class, sorted by room.
    pub(super) fn class_reservation_refs(&self, class_id: &Ulid) -> Vec<(Ulid, Ulid)> {
        let mut refs: Vec<(Ulid, Ulid)> = self
            .class_reservations
            .get(class_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|rid| self.reservation_to_room.get(rid).map(|room| (*room, *rid)))
                    .collect()
            })
            .unwrap_or_default();
        refs.sort();
        refs
    }

    // ── Compaction ───────────────────────────────────────────────

    /// Events that recreate the current state, in dependency order.
    async fn snapshot_events(&self) -> Vec<Event> {
        let mut events = Vec::new();

        let mut users: Vec<User> = self.users.iter().map(|e| e.value().clone()).collect();
        users.sort_by_key(|u| u.id);
        for u in users {
            events.push(Event::UserRegistered {
                id: u.id,
                name: u.name,
                email: u.email,
                role: u.role,
            });
            if u.confirmed {
                events.push(Event::UserConfirmed { id: u.id });
            }
        }

        let mut buildings: Vec<Building> = self.buildings.iter().map(|e| e.value().clone()).collect();
        buildings.sort_by_key(|b| b.id);
        for b in buildings {
            events.push(Event::BuildingCreated {
                id: b.id,
                name: b.name,
                address: b.address,
                campus: b.campus,
            });
        }

        let mut classes: Vec<SharedClassState> = self.classes.iter().map(|e| e.value().clone()).collect();
        let mut class_events = Vec::new();
        for cs in classes.drain(..) {
            let guard = cs.read().await;
            class_events.push((guard.class.id, class_snapshot(&guard)));
        }
        class_events.sort_by_key(|(id, _)| *id);

        let mut room_ids: Vec<Ulid> = self.rooms.iter().map(|e| *e.key()).collect();
        room_ids.sort();
        let mut reservation_events = Vec::new();
        for id in room_ids {
            let Some(rs) = self.room(&id) else { continue };
            let guard = rs.read().await;
            let room = &guard.room;
            events.push(Event::RoomCreated {
                id: room.id,
                building_id: room.building_id,
                name: room.name.clone(),
                capacity: room.capacity,
                resources: room.resources.clone(),
                description: room.description.clone(),
            });
            for r in &guard.reservations {
                reservation_events.push(Event::ReservationCreated {
                    id: r.id,
                    room_id: r.room_id,
                    user_id: r.user_id,
                    class_id: r.class_id,
                    span: r.span,
                    purpose: r.purpose.clone(),
                    estimated_attendees: r.estimated_attendees,
                });
                if !r.is_active() {
                    reservation_events.push(Event::ReservationCancelled {
                        id: r.id,
                        room_id: r.room_id,
                    });
                }
            }
        }

        events.extend(class_events.into_iter().flat_map(|(_, evs)| evs));
        events.extend(reservation_events);
        events
    }

    /// Rewrite the journal with only the events needed to recreate the current state.
    pub async fn compact_log(&self) -> Result<(), EngineError> {
        let _barrier = self.commit_barrier.write().await;
        let events = self.snapshot_events().await;
        let count = events.len();
        self.log.compact(events).await.inspect_err(|e| {
            metrics::counter!(crate::observability::STORE_FAILURES_TOTAL).increment(1);
            tracing::error!("journal compaction failed: {e}");
        })?;
        tracing::info!("journal compacted to {count} events");
        Ok(())
    }

    pub async fn log_appends_since_compact(&self) -> u64 {
        self.log.appends_since_compact().await
    }
}

fn class_snapshot(cs: &ClassState) -> Vec<Event> {
    let c = &cs.class;
    let mut events = vec![Event::ClassCreated {
        id: c.id,
        professor_id: c.professor_id,
        name: c.name.clone(),
        description: c.description.clone(),
        subject: c.subject.clone(),
    }];
    events.extend(cs.students.iter().map(|sid| Event::StudentEnrolled {
        class_id: c.id,
        student_id: *sid,
    }));
    events
}

/// Apply a class-scoped event (no locking — caller holds the lock).
fn apply_to_class(cs: &mut ClassState, event: &Event) {
    match event {
        Event::ClassUpdated {
            name,
            description,
            subject,
            ..
        } => {
            cs.class.name = name.clone();
            cs.class.description = description.clone();
            cs.class.subject = subject.clone();
        }
        Event::StudentEnrolled { student_id, .. } => {
            cs.students.insert(*student_id);
        }
        Event::StudentUnenrolled { student_id, .. } => {
            cs.students.remove(student_id);
        }
        _ => {}
    }
}
