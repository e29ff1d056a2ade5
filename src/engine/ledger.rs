use dashmap::mapref::entry::Entry;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::{self, RESERVATIONS_CANCELLED_TOTAL, RESERVATIONS_CREATED_TOTAL, RESERVATIONS_REJECTED_TOTAL};

use super::conflict::{check_capacity, check_no_overlap, check_text, validate_span};
use super::{Engine, EngineError};

impl Engine {
    /// Admit a reservation.
    ///
    /// Checks run in this order: room exists, `start < end`, span limits,
    /// referenced class exists, attendees within capacity, no ACTIVE overlap.
    /// Everything from the capacity check to the journal append happens under
    /// the room's write lock, so two creators racing for the same room are
    /// serialized and at most one of two overlapping requests commits.
    pub async fn create_reservation(&self, req: NewReservation) -> Result<Reservation, EngineError> {
        let result = self.admit(req).await;
        match &result {
            Ok(r) => {
                metrics::counter!(RESERVATIONS_CREATED_TOTAL).increment(1);
                tracing::info!(
                    "reservation {} admitted on room {} [{}, {})",
                    r.id,
                    r.room_id,
                    r.span.start,
                    r.span.end
                );
            }
            Err(e) => {
                metrics::counter!(RESERVATIONS_REJECTED_TOTAL, "reason" => observability::error_label(e))
                    .increment(1);
                tracing::debug!("reservation rejected: {e}");
            }
        }
        result
    }

    async fn admit(&self, req: NewReservation) -> Result<Reservation, EngineError> {
        let rs = self
            .room(&req.room_id)
            .ok_or(EngineError::NotFound(req.room_id))?;
        let span = validate_span(req.start, req.end)?;
        check_text(&req.purpose, MAX_TEXT_LEN, "purpose too long")?;

        let _commit = self.begin_commit().await;

        // Class before room: the class read lock keeps a concurrent delete from
        // detaching reservations while this one is being admitted.
        let class_handle = match req.class_id {
            Some(cid) => Some(self.class_state(&cid).ok_or(EngineError::NotFound(cid))?),
            None => None,
        };
        let _class_guard = match &class_handle {
            Some(cs) => Some(cs.read().await),
            None => None,
        };
        if let Some(cid) = req.class_id
            && !self.classes.contains_key(&cid)
        {
            return Err(EngineError::NotFound(cid));
        }

        let mut guard = rs.write().await;

        // Ids are global across rooms, so the room lock alone can't keep two
        // creators from committing the same id. Claim it first; the claim
        // is released if admission fails.
        let id = req.id;
        match self.reservation_to_room.entry(id) {
            Entry::Occupied(_) => return Err(EngineError::AlreadyExists(id)),
            Entry::Vacant(slot) => {
                slot.insert(req.room_id);
            }
        }
        let result = self.commit_claimed(&mut guard, req, span).await;
        if result.is_err() {
            self.reservation_to_room.remove(&id);
        }
        result
    }

    /// Remaining admission checks and the commit for an id already claimed
    /// in `reservation_to_room`. Caller holds the room write lock.
    async fn commit_claimed(
        &self,
        guard: &mut RoomState,
        req: NewReservation,
        span: Span,
    ) -> Result<Reservation, EngineError> {
        if guard.active_count() >= MAX_RESERVATIONS_PER_ROOM {
            return Err(EngineError::LimitExceeded("too many reservations on room"));
        }
        check_capacity(&guard.room, req.estimated_attendees)?;
        check_no_overlap(guard, &span)?;

        let event = Event::ReservationCreated {
            id: req.id,
            room_id: req.room_id,
            user_id: req.user_id,
            class_id: req.class_id,
            span,
            purpose: req.purpose,
            estimated_attendees: req.estimated_attendees,
        };
        self.persist_and_apply_room(guard, &event).await?;
        guard
            .reservation(&req.id)
            .cloned()
            .ok_or(EngineError::NotFound(req.id))
    }

    pub async fn get_reservation(&self, id: &Ulid) -> Result<Reservation, EngineError> {
        let room_id = self
            .reservation_to_room
            .get(id)
            .map(|e| *e.value())
            .ok_or(EngineError::NotFound(*id))?;
        let rs = self.room(&room_id).ok_or(EngineError::NotFound(*id))?;
        let guard = rs.read().await;
        guard.reservation(id).cloned().ok_or(EngineError::NotFound(*id))
    }

    /// Reservations matching `filter`, ordered by start time (ties by id).
    pub async fn list_reservations(&self, filter: &ReservationFilter) -> Vec<Reservation> {
        let handles: Vec<_> = match filter.room_id {
            Some(rid) => self.room(&rid).into_iter().collect(),
            None => self.rooms.iter().map(|e| e.value().clone()).collect(),
        };
        let mut out = Vec::new();
        for rs in handles {
            let guard = rs.read().await;
            out.extend(guard.reservations.iter().filter(|r| filter.matches(r)).cloned());
        }
        out.sort_by(|a, b| a.span.start.cmp(&b.span.start).then(a.id.cmp(&b.id)));
        out
    }

    /// ACTIVE → CANCELLED. Cancelling an already cancelled reservation
    /// succeeds without writing anything.
    pub async fn cancel_reservation(&self, id: Ulid) -> Result<Reservation, EngineError> {
        let _commit = self.begin_commit().await;
        let room_id = self
            .reservation_to_room
            .get(&id)
            .map(|e| *e.value())
            .ok_or(EngineError::NotFound(id))?;
        let rs = self.room(&room_id).ok_or(EngineError::NotFound(id))?;
        let mut guard = rs.write().await;
        let current = guard.reservation(&id).ok_or(EngineError::NotFound(id))?;
        if !current.is_active() {
            return Ok(current.clone());
        }

        let event = Event::ReservationCancelled { id, room_id };
        self.persist_and_apply_room(&mut guard, &event).await?;
        metrics::counter!(RESERVATIONS_CANCELLED_TOTAL).increment(1);
        tracing::info!("reservation {id} on room {room_id} cancelled");
        guard.reservation(&id).cloned().ok_or(EngineError::NotFound(id))
    }
}
