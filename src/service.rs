//! Request-facing entry points. Every mutation consults the gate before the
//! engine sees it; reads pass straight through except user profiles.

use std::sync::Arc;

use ulid::Ulid;

use crate::engine::{Engine, EngineError};
use crate::gate::{authorize, Action, Principal, Target};
use crate::model::*;
use crate::observability::AUTHZ_DENIED_TOTAL;

/// Reservation request as received from a transport. The booking user is
/// always the calling principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationRequest {
    pub id: Ulid,
    pub room_id: Ulid,
    pub class_id: Option<Ulid>,
    pub start: Ms,
    pub end: Ms,
    pub purpose: String,
    pub estimated_attendees: u32,
}

pub struct BookingService {
    engine: Arc<Engine>,
}

impl BookingService {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    fn check(&self, principal: &Principal, action: Action, target: Target) -> Result<(), EngineError> {
        if authorize(principal, action, target).is_allowed() {
            return Ok(());
        }
        metrics::counter!(AUTHZ_DENIED_TOTAL, "action" => action.as_str()).increment(1);
        tracing::debug!("denied {} for principal {}", action.as_str(), principal.id);
        Err(EngineError::Unauthorized)
    }

    /// Non-admins must not learn whether a target exists: a missing target
    /// is reported to them as a denial.
    fn conceal_missing<T>(principal: &Principal, result: Result<T, EngineError>) -> Result<T, EngineError> {
        match result {
            Err(EngineError::NotFound(_)) if principal.role != Role::Admin => {
                Err(EngineError::Unauthorized)
            }
            other => other,
        }
    }

    async fn class_target(&self, principal: &Principal, class_id: &Ulid) -> Result<Target, EngineError> {
        let class = Self::conceal_missing(principal, self.engine.get_class(class_id).await)?;
        Ok(Target::Owned {
            owner_id: class.professor_id,
        })
    }

    // ── Reservations ─────────────────────────────────────────────

    pub async fn create_reservation(
        &self,
        principal: &Principal,
        req: ReservationRequest,
    ) -> Result<Reservation, EngineError> {
        self.check(principal, Action::CreateReservation, Target::None)?;
        if let Some(cid) = req.class_id {
            let target = self.class_target(principal, &cid).await?;
            self.check(principal, Action::CreateReservation, target)?;
        }
        self.engine
            .create_reservation(NewReservation {
                id: req.id,
                room_id: req.room_id,
                user_id: principal.id,
                class_id: req.class_id,
                start: req.start,
                end: req.end,
                purpose: req.purpose,
                estimated_attendees: req.estimated_attendees,
            })
            .await
    }

    pub async fn cancel_reservation(&self, principal: &Principal, id: Ulid) -> Result<Reservation, EngineError> {
        let reservation = Self::conceal_missing(principal, self.engine.get_reservation(&id).await)?;
        let target = Target::Owned {
            owner_id: reservation.user_id,
        };
        self.check(principal, Action::CancelReservation, target)?;
        self.engine.cancel_reservation(id).await
    }

    pub async fn get_reservation(&self, id: &Ulid) -> Result<Reservation, EngineError> {
        self.engine.get_reservation(id).await
    }

    pub async fn list_reservations(&self, filter: &ReservationFilter) -> Vec<Reservation> {
        self.engine.list_reservations(filter).await
    }

    pub async fn public_reservations(&self) -> Vec<PublicReservation> {
        self.engine.public_reservations().await
    }

    pub async fn room_schedule(&self, room_id: &Ulid, from: Ms, to: Ms) -> Result<Vec<Reservation>, EngineError> {
        self.engine.room_schedule(room_id, from, to).await
    }

    // ── Classes ──────────────────────────────────────────────────

    pub async fn create_class(
        &self,
        principal: &Principal,
        id: Ulid,
        name: String,
        description: String,
        subject: String,
    ) -> Result<Class, EngineError> {
        self.check(principal, Action::CreateClass, Target::None)?;
        self.engine
            .create_class(id, name, description, subject, principal.id)
            .await
    }

    pub async fn update_class(
        &self,
        principal: &Principal,
        id: Ulid,
        patch: ClassPatch,
    ) -> Result<Class, EngineError> {
        let target = self.class_target(principal, &id).await?;
        self.check(principal, Action::UpdateClass, target)?;
        self.engine.update_class(id, patch).await
    }

    pub async fn delete_class(&self, principal: &Principal, id: Ulid) -> Result<(), EngineError> {
        let target = self.class_target(principal, &id).await?;
        self.check(principal, Action::DeleteClass, target)?;
        self.engine.delete_class(id).await
    }

    pub async fn add_student(
        &self,
        principal: &Principal,
        class_id: Ulid,
        student_id: Ulid,
    ) -> Result<(), EngineError> {
        let target = self.class_target(principal, &class_id).await?;
        self.check(principal, Action::EditRoster, target)?;
        self.engine.add_student(class_id, student_id).await
    }

    pub async fn remove_student(
        &self,
        principal: &Principal,
        class_id: Ulid,
        student_id: Ulid,
    ) -> Result<(), EngineError> {
        let target = self.class_target(principal, &class_id).await?;
        self.check(principal, Action::EditRoster, target)?;
        self.engine.remove_student(class_id, student_id).await
    }

    pub async fn get_class(&self, id: &Ulid) -> Result<Class, EngineError> {
        self.engine.get_class(id).await
    }

    pub async fn class_students(&self, class_id: &Ulid) -> Result<Vec<User>, EngineError> {
        self.engine.class_students(class_id).await
    }

    /// Admins see every class (or one professor's, when asked), professors
    /// their own, students the ones they are enrolled in.
    pub async fn list_classes(&self, principal: &Principal, professor_id: Option<Ulid>) -> Vec<Class> {
        match principal.role {
            Role::Admin => match professor_id {
                Some(pid) => self.engine.classes_for_professor(&pid).await,
                None => self.engine.list_classes().await,
            },
            Role::Professor => self.engine.classes_for_professor(&principal.id).await,
            Role::Student => self.engine.classes_for_student(&principal.id).await,
        }
    }

    // ── Users ────────────────────────────────────────────────────

    pub fn get_user(&self, principal: &Principal, id: Ulid) -> Result<User, EngineError> {
        self.check(principal, Action::ViewProfile, Target::User { id })?;
        self.engine.get_user(&id)
    }

    pub fn list_users(
        &self,
        principal: &Principal,
        role: Option<Role>,
        confirmed: Option<bool>,
    ) -> Result<Vec<User>, EngineError> {
        self.check(principal, Action::ListUsers, Target::None)?;
        Ok(self.engine.list_users(role, confirmed))
    }

    pub async fn confirm_user(&self, principal: &Principal, id: Ulid) -> Result<User, EngineError> {
        self.check(principal, Action::ConfirmUser, Target::User { id })?;
        self.engine.confirm_user(id).await
    }

    // ── Catalog ──────────────────────────────────────────────────

    pub async fn create_building(
        &self,
        principal: &Principal,
        id: Ulid,
        name: String,
        address: String,
        campus: String,
    ) -> Result<Building, EngineError> {
        self.check(principal, Action::ManageDirectory, Target::None)?;
        self.engine.create_building(id, name, address, campus).await
    }

    pub async fn create_room(
        &self,
        principal: &Principal,
        room: Room,
    ) -> Result<Room, EngineError> {
        self.check(principal, Action::ManageDirectory, Target::None)?;
        self.engine
            .create_room(
                room.id,
                room.building_id,
                room.name,
                room.capacity,
                room.resources,
                room.description,
            )
            .await
    }

    pub async fn update_room(
        &self,
        principal: &Principal,
        id: Ulid,
        patch: RoomPatch,
    ) -> Result<Room, EngineError> {
        self.check(principal, Action::ManageDirectory, Target::None)?;
        self.engine.update_room(id, patch).await
    }

    pub async fn get_room(&self, id: &Ulid) -> Result<Room, EngineError> {
        self.engine.get_room(id).await
    }

    pub async fn list_rooms(&self, building_id: Option<Ulid>) -> Vec<Room> {
        self.engine.list_rooms(building_id).await
    }

    pub fn get_building(&self, id: &Ulid) -> Result<Building, EngineError> {
        self.engine.get_building(id)
    }

    pub fn list_buildings(&self) -> Vec<Building> {
        self.engine.list_buildings()
    }
}
