use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::{check_text, require_present};
use super::{Engine, EngineError};

impl Engine {
    // ── Users ────────────────────────────────────────────────────

    /// Register an unconfirmed user. Ids and (case-insensitive) emails are unique.
    pub async fn register_user(
        &self,
        id: Ulid,
        name: String,
        email: String,
        role: Role,
    ) -> Result<User, EngineError> {
        require_present(&name, "user name is required")?;
        require_present(&email, "email is required")?;
        check_text(&name, MAX_NAME_LEN, "user name too long")?;
        check_text(&email, MAX_EMAIL_LEN, "email too long")?;

        let _commit = self.begin_commit().await;
        let _directory = self.directory_lock.lock().await;
        if self.users.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        if let Some(existing) = self.emails.get(&email.to_lowercase()) {
            return Err(EngineError::AlreadyExists(*existing));
        }

        let event = Event::UserRegistered { id, name, email, role };
        self.persist_and_apply_directory(&event).await?;
        tracing::info!("registered {role} user {id}");
        self.get_user(&id)
    }

    /// Mark a user confirmed. Confirming twice is a no-op.
    pub async fn confirm_user(&self, id: Ulid) -> Result<User, EngineError> {
        let _commit = self.begin_commit().await;
        let _directory = self.directory_lock.lock().await;
        let user = self.get_user(&id)?;
        if user.confirmed {
            return Ok(user);
        }
        self.persist_and_apply_directory(&Event::UserConfirmed { id }).await?;
        tracing::info!("confirmed user {id}");
        self.get_user(&id)
    }

    pub fn get_user(&self, id: &Ulid) -> Result<User, EngineError> {
        self.users
            .get(id)
            .map(|u| u.value().clone())
            .ok_or(EngineError::NotFound(*id))
    }

    pub fn list_users(&self, role: Option<Role>, confirmed: Option<bool>) -> Vec<User> {
        let mut users: Vec<User> = self
            .users
            .iter()
            .filter(|u| role.is_none_or(|r| u.role == r))
            .filter(|u| confirmed.is_none_or(|c| u.confirmed == c))
            .map(|u| u.value().clone())
            .collect();
        users.sort_by_key(|u| u.id);
        users
    }

    // ── Buildings ────────────────────────────────────────────────

    pub async fn create_building(
        &self,
        id: Ulid,
        name: String,
        address: String,
        campus: String,
    ) -> Result<Building, EngineError> {
        require_present(&name, "building name is required")?;
        check_text(&name, MAX_NAME_LEN, "building name too long")?;
        check_text(&address, MAX_TEXT_LEN, "address too long")?;
        check_text(&campus, MAX_NAME_LEN, "campus too long")?;

        let _commit = self.begin_commit().await;
        let _directory = self.directory_lock.lock().await;
        if self.buildings.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        let event = Event::BuildingCreated {
            id,
            name,
            address,
            campus,
        };
        self.persist_and_apply_directory(&event).await?;
        self.get_building(&id)
    }

    pub fn get_building(&self, id: &Ulid) -> Result<Building, EngineError> {
        self.buildings
            .get(id)
            .map(|b| b.value().clone())
            .ok_or(EngineError::NotFound(*id))
    }

    pub fn list_buildings(&self) -> Vec<Building> {
        let mut buildings: Vec<Building> = self.buildings.iter().map(|b| b.value().clone()).collect();
        buildings.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        buildings
    }

    // ── Rooms ────────────────────────────────────────────────────

    pub async fn create_room(
        &self,
        id: Ulid,
        building_id: Ulid,
        name: String,
        capacity: u32,
        resources: String,
        description: String,
    ) -> Result<Room, EngineError> {
        require_present(&name, "room name is required")?;
        check_text(&name, MAX_NAME_LEN, "room name too long")?;
        check_text(&resources, MAX_TEXT_LEN, "resources too long")?;
        check_text(&description, MAX_TEXT_LEN, "description too long")?;
        validate_capacity(capacity)?;

        let _commit = self.begin_commit().await;
        let _directory = self.directory_lock.lock().await;
        if self.rooms.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        if !self.buildings.contains_key(&building_id) {
            return Err(EngineError::NotFound(building_id));
        }

        let event = Event::RoomCreated {
            id,
            building_id,
            name,
            capacity,
            resources,
            description,
        };
        self.persist_and_apply_directory(&event).await?;
        tracing::info!("created room {id} in building {building_id} (capacity {capacity})");
        self.get_room(&id).await
    }

    /// Partial update. A capacity change never touches existing reservations;
    /// future ones left above the new capacity are only reported.
    pub async fn update_room(&self, id: Ulid, patch: RoomPatch) -> Result<Room, EngineError> {
        if let Some(ref n) = patch.name {
            require_present(n, "room name is required")?;
            check_text(n, MAX_NAME_LEN, "room name too long")?;
        }
        if let Some(ref r) = patch.resources {
            check_text(r, MAX_TEXT_LEN, "resources too long")?;
        }
        if let Some(ref d) = patch.description {
            check_text(d, MAX_TEXT_LEN, "description too long")?;
        }
        if let Some(c) = patch.capacity {
            validate_capacity(c)?;
        }

        let _commit = self.begin_commit().await;
        let rs = self.room(&id).ok_or(EngineError::NotFound(id))?;
        let mut guard = rs.write().await;
        let current = &guard.room;
        let event = Event::RoomUpdated {
            id,
            name: patch.name.unwrap_or_else(|| current.name.clone()),
            capacity: patch.capacity.unwrap_or(current.capacity),
            resources: patch.resources.unwrap_or_else(|| current.resources.clone()),
            description: patch.description.unwrap_or_else(|| current.description.clone()),
        };
        self.persist_and_apply_room(&mut guard, &event).await?;

        let now = chrono::Utc::now().timestamp_millis();
        let capacity = guard.room.capacity;
        let over = guard
            .reservations
            .iter()
            .filter(|r| r.is_active() && r.span.end > now && r.estimated_attendees > capacity)
            .count();
        if over > 0 {
            tracing::warn!(
                "room {id} capacity lowered to {capacity}; {over} upcoming reservations exceed it and are kept"
            );
        }
        Ok(guard.room.clone())
    }

    pub async fn get_room(&self, id: &Ulid) -> Result<Room, EngineError> {
        let rs = self.room(id).ok_or(EngineError::NotFound(*id))?;
        let guard = rs.read().await;
        Ok(guard.room.clone())
    }

    pub async fn list_rooms(&self, building_id: Option<Ulid>) -> Vec<Room> {
        let handles: Vec<_> = self.rooms.iter().map(|e| e.value().clone()).collect();
        let mut rooms = Vec::with_capacity(handles.len());
        for rs in handles {
            let guard = rs.read().await;
            if building_id.is_none_or(|b| guard.room.building_id == b) {
                rooms.push(guard.room.clone());
            }
        }
        rooms.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        rooms
    }
}

fn validate_capacity(capacity: u32) -> Result<(), EngineError> {
    if capacity == 0 {
        return Err(EngineError::InvalidInput("room capacity must be at least 1"));
    }
    if capacity > MAX_ROOM_CAPACITY {
        return Err(EngineError::LimitExceeded("room capacity too large"));
    }
    Ok(())
}
