use ulid::Ulid;

use crate::model::*;

use super::{Engine, EngineError};

impl Engine {
    /// ACTIVE reservations joined with room, building and booking user,
    /// ordered by start time. A user missing from the directory leaves the
    /// user columns empty rather than dropping the row.
    pub async fn public_reservations(&self) -> Vec<PublicReservation> {
        let handles: Vec<_> = self.rooms.iter().map(|e| e.value().clone()).collect();
        let mut rows: Vec<(Span, PublicReservation)> = Vec::new();

        for rs in handles {
            let guard = rs.read().await;
            let room = &guard.room;
            let Some(building) = self.buildings.get(&room.building_id).map(|b| b.value().clone()) else {
                continue;
            };
            for r in guard.reservations.iter().filter(|r| r.is_active()) {
                let user = self.users.get(&r.user_id).map(|u| u.value().clone());
                rows.push((
                    r.span,
                    PublicReservation {
                        id: r.id,
                        room_id: room.id,
                        room_name: room.name.clone(),
                        building_id: building.id,
                        building_name: building.name.clone(),
                        user_id: r.user_id,
                        user_name: user.as_ref().map(|u| u.name.clone()),
                        user_email: user.map(|u| u.email),
                        start_time: to_rfc3339(r.span.start),
                        end_time: to_rfc3339(r.span.end),
                        purpose: r.purpose.clone(),
                        estimated_attendees: r.estimated_attendees,
                        status: r.status.as_str(),
                    },
                ));
            }
        }

        rows.sort_by(|(a, ra), (b, rb)| a.start.cmp(&b.start).then(ra.id.cmp(&rb.id)));
        rows.into_iter().map(|(_, row)| row).collect()
    }

    /// ACTIVE reservations of one room sharing any instant with `[from, to)`.
    pub async fn room_schedule(
        &self,
        room_id: &Ulid,
        from: Ms,
        to: Ms,
    ) -> Result<Vec<Reservation>, EngineError> {
        if from >= to {
            return Err(EngineError::InvalidInterval);
        }
        let rs = self.room(room_id).ok_or(EngineError::NotFound(*room_id))?;
        let guard = rs.read().await;
        Ok(guard
            .active_overlapping(&Span::new(from, to))
            .cloned()
            .collect())
    }
}
