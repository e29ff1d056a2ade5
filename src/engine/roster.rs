use std::sync::Arc;

use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::{check_text, require_present};
use super::{Engine, EngineError};

impl Engine {
    /// Create a class owned by `professor_id`. Ownership never changes.
    pub async fn create_class(
        &self,
        id: Ulid,
        name: String,
        description: String,
        subject: String,
        professor_id: Ulid,
    ) -> Result<Class, EngineError> {
        require_present(&name, "class name is required")?;
        require_present(&subject, "class subject is required")?;
        check_text(&name, MAX_NAME_LEN, "class name too long")?;
        check_text(&subject, MAX_NAME_LEN, "class subject too long")?;
        check_text(&description, MAX_TEXT_LEN, "class description too long")?;

        let _commit = self.begin_commit().await;
        let _directory = self.directory_lock.lock().await;
        self.get_user(&professor_id)?;
        if self.classes.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        let event = Event::ClassCreated {
            id,
            professor_id,
            name,
            description,
            subject,
        };
        self.persist_and_apply_directory(&event).await?;
        tracing::info!("class {id} created by professor {professor_id}");
        self.get_class(&id).await
    }

    pub async fn get_class(&self, id: &Ulid) -> Result<Class, EngineError> {
        let cs = self.class_state(id).ok_or(EngineError::NotFound(*id))?;
        let guard = cs.read().await;
        Ok(guard.class.clone())
    }

    /// Does `user_id` own the class?
    pub async fn is_owner(&self, class_id: &Ulid, user_id: &Ulid) -> Result<bool, EngineError> {
        Ok(self.get_class(class_id).await?.professor_id == *user_id)
    }

    /// Overwrite only the fields that are supplied and non-empty.
    pub async fn update_class(&self, id: Ulid, patch: ClassPatch) -> Result<Class, EngineError> {
        let keep = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        let name = keep(patch.name);
        let description = keep(patch.description);
        let subject = keep(patch.subject);
        if let Some(ref n) = name {
            check_text(n, MAX_NAME_LEN, "class name too long")?;
        }
        if let Some(ref s) = subject {
            check_text(s, MAX_NAME_LEN, "class subject too long")?;
        }
        if let Some(ref d) = description {
            check_text(d, MAX_TEXT_LEN, "class description too long")?;
        }

        let _commit = self.begin_commit().await;
        let cs = self.class_state(&id).ok_or(EngineError::NotFound(id))?;
        let mut guard = cs.write().await;
        if name.is_none() && description.is_none() && subject.is_none() {
            return Ok(guard.class.clone());
        }
        let current = &guard.class;
        let event = Event::ClassUpdated {
            id,
            name: name.unwrap_or_else(|| current.name.clone()),
            description: description.unwrap_or_else(|| current.description.clone()),
            subject: subject.unwrap_or_else(|| current.subject.clone()),
        };
        self.persist_and_apply_class(&mut guard, &event).await?;
        Ok(guard.class.clone())
    }

    /// Delete a class and its roster. Reservations that referenced it stay
    /// valid and simply lose their class reference.
    pub async fn delete_class(&self, id: Ulid) -> Result<(), EngineError> {
        let _commit = self.begin_commit().await;
        let cs = self.class_state(&id).ok_or(EngineError::NotFound(id))?;
        let _class_guard = cs.write().await;
        if !self.classes.contains_key(&id) {
            return Err(EngineError::NotFound(id));
        }

        // Room locks in ascending id order.
        let refs = self.class_reservation_refs(&id);
        let mut room_ids: Vec<Ulid> = refs.iter().map(|(room, _)| *room).collect();
        room_ids.dedup();
        let mut room_guards = Vec::with_capacity(room_ids.len());
        for rid in &room_ids {
            if let Some(rs) = self.room(rid) {
                room_guards.push((*rid, rs.write_owned().await));
            }
        }

        self.persist(&Event::ClassDeleted { id }).await?;

        let mut detached = 0usize;
        for (room_id, guard) in room_guards.iter_mut() {
            for (ref_room, reservation_id) in &refs {
                if *ref_room == *room_id
                    && let Some(r) = guard.reservation_mut(reservation_id)
                {
                    r.class_id = None;
                    detached += 1;
                }
            }
        }
        self.class_reservations.remove(&id);
        self.classes.remove(&id);
        tracing::info!("class {id} deleted; {detached} reservations detached");
        Ok(())
    }

    /// Enroll a confirmed student. Enrolling twice is a silent no-op.
    pub async fn add_student(&self, class_id: Ulid, student_id: Ulid) -> Result<(), EngineError> {
        let _commit = self.begin_commit().await;
        let cs = self.class_state(&class_id).ok_or(EngineError::NotFound(class_id))?;
        let student = self.get_user(&student_id)?;
        if student.role != Role::Student {
            return Err(EngineError::InvalidRole(student_id));
        }
        if !student.confirmed {
            return Err(EngineError::NotConfirmed(student_id));
        }

        let mut guard = cs.write().await;
        if guard.students.contains(&student_id) {
            return Ok(());
        }
        if guard.students.len() >= MAX_STUDENTS_PER_CLASS {
            return Err(EngineError::LimitExceeded("too many students in class"));
        }
        let event = Event::StudentEnrolled {
            class_id,
            student_id,
        };
        self.persist_and_apply_class(&mut guard, &event).await?;
        tracing::debug!("student {student_id} enrolled in class {class_id}");
        Ok(())
    }

    /// Unenroll a student. Removing a non-member succeeds without effect.
    pub async fn remove_student(&self, class_id: Ulid, student_id: Ulid) -> Result<(), EngineError> {
        let _commit = self.begin_commit().await;
        let cs = self.class_state(&class_id).ok_or(EngineError::NotFound(class_id))?;
        let mut guard = cs.write().await;
        if !guard.students.contains(&student_id) {
            return Ok(());
        }
        let event = Event::StudentUnenrolled {
            class_id,
            student_id,
        };
        self.persist_and_apply_class(&mut guard, &event).await?;
        tracing::debug!("student {student_id} removed from class {class_id}");
        Ok(())
    }

    /// Enrolled students, resolved against the directory.
    pub async fn class_students(&self, class_id: &Ulid) -> Result<Vec<User>, EngineError> {
        let cs = self.class_state(class_id).ok_or(EngineError::NotFound(*class_id))?;
        let guard = cs.read().await;
        Ok(guard
            .students
            .iter()
            .filter_map(|sid| self.users.get(sid).map(|u| u.value().clone()))
            .collect())
    }

    pub async fn list_classes(&self) -> Vec<Class> {
        self.collect_classes(|_| true).await
    }

    pub async fn classes_for_professor(&self, professor_id: &Ulid) -> Vec<Class> {
        self.collect_classes(|cs| cs.class.professor_id == *professor_id)
            .await
    }

    pub async fn classes_for_student(&self, student_id: &Ulid) -> Vec<Class> {
        self.collect_classes(|cs| cs.students.contains(student_id)).await
    }

    async fn collect_classes(&self, keep: impl Fn(&ClassState) -> bool) -> Vec<Class> {
        let handles: Vec<Arc<_>> = self.classes.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::new();
        for cs in handles {
            let guard = cs.read().await;
            if keep(&guard) {
                out.push(guard.class.clone());
            }
        }
        out.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        out
    }
}
