use tokio::sync::oneshot;
use tracing::{debug, info};
use ulid::Ulid;

use crate::catalog::{is_weekday, normalize_slot_id};
use crate::limits::*;
use crate::model::*;

use super::autogen::auto_generate;
use super::conflict::{Checks, ConflictReason, Placement, check_conflicts, into_result, now_ms};
use super::resolver::Resolver;
use super::store::Snapshot;
use super::workflow::{self, BookingDraft, HodDecision};
use super::{Engine, EngineError, WalCommand};

/// Caller-supplied fields of a resource.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSpec {
    pub id: Ulid,
    pub name: String,
    pub kind: ResourceType,
    pub capacity: u32,
    /// `None` or `"University"` for shared resources.
    pub owning_department: Option<String>,
    pub building: Option<String>,
    pub floor: Option<String>,
    pub location: Option<String>,
    pub equipment: Vec<String>,
    pub facilities: Vec<String>,
}

impl ResourceSpec {
    fn into_resource(self, is_active: bool) -> Resource {
        let mut r = Resource::new(self.id, &self.name, self.kind, self.capacity, self.owning_department.as_deref());
        r.building = self.building;
        r.floor = self.floor;
        r.location = self.location;
        r.equipment = self.equipment;
        r.facilities = self.facilities;
        r.is_active = is_active;
        r
    }

    fn validate(&self) -> Result<(), EngineError> {
        Checks::new()
            .non_empty("name", &self.name)
            .max_len("name", &self.name, MAX_NAME_LEN)
            .require(self.capacity > 0, "capacity must be positive")
            .require(self.equipment.len() <= MAX_LIST_ITEMS, "too many equipment items")
            .require(self.facilities.len() <= MAX_LIST_ITEMS, "too many facilities")
            .max_len("building", self.building.as_deref().unwrap_or(""), MAX_NAME_LEN)
            .max_len("location", self.location.as_deref().unwrap_or(""), MAX_NAME_LEN)
            .finish()
    }
}

/// Caller-supplied fields of a class session. The department is taken from
/// the resource.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSpec {
    pub id: Ulid,
    pub course_id: Ulid,
    pub resource_id: Ulid,
    pub time_slot_id: String,
    pub day: Day,
    pub faculty: String,
    pub kind: SessionType,
}

/// HOD of `department`, or anyone acting for the university.
fn require_department_admin(actor: &Actor, department: &str) -> Result<(), EngineError> {
    if actor.is_hod_of(department) || actor.role.is_university_admin() {
        Ok(())
    } else {
        Err(EngineError::Forbidden(format!("{} cannot manage {department}", actor.id)))
    }
}

fn require_hod(actor: &Actor) -> Result<(), EngineError> {
    if actor.role == Role::Hod {
        Ok(())
    } else {
        Err(EngineError::Forbidden(format!("{} is not a head of department", actor.id)))
    }
}

impl Engine {
    fn conflicts(&self, snapshot: &Snapshot, placement: &Placement<'_>) -> Vec<ConflictReason> {
        let resource = self.store.get_resource(&placement.resource_id);
        let resolver = Resolver::new(snapshot);
        check_conflicts(placement, resource.as_ref(), &self.catalog, &resolver)
    }

    // ── Actors ───────────────────────────────────────────────

    /// Register or re-register an actor. Registration replaces the stored
    /// department and role. The first actor of a tenant needs no caller;
    /// after that only a university admin registers others, and nobody
    /// changes their own role or department.
    pub async fn register_actor(&self, caller: Option<&Actor>, actor: Actor) -> Result<(), EngineError> {
        Checks::new()
            .non_empty("id", &actor.id)
            .max_len("id", &actor.id, MAX_NAME_LEN)
            .non_empty("department", &actor.department)
            .max_len("department", &actor.department, MAX_NAME_LEN)
            .finish()?;
        let _w = self.write_lock.lock().await;
        if self.store.actor_count() > 0 {
            let caller = caller.and_then(|c| self.store.get_actor(&c.id)).ok_or_else(|| {
                EngineError::Forbidden(format!("{} must be registered by an administrator", actor.id))
            })?;
            if caller.id == actor.id {
                if caller.role != actor.role || !caller.department.eq_ignore_ascii_case(&actor.department) {
                    return Err(EngineError::Forbidden(format!(
                        "{} cannot change their own role or department",
                        caller.id
                    )));
                }
            } else if !caller.role.is_university_admin() {
                return Err(EngineError::Forbidden(format!("{} cannot register actors", caller.id)));
            }
        }
        if self.store.get_actor(&actor.id).is_none() && self.store.actor_count() >= MAX_ACTORS_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many actors"));
        }
        debug!(actor = %actor.id, role = actor.role.as_str(), by = ?caller.map(|c| &c.id), "register actor");
        self.persist_and_apply(Event::ActorRegistered { actor }).await
    }

    // ── Resources ────────────────────────────────────────────

    pub async fn create_resource(&self, actor: &Actor, spec: ResourceSpec) -> Result<Resource, EngineError> {
        spec.validate()?;
        let resource = spec.into_resource(true);
        require_department_admin(actor, resource.department())?;

        let _w = self.write_lock.lock().await;
        if self.store.resource_count() >= MAX_RESOURCES_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many resources"));
        }
        if self.store.contains_resource(&resource.id) {
            return Err(EngineError::AlreadyExists(resource.id));
        }
        debug!(resource = %resource.id, name = %resource.name, department = resource.department(), "create resource");
        self.persist_and_apply(Event::ResourceCreated { resource: resource.clone() })
            .await?;
        Ok(resource)
    }

    pub async fn update_resource(&self, actor: &Actor, spec: ResourceSpec) -> Result<Resource, EngineError> {
        spec.validate()?;
        let _w = self.write_lock.lock().await;
        let existing = self.store.get_resource(&spec.id).ok_or(EngineError::NotFound(spec.id))?;
        require_department_admin(actor, existing.department())?;
        let resource = spec.into_resource(existing.is_active);
        require_department_admin(actor, resource.department())?;
        if !resource.department().eq_ignore_ascii_case(existing.department()) && self.is_referenced(&resource.id) {
            return Err(EngineError::Validation(vec![format!(
                "owning_department of {} cannot change while it has allocations",
                existing.name
            )]));
        }

        self.persist_and_apply(Event::ResourceUpdated { resource: resource.clone() })
            .await?;
        Ok(resource)
    }

    /// Whether anything allocated on the resource still depends on its owner.
    /// Decided bookings that never occupied are ignored.
    fn is_referenced(&self, id: &Ulid) -> bool {
        self.store.sessions().iter().any(|s| s.resource_id == *id)
            || self.store.entries().iter().any(|e| e.resource_id == *id)
            || self
                .store
                .bookings()
                .iter()
                .any(|b| b.target_resource_id == *id && (!b.is_terminal() || b.occupies_slot()))
    }

    /// Archive: the resource stops accepting new allocations but keeps its history.
    pub async fn archive_resource(&self, actor: &Actor, id: Ulid) -> Result<(), EngineError> {
        let _w = self.write_lock.lock().await;
        let existing = self.store.get_resource(&id).ok_or(EngineError::NotFound(id))?;
        require_department_admin(actor, existing.department())?;
        if !existing.is_active {
            return Ok(());
        }
        info!(resource = %id, by = %actor.id, "archive resource");
        self.persist_and_apply(Event::ResourceArchived { id }).await
    }

    // ── Courses ──────────────────────────────────────────────

    pub async fn save_course(&self, actor: &Actor, course: Course) -> Result<(), EngineError> {
        require_department_admin(actor, &course.department)?;
        Checks::new()
            .non_empty("name", &course.name)
            .max_len("name", &course.name, MAX_NAME_LEN)
            .non_empty("department", &course.department)
            .max_len("faculty", &course.faculty, MAX_NAME_LEN)
            .require(course.weekly_hours <= 50, "weekly_hours above 50")
            .finish()?;
        let _w = self.write_lock.lock().await;
        if self.store.get_course(&course.id).is_none() && self.store.course_count() >= MAX_COURSES_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many courses"));
        }
        self.persist_and_apply(Event::CourseSaved { course }).await
    }

    // ── Class sessions ───────────────────────────────────────

    /// Validate one session against the live store and `snapshot`, without writing.
    fn prepare_session(&self, actor: &Actor, spec: SessionSpec, snapshot: &Snapshot) -> Result<ClassSession, EngineError> {
        let resource = self
            .store
            .get_resource(&spec.resource_id)
            .ok_or(EngineError::NotFound(spec.resource_id))?;
        if resource.is_shared() || !actor.is_hod_of(resource.department()) {
            return Err(EngineError::Forbidden(format!(
                "sessions on {} are allocated by its own department",
                resource.name
            )));
        }
        if !snapshot.courses.contains_key(&spec.course_id) {
            return Err(EngineError::NotFound(spec.course_id));
        }
        if self.store.contains_session(&spec.id) || snapshot.sessions.iter().any(|s| s.id == spec.id) {
            return Err(EngineError::AlreadyExists(spec.id));
        }
        Checks::new()
            .non_empty("faculty", &spec.faculty)
            .max_len("faculty", &spec.faculty, MAX_NAME_LEN)
            .finish()?;

        let time_slot_id = normalize_slot_id(spec.time_slot_id.trim()).to_string();
        let placement = Placement {
            resource_id: spec.resource_id,
            time_slot_id: &time_slot_id,
            day: spec.day,
            faculty: Some(&spec.faculty),
        };
        into_result(self.conflicts(snapshot, &placement))?;

        Ok(ClassSession {
            id: spec.id,
            course_id: spec.course_id,
            resource_id: spec.resource_id,
            time_slot_id,
            day: spec.day,
            faculty: spec.faculty,
            kind: spec.kind,
            department: resource.department().to_string(),
        })
    }

    pub async fn create_session(&self, actor: &Actor, spec: SessionSpec) -> Result<ClassSession, EngineError> {
        let _w = self.write_lock.lock().await;
        if self.store.session_count() >= MAX_SESSIONS_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many class sessions"));
        }
        let session = self.prepare_session(actor, spec, &self.store.snapshot())?;
        debug!(session = %session.id, resource = %session.resource_id, slot = %session.time_slot_id, day = session.day, "create session");
        self.persist_and_apply(Event::SessionCreated { session: session.clone() })
            .await?;
        Ok(session)
    }

    /// All-or-nothing: every session is checked against the store and against
    /// the sessions before it in the batch before anything is written.
    pub async fn create_bulk_sessions(&self, actor: &Actor, specs: Vec<SessionSpec>) -> Result<Vec<ClassSession>, EngineError> {
        if specs.len() > MAX_BATCH_SIZE {
            return Err(EngineError::LimitExceeded("batch too large"));
        }
        let _w = self.write_lock.lock().await;
        if self.store.session_count() + specs.len() > MAX_SESSIONS_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many class sessions"));
        }

        let mut snapshot = self.store.snapshot();
        let mut created = Vec::with_capacity(specs.len());
        for spec in specs {
            let session = self.prepare_session(actor, spec, &snapshot)?;
            snapshot.sessions.push(session.clone());
            created.push(session);
        }

        debug!(count = created.len(), by = %actor.id, "create bulk sessions");
        for session in &created {
            self.persist_and_apply(Event::SessionCreated { session: session.clone() })
                .await?;
        }
        Ok(created)
    }

    pub async fn delete_session(&self, actor: &Actor, id: Ulid) -> Result<(), EngineError> {
        let _w = self.write_lock.lock().await;
        let session = self.store.get_session(&id).ok_or(EngineError::NotFound(id))?;
        if !actor.is_hod_of(&session.department) {
            return Err(EngineError::Forbidden(format!("{} cannot delete sessions of {}", actor.id, session.department)));
        }
        self.persist_and_apply(Event::SessionDeleted {
            id,
            resource_id: session.resource_id,
        })
        .await
    }

    /// Delete every session the actor's department allocated. Returns how many.
    pub async fn delete_all_sessions(&self, actor: &Actor) -> Result<usize, EngineError> {
        require_hod(actor)?;
        let _w = self.write_lock.lock().await;
        let doomed: Vec<ClassSession> = self
            .store
            .sessions()
            .into_iter()
            .filter(|s| s.department.eq_ignore_ascii_case(&actor.department))
            .collect();
        info!(department = %actor.department, count = doomed.len(), "delete all sessions");
        for session in &doomed {
            self.persist_and_apply(Event::SessionDeleted {
                id: session.id,
                resource_id: session.resource_id,
            })
            .await?;
        }
        Ok(doomed.len())
    }

    /// Greedy fill of the actor's department courses into its own active
    /// resources. Returns the sessions created; hours that did not fit are dropped.
    pub async fn auto_generate(&self, actor: &Actor) -> Result<Vec<ClassSession>, EngineError> {
        require_hod(actor)?;
        let _w = self.write_lock.lock().await;
        let courses: Vec<Course> = self
            .store
            .courses()
            .into_iter()
            .filter(|c| c.department.eq_ignore_ascii_case(&actor.department))
            .collect();
        let resources: Vec<Resource> = self
            .store
            .resources()
            .into_iter()
            .filter(|r| r.is_active && r.is_owned_by(&actor.department))
            .collect();

        let snapshot = self.store.snapshot();
        let resolver = Resolver::new(&snapshot);
        let generated = auto_generate(&courses, &resources, &self.catalog, |resource, slot, day| {
            resolver.is_occupied(resource, slot, day)
        });
        if self.store.session_count() + generated.len() > MAX_SESSIONS_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many class sessions"));
        }

        let wanted: u32 = courses.iter().map(|c| c.weekly_hours).sum();
        info!(
            department = %actor.department,
            courses = courses.len(),
            placed = generated.len(),
            dropped = (wanted as usize).saturating_sub(generated.len()),
            "auto-generate"
        );
        for session in &generated {
            self.persist_and_apply(Event::SessionCreated { session: session.clone() })
                .await?;
        }
        Ok(generated)
    }

    // ── Timetables ───────────────────────────────────────────

    fn validate_entries(&self, timetable_id: Ulid, entries: &[TimetableEntry]) -> Result<(), EngineError> {
        let mut checks = Checks::new();
        for entry in entries {
            checks
                .require(entry.timetable_id == timetable_id, format!("entry {} belongs to another timetable", entry.id))
                .require(entry.start < entry.end, format!("entry {} ends before it starts", entry.id))
                .require(is_weekday(entry.day), format!("entry {} day {} is not a weekday (1-5)", entry.id, entry.day))
                .require(
                    self.store.contains_resource(&entry.resource_id),
                    format!("entry {} names unknown resource {}", entry.id, entry.resource_id),
                )
                .max_len("subject", &entry.subject, MAX_NAME_LEN)
                .max_len("faculty", &entry.faculty, MAX_NAME_LEN);
        }
        checks.finish()
    }

    /// Refuse `entries` of `timetable` that would land on an occupied cell.
    /// An entry occupies only while its timetable is active, its start time
    /// opens a catalog slot and the resource is in the timetable's scope.
    /// With `replacing`, the timetable's stored entries are left out of the
    /// check. Each entry is checked against the ones before it.
    fn check_entries(&self, timetable: &Timetable, entries: &[TimetableEntry], replacing: bool) -> Result<(), EngineError> {
        if !timetable.is_active {
            return Ok(());
        }
        let mut snapshot = self.store.snapshot();
        if replacing {
            snapshot.entries.retain(|e| e.timetable_id != timetable.id);
        }
        snapshot.timetables.insert(timetable.id, timetable.clone());

        let mut reasons = Vec::new();
        for entry in entries {
            let Some(slot) = self.catalog.starting_at(entry.start) else {
                continue;
            };
            let in_scope = self.store.get_resource(&entry.resource_id).is_some_and(|r| {
                r.owning_department
                    .as_deref()
                    .is_none_or(|owner| owner.eq_ignore_ascii_case(&timetable.department))
            });
            if in_scope {
                let placement = Placement {
                    resource_id: entry.resource_id,
                    time_slot_id: &slot.id,
                    day: entry.day,
                    faculty: Some(&entry.faculty),
                };
                reasons.extend(self.conflicts(&snapshot, &placement));
            }
            snapshot.entries.push(entry.clone());
        }
        into_result(reasons)
    }

    /// Publish (or republish) a timetable, replacing its entries.
    pub async fn publish_timetable(
        &self,
        actor: &Actor,
        timetable: Timetable,
        entries: Vec<TimetableEntry>,
    ) -> Result<(), EngineError> {
        require_department_admin(actor, &timetable.department)?;
        let _w = self.write_lock.lock().await;
        self.validate_entries(timetable.id, &entries)?;
        let replaced = self.store.entries_of(&timetable.id).len();
        if self.store.entry_count() - replaced + entries.len() > MAX_TIMETABLE_ENTRIES_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many timetable entries"));
        }
        self.check_entries(&timetable, &entries, true)?;
        info!(timetable = %timetable.id, department = %timetable.department, entries = entries.len(), "publish timetable");
        self.persist_and_apply(Event::TimetablePublished { timetable, entries }).await
    }

    pub async fn add_timetable_entry(&self, actor: &Actor, entry: TimetableEntry) -> Result<(), EngineError> {
        let _w = self.write_lock.lock().await;
        let timetable = self
            .store
            .get_timetable(&entry.timetable_id)
            .ok_or(EngineError::NotFound(entry.timetable_id))?;
        require_department_admin(actor, &timetable.department)?;
        if self.store.contains_entry(&entry.id) {
            return Err(EngineError::AlreadyExists(entry.id));
        }
        if self.store.entry_count() >= MAX_TIMETABLE_ENTRIES_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many timetable entries"));
        }
        self.validate_entries(timetable.id, std::slice::from_ref(&entry))?;
        self.check_entries(&timetable, std::slice::from_ref(&entry), false)?;
        self.persist_and_apply(Event::TimetableEntryAdded { entry }).await
    }

    /// Activating re-checks every entry, since the cells may have been taken
    /// while the timetable was off.
    pub async fn set_timetable_active(&self, actor: &Actor, id: Ulid, is_active: bool) -> Result<(), EngineError> {
        let _w = self.write_lock.lock().await;
        let mut timetable = self.store.get_timetable(&id).ok_or(EngineError::NotFound(id))?;
        require_department_admin(actor, &timetable.department)?;
        if is_active && !timetable.is_active {
            timetable.is_active = true;
            self.check_entries(&timetable, &self.store.entries_of(&id), true)?;
        }
        debug!(timetable = %id, is_active, "timetable activation");
        self.persist_and_apply(Event::TimetableActivation { id, is_active }).await
    }

    // ── Booking requests ─────────────────────────────────────

    pub async fn create_request(&self, actor: &Actor, draft: BookingDraft) -> Result<BookingRequest, EngineError> {
        let _w = self.write_lock.lock().await;
        if self.store.booking_count() >= MAX_BOOKINGS_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many booking requests"));
        }
        if self.store.contains_booking(&draft.id) {
            return Err(EngineError::AlreadyExists(draft.id));
        }
        let resource = self.store.get_resource(&draft.target_resource_id);
        let request = workflow::create(actor, draft, resource.as_ref(), &self.catalog, now_ms())?;

        let placement = Placement {
            resource_id: request.target_resource_id,
            time_slot_id: &request.time_slot_id,
            day: request.day,
            faculty: None,
        };
        into_result(self.conflicts(&self.store.snapshot(), &placement))?;

        info!(
            request = %request.id,
            requester = %request.requester_id,
            target = %request.target_department,
            slot = %request.time_slot_id,
            day = request.day,
            "booking requested"
        );
        self.persist_and_apply(Event::BookingRequested { request: request.clone() })
            .await?;
        Ok(request)
    }

    /// Persist a workflow event, re-checking occupancy first when the event
    /// would make the request hold its slot.
    async fn apply_transition(&self, request: &BookingRequest, event: Event) -> Result<BookingRequest, EngineError> {
        if workflow::claims_slot(request, &event) {
            let placement = Placement {
                resource_id: request.target_resource_id,
                time_slot_id: normalize_slot_id(&request.time_slot_id),
                day: request.day,
                faculty: None,
            };
            into_result(self.conflicts(&self.store.snapshot(), &placement))?;
        }
        self.persist_and_apply(event).await?;
        self.store.get_booking(&request.id).ok_or(EngineError::NotFound(request.id))
    }

    /// First-stage decision by the target department's HOD (or the
    /// principal / VC for university resources).
    pub async fn hod_respond(
        &self,
        actor: &Actor,
        id: Ulid,
        decision: HodDecision,
        notes: Option<String>,
    ) -> Result<BookingRequest, EngineError> {
        Checks::new()
            .max_len("notes", notes.as_deref().unwrap_or(""), MAX_TEXT_LEN)
            .finish()?;
        let _w = self.write_lock.lock().await;
        let request = self.store.get_booking(&id).ok_or(EngineError::NotFound(id))?;
        let event = workflow::hod_respond(actor, &request, decision, notes, now_ms())?;
        let updated = self.apply_transition(&request, event).await?;
        info!(request = %id, by = %actor.id, state = updated.state_label(), "booking responded");
        Ok(updated)
    }

    pub async fn vc_respond(
        &self,
        actor: &Actor,
        id: Ulid,
        approve: bool,
        notes: Option<String>,
    ) -> Result<BookingRequest, EngineError> {
        Checks::new()
            .max_len("notes", notes.as_deref().unwrap_or(""), MAX_TEXT_LEN)
            .finish()?;
        let _w = self.write_lock.lock().await;
        let request = self.store.get_booking(&id).ok_or(EngineError::NotFound(id))?;
        let event = workflow::vc_respond(actor, &request, approve, notes)?;
        let updated = self.apply_transition(&request, event).await?;
        info!(request = %id, approve, "VC decision recorded");
        Ok(updated)
    }

    pub async fn withdraw_request(&self, actor: &Actor, id: Ulid) -> Result<BookingRequest, EngineError> {
        let _w = self.write_lock.lock().await;
        let request = self.store.get_booking(&id).ok_or(EngineError::NotFound(id))?;
        let event = workflow::withdraw(actor, &request)?;
        debug!(request = %id, "booking withdrawn");
        self.apply_transition(&request, event).await
    }

    pub async fn delete_request(&self, actor: &Actor, id: Ulid) -> Result<(), EngineError> {
        let _w = self.write_lock.lock().await;
        let request = self.store.get_booking(&id).ok_or(EngineError::NotFound(id))?;
        let event = workflow::delete(actor, &request)?;
        debug!(request = %id, by = %actor.id, "booking deleted");
        self.persist_and_apply(event).await
    }

    // ── WAL maintenance ──────────────────────────────────────

    /// Rewrite the WAL as the minimal event list for the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _w = self.write_lock.lock().await;
        let events = self.store.compacted_events();
        let count = events.len();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        debug!(events = count, "WAL compacted");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
