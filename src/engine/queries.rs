use ulid::Ulid;

use crate::model::*;

use super::conflict::{ConflictReason, Placement, check_conflicts};
use super::resolver::{Resolver, project_week};
use super::workflow;
use super::{Engine, EngineError};

impl Engine {
    // ── Resources ────────────────────────────────────────────

    pub fn get_all_resources(&self) -> Vec<Resource> {
        self.store.resources()
    }

    pub fn get_resource(&self, id: &Ulid) -> Result<Resource, EngineError> {
        self.store.get_resource(id).ok_or(EngineError::NotFound(*id))
    }

    /// Resources owned by `department`. `"University"` selects the shared ones.
    pub fn get_resources_by_department(&self, department: &str) -> Vec<Resource> {
        if department.eq_ignore_ascii_case(UNIVERSITY) {
            return self.get_shared_resources();
        }
        self.store
            .resources()
            .into_iter()
            .filter(|r| r.is_owned_by(department))
            .collect()
    }

    pub fn get_shared_resources(&self) -> Vec<Resource> {
        self.store.resources().into_iter().filter(Resource::is_shared).collect()
    }

    // ── Courses and sessions ─────────────────────────────────

    pub fn get_courses(&self) -> Vec<Course> {
        self.store.courses()
    }

    pub fn get_all_sessions(&self) -> Vec<ClassSession> {
        self.store.sessions()
    }

    pub fn get_sessions_by_department(&self, department: &str) -> Vec<ClassSession> {
        self.store
            .sessions()
            .into_iter()
            .filter(|s| s.department.eq_ignore_ascii_case(department))
            .collect()
    }

    // ── Timetables ───────────────────────────────────────────

    pub fn get_timetables_by_department(&self, department: &str) -> Vec<TimetableWithEntries> {
        self.store
            .timetables()
            .into_iter()
            .filter(|t| t.department.eq_ignore_ascii_case(department))
            .map(|timetable| TimetableWithEntries {
                entries: self.store.entries_of(&timetable.id),
                timetable,
            })
            .collect()
    }

    /// Entries of every active timetable.
    pub fn get_all_timetable_entries(&self) -> Vec<TimetableEntry> {
        self.store
            .entries()
            .into_iter()
            .filter(|e| {
                self.store
                    .get_timetable(&e.timetable_id)
                    .is_some_and(|t| t.is_active)
            })
            .collect()
    }

    // ── Booking requests ─────────────────────────────────────

    pub fn get_request(&self, id: &Ulid) -> Result<BookingRequest, EngineError> {
        self.store.get_booking(id).ok_or(EngineError::NotFound(*id))
    }

    pub fn get_all_requests(&self) -> Vec<BookingRequest> {
        self.store.bookings()
    }

    pub fn get_requests_by_target_department(&self, department: &str) -> Vec<BookingRequest> {
        self.store
            .bookings()
            .into_iter()
            .filter(|b| b.target_department.eq_ignore_ascii_case(department))
            .collect()
    }

    pub fn get_requests_by_requester_department(&self, department: &str) -> Vec<BookingRequest> {
        self.store
            .bookings()
            .into_iter()
            .filter(|b| b.requester_department.eq_ignore_ascii_case(department))
            .collect()
    }

    /// Approved university requests still waiting for the VC.
    pub fn get_vc_approval_needed_requests(&self) -> Vec<BookingRequest> {
        self.store.bookings().into_iter().filter(BookingRequest::awaiting_vc).collect()
    }

    /// Pending requests this actor is allowed to decide.
    pub fn pending_queue(&self, actor: &Actor) -> Vec<BookingRequest> {
        self.store
            .bookings()
            .into_iter()
            .filter(|b| b.status == BookingStatus::Pending && workflow::can_respond(actor, b))
            .collect()
    }

    // ── Occupancy ────────────────────────────────────────────

    /// Who holds `(resource, slot, day)`, computed fresh from all three sources.
    pub fn resolve(
        &self,
        resource_id: Ulid,
        time_slot_id: &str,
        day: Day,
        viewer_department: &str,
    ) -> Result<WeeklyTimeSlot, EngineError> {
        let resource = self.get_resource(&resource_id)?;
        let slot = self
            .catalog
            .get(time_slot_id)
            .ok_or_else(|| EngineError::Validation(vec![format!("unknown time slot '{time_slot_id}'")]))?;
        let snapshot = self.store.snapshot();
        Ok(Resolver::new(&snapshot).resolve(&resource, slot, day, viewer_department))
    }

    /// Weekly grid of the given resources. Unknown ids are skipped.
    pub fn weekly_slots(&self, resource_ids: &[Ulid], viewer_department: &str) -> Vec<WeeklyTimeSlot> {
        let resources: Vec<Resource> = resource_ids
            .iter()
            .filter_map(|id| self.store.get_resource(id))
            .collect();
        project_week(&resources, &self.store.snapshot(), &self.catalog, viewer_department)
    }

    /// Weekly grid of everything a department can schedule into: its own
    /// resources and the shared ones.
    pub fn department_weekly_slots(&self, department: &str) -> Vec<WeeklyTimeSlot> {
        let resources: Vec<Resource> = self
            .store
            .resources()
            .into_iter()
            .filter(|r| r.is_shared() || r.is_owned_by(department))
            .collect();
        project_week(&resources, &self.store.snapshot(), &self.catalog, department)
    }

    pub fn check_conflicts(
        &self,
        resource_id: Ulid,
        time_slot_id: &str,
        day: Day,
        faculty: Option<&str>,
    ) -> Vec<ConflictReason> {
        let snapshot = self.store.snapshot();
        let resource = self.store.get_resource(&resource_id);
        let placement = Placement {
            resource_id,
            time_slot_id,
            day,
            faculty,
        };
        check_conflicts(&placement, resource.as_ref(), &self.catalog, &Resolver::new(&snapshot))
    }

    pub fn time_slots(&self) -> Vec<TimeSlot> {
        self.catalog.slots().to_vec()
    }
}
