use std::collections::HashMap;

use dashmap::DashMap;
use ulid::Ulid;

use crate::model::*;

/// In-memory state of one tenant. Rebuilt from the WAL on startup.
pub struct InMemoryStore {
    actors: DashMap<String, Actor>,
    resources: DashMap<Ulid, Resource>,
    courses: DashMap<Ulid, Course>,
    sessions: DashMap<Ulid, ClassSession>,
    timetables: DashMap<Ulid, Timetable>,
    entries: DashMap<Ulid, TimetableEntry>,
    bookings: DashMap<Ulid, BookingRequest>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the three occupancy sources plus course lookups.
/// Everything the resolver reads comes from one of these.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub courses: HashMap<Ulid, Course>,
    pub sessions: Vec<ClassSession>,
    pub timetables: HashMap<Ulid, Timetable>,
    pub entries: Vec<TimetableEntry>,
    pub bookings: Vec<BookingRequest>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            actors: DashMap::new(),
            resources: DashMap::new(),
            courses: DashMap::new(),
            sessions: DashMap::new(),
            timetables: DashMap::new(),
            entries: DashMap::new(),
            bookings: DashMap::new(),
        }
    }

    // ── Actors ───────────────────────────────────────────────

    pub fn actor_count(&self) -> usize {
        self.actors.len()
    }

    pub fn get_actor(&self, id: &str) -> Option<Actor> {
        self.actors.get(id).map(|e| e.value().clone())
    }

    pub fn actors(&self) -> Vec<Actor> {
        self.actors.iter().map(|e| e.value().clone()).collect()
    }

    // ── Resources ────────────────────────────────────────────

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    pub fn contains_resource(&self, id: &Ulid) -> bool {
        self.resources.contains_key(id)
    }

    pub fn get_resource(&self, id: &Ulid) -> Option<Resource> {
        self.resources.get(id).map(|e| e.value().clone())
    }

    pub fn resources(&self) -> Vec<Resource> {
        let mut all: Vec<Resource> = self.resources.iter().map(|e| e.value().clone()).collect();
        all.sort_by_key(|r| r.id);
        all
    }

    // ── Courses ──────────────────────────────────────────────

    pub fn course_count(&self) -> usize {
        self.courses.len()
    }

    pub fn get_course(&self, id: &Ulid) -> Option<Course> {
        self.courses.get(id).map(|e| e.value().clone())
    }

    pub fn courses(&self) -> Vec<Course> {
        let mut all: Vec<Course> = self.courses.iter().map(|e| e.value().clone()).collect();
        all.sort_by_key(|c| c.id);
        all
    }

    // ── Sessions ─────────────────────────────────────────────

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn contains_session(&self, id: &Ulid) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn get_session(&self, id: &Ulid) -> Option<ClassSession> {
        self.sessions.get(id).map(|e| e.value().clone())
    }

    pub fn sessions(&self) -> Vec<ClassSession> {
        let mut all: Vec<ClassSession> = self.sessions.iter().map(|e| e.value().clone()).collect();
        all.sort_by_key(|s| s.id);
        all
    }

    // ── Timetables ───────────────────────────────────────────

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn contains_timetable(&self, id: &Ulid) -> bool {
        self.timetables.contains_key(id)
    }

    pub fn contains_entry(&self, id: &Ulid) -> bool {
        self.entries.contains_key(id)
    }

    pub fn get_timetable(&self, id: &Ulid) -> Option<Timetable> {
        self.timetables.get(id).map(|e| e.value().clone())
    }

    pub fn timetables(&self) -> Vec<Timetable> {
        let mut all: Vec<Timetable> = self.timetables.iter().map(|e| e.value().clone()).collect();
        all.sort_by_key(|t| t.id);
        all
    }

    pub fn entries(&self) -> Vec<TimetableEntry> {
        let mut all: Vec<TimetableEntry> = self.entries.iter().map(|e| e.value().clone()).collect();
        all.sort_by_key(|e| e.id);
        all
    }

    pub fn entries_of(&self, timetable_id: &Ulid) -> Vec<TimetableEntry> {
        let mut of: Vec<TimetableEntry> = self
            .entries
            .iter()
            .filter(|e| e.value().timetable_id == *timetable_id)
            .map(|e| e.value().clone())
            .collect();
        of.sort_by_key(|e| e.id);
        of
    }

    // ── Bookings ─────────────────────────────────────────────

    pub fn booking_count(&self) -> usize {
        self.bookings.len()
    }

    pub fn contains_booking(&self, id: &Ulid) -> bool {
        self.bookings.contains_key(id)
    }

    pub fn get_booking(&self, id: &Ulid) -> Option<BookingRequest> {
        self.bookings.get(id).map(|e| e.value().clone())
    }

    pub fn bookings(&self) -> Vec<BookingRequest> {
        let mut all: Vec<BookingRequest> = self.bookings.iter().map(|e| e.value().clone()).collect();
        all.sort_by_key(|b| b.id);
        all
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            courses: self.courses.iter().map(|e| (*e.key(), e.value().clone())).collect(),
            sessions: self.sessions(),
            timetables: self.timetables.iter().map(|e| (*e.key(), e.value().clone())).collect(),
            entries: self.entries(),
            bookings: self.bookings(),
        }
    }

    // ── Event application ────────────────────────────────────

    pub fn apply_event(&self, event: &Event) {
        match event {
            Event::ActorRegistered { actor } => {
                self.actors.insert(actor.id.clone(), actor.clone());
            }
            Event::ResourceCreated { resource } | Event::ResourceUpdated { resource } => {
                self.resources.insert(resource.id, resource.clone());
            }
            Event::ResourceArchived { id } => {
                if let Some(mut r) = self.resources.get_mut(id) {
                    r.is_active = false;
                }
            }
            Event::CourseSaved { course } => {
                self.courses.insert(course.id, course.clone());
            }
            Event::SessionCreated { session } => {
                self.sessions.insert(session.id, session.clone());
            }
            Event::SessionDeleted { id, .. } => {
                self.sessions.remove(id);
            }
            Event::TimetablePublished { timetable, entries } => {
                self.entries.retain(|_, e| e.timetable_id != timetable.id);
                self.timetables.insert(timetable.id, timetable.clone());
                for entry in entries {
                    self.entries.insert(entry.id, entry.clone());
                }
            }
            Event::TimetableEntryAdded { entry } => {
                self.entries.insert(entry.id, entry.clone());
            }
            Event::TimetableActivation { id, is_active } => {
                if let Some(mut t) = self.timetables.get_mut(id) {
                    t.is_active = *is_active;
                }
            }
            Event::BookingRequested { request } => {
                self.bookings.insert(request.id, request.clone());
            }
            Event::BookingResponded {
                id,
                status,
                approved_by,
                response_date,
                notes,
                ..
            } => {
                if let Some(mut b) = self.bookings.get_mut(id) {
                    b.status = *status;
                    b.approved_by = Some(approved_by.clone());
                    b.response_date = Some(*response_date);
                    b.notes = notes.clone();
                }
            }
            Event::BookingVcResponded {
                id,
                vc_approved,
                notes,
                ..
            } => {
                if let Some(mut b) = self.bookings.get_mut(id) {
                    b.vc_approved = Some(*vc_approved);
                    if notes.is_some() {
                        b.notes = notes.clone();
                    }
                }
            }
            Event::BookingWithdrawn { id, .. } => {
                if let Some(mut b) = self.bookings.get_mut(id) {
                    b.status = BookingStatus::Withdrawn;
                }
            }
            Event::BookingDeleted { id, .. } => {
                self.bookings.remove(id);
            }
        }
    }

    /// Minimal event list that recreates the current state.
    pub fn compacted_events(&self) -> Vec<Event> {
        let mut events = Vec::new();
        let mut actors = self.actors();
        actors.sort_by(|a, b| a.id.cmp(&b.id));
        events.extend(actors.into_iter().map(|actor| Event::ActorRegistered { actor }));
        events.extend(
            self.resources()
                .into_iter()
                .map(|resource| Event::ResourceCreated { resource }),
        );
        events.extend(self.courses().into_iter().map(|course| Event::CourseSaved { course }));
        for timetable in self.timetables() {
            let entries = self.entries_of(&timetable.id);
            events.push(Event::TimetablePublished { timetable, entries });
        }
        events.extend(
            self.sessions()
                .into_iter()
                .map(|session| Event::SessionCreated { session }),
        );
        events.extend(
            self.bookings()
                .into_iter()
                .map(|request| Event::BookingRequested { request }),
        );
        events
    }
}
