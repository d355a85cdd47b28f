use std::collections::HashMap;

use ulid::Ulid;

use crate::catalog::normalize_slot_id;
use crate::model::*;

/// Faculty label for bookings whose requester left no id.
pub const EXTERNAL_BOOKING: &str = "External Booking";

/// One of the three places a slot can be taken from.
pub trait OccupancySource {
    /// Who holds `(resource, slot, day)` according to this source, if anyone.
    fn find_occupant(
        &self,
        resource: &Resource,
        slot: &TimeSlot,
        day: Day,
        viewer_department: &str,
    ) -> Option<Occupant>;

    /// Every holder of the slot. Normally zero or one.
    fn occupants(&self, resource: &Resource, slot: &TimeSlot, day: Day, viewer_department: &str) -> Vec<Occupant>;
}

// ── Class sessions ───────────────────────────────────────────────

pub struct ClassSessionSource<'a> {
    sessions: &'a [ClassSession],
    courses: &'a HashMap<Ulid, Course>,
}

impl<'a> ClassSessionSource<'a> {
    pub fn new(sessions: &'a [ClassSession], courses: &'a HashMap<Ulid, Course>) -> Self {
        Self { sessions, courses }
    }

    fn matching<'s>(&'s self, resource: &'s Resource, slot: &'s TimeSlot, day: Day) -> impl Iterator<Item = &'a ClassSession> + 's {
        self.sessions
            .iter()
            .filter(move |s| s.resource_id == resource.id && s.time_slot_id == slot.id && s.day == day)
    }

    fn occupant(&self, session: &ClassSession, viewer_department: &str) -> Occupant {
        let course = self.courses.get(&session.course_id);
        let department = if session.department.is_empty() {
            viewer_department.to_string()
        } else {
            session.department.clone()
        };
        Occupant {
            kind: OccupancyKind::ClassSession,
            source_id: session.id,
            course_name: course.map_or_else(|| session.course_id.to_string(), |c| c.name.clone()),
            department,
            faculty: session.faculty.clone(),
            class_size: course.map(|c| c.expected_size),
        }
    }

    /// Sessions `faculty` teaches at `(slot, day)` anywhere except `resource_id`.
    pub fn faculty_elsewhere(&self, faculty: &str, resource_id: Ulid, slot_id: &str, day: Day) -> Vec<&'a ClassSession> {
        self.sessions
            .iter()
            .filter(|s| {
                s.resource_id != resource_id
                    && s.time_slot_id == slot_id
                    && s.day == day
                    && s.faculty.trim().eq_ignore_ascii_case(faculty.trim())
            })
            .collect()
    }
}

impl OccupancySource for ClassSessionSource<'_> {
    fn find_occupant(&self, resource: &Resource, slot: &TimeSlot, day: Day, viewer_department: &str) -> Option<Occupant> {
        self.matching(resource, slot, day)
            .next()
            .map(|s| self.occupant(s, viewer_department))
    }

    fn occupants(&self, resource: &Resource, slot: &TimeSlot, day: Day, viewer_department: &str) -> Vec<Occupant> {
        self.matching(resource, slot, day)
            .map(|s| self.occupant(s, viewer_department))
            .collect()
    }
}

// ── Timetable entries ────────────────────────────────────────────

/// Entries of active timetables. A shared resource sees every department's
/// timetable; a department-owned resource only its owner's.
pub struct TimetableSource<'a> {
    timetables: &'a HashMap<Ulid, Timetable>,
    entries: &'a [TimetableEntry],
}

impl<'a> TimetableSource<'a> {
    pub fn new(timetables: &'a HashMap<Ulid, Timetable>, entries: &'a [TimetableEntry]) -> Self {
        Self { timetables, entries }
    }

    fn matching<'s>(
        &'s self,
        resource: &'s Resource,
        slot: &'s TimeSlot,
        day: Day,
    ) -> impl Iterator<Item = (&'a TimetableEntry, &'a Timetable)> + 's {
        self.entries.iter().filter_map(move |entry| {
            if entry.resource_id != resource.id || entry.day != day || entry.start != slot.start {
                return None;
            }
            let timetable = self.timetables.get(&entry.timetable_id)?;
            if !timetable.is_active {
                return None;
            }
            let in_scope = match &resource.owning_department {
                None => true,
                Some(owner) => timetable.department.eq_ignore_ascii_case(owner),
            };
            in_scope.then_some((entry, timetable))
        })
    }

    fn occupant(entry: &TimetableEntry, timetable: &Timetable, viewer_department: &str) -> Occupant {
        let department = if timetable.department.is_empty() {
            viewer_department.to_string()
        } else {
            timetable.department.clone()
        };
        Occupant {
            kind: OccupancyKind::Timetable,
            source_id: entry.id,
            course_name: entry.subject.clone(),
            department,
            faculty: entry.faculty.clone(),
            class_size: None,
        }
    }
}

impl OccupancySource for TimetableSource<'_> {
    fn find_occupant(&self, resource: &Resource, slot: &TimeSlot, day: Day, viewer_department: &str) -> Option<Occupant> {
        self.matching(resource, slot, day)
            .next()
            .map(|(e, t)| Self::occupant(e, t, viewer_department))
    }

    fn occupants(&self, resource: &Resource, slot: &TimeSlot, day: Day, viewer_department: &str) -> Vec<Occupant> {
        self.matching(resource, slot, day)
            .map(|(e, t)| Self::occupant(e, t, viewer_department))
            .collect()
    }
}

// ── Approved booking requests ────────────────────────────────────

pub struct BookingSource<'a> {
    bookings: &'a [BookingRequest],
}

impl<'a> BookingSource<'a> {
    pub fn new(bookings: &'a [BookingRequest]) -> Self {
        Self { bookings }
    }

    fn matching<'s>(&'s self, resource: &'s Resource, slot: &'s TimeSlot, day: Day) -> impl Iterator<Item = &'a BookingRequest> + 's {
        self.bookings.iter().filter(move |b| {
            b.target_resource_id == resource.id
                && b.day == day
                && normalize_slot_id(&b.time_slot_id) == slot.id
                && b.occupies_slot()
        })
    }

    fn occupant(booking: &BookingRequest) -> Occupant {
        let course_name = if booking.purpose.trim().is_empty() {
            booking.course_name.clone()
        } else {
            booking.purpose.clone()
        };
        let faculty = if booking.requester_id.trim().is_empty() {
            EXTERNAL_BOOKING.to_string()
        } else {
            booking.requester_id.clone()
        };
        Occupant {
            kind: OccupancyKind::Booking,
            source_id: booking.id,
            course_name,
            department: booking.requester_department.clone(),
            faculty,
            class_size: Some(booking.expected_attendance),
        }
    }
}

impl OccupancySource for BookingSource<'_> {
    fn find_occupant(&self, resource: &Resource, slot: &TimeSlot, day: Day, _viewer_department: &str) -> Option<Occupant> {
        self.matching(resource, slot, day).next().map(Self::occupant)
    }

    fn occupants(&self, resource: &Resource, slot: &TimeSlot, day: Day, _viewer_department: &str) -> Vec<Occupant> {
        self.matching(resource, slot, day).map(Self::occupant).collect()
    }
}
