use crate::catalog::{SlotCatalog, WEEKDAYS};
use crate::model::*;

use super::sources::{BookingSource, ClassSessionSource, OccupancySource, TimetableSource};
use super::store::Snapshot;

/// Merges the three occupancy sources with fixed precedence:
/// class session, then timetable entry, then approved booking.
pub struct Resolver<'a> {
    pub sessions: ClassSessionSource<'a>,
    pub timetable: TimetableSource<'a>,
    pub bookings: BookingSource<'a>,
}

impl<'a> Resolver<'a> {
    pub fn new(snapshot: &'a Snapshot) -> Self {
        Self {
            sessions: ClassSessionSource::new(&snapshot.sessions, &snapshot.courses),
            timetable: TimetableSource::new(&snapshot.timetables, &snapshot.entries),
            bookings: BookingSource::new(&snapshot.bookings),
        }
    }

    /// Sources in precedence order.
    pub fn sources(&self) -> [&dyn OccupancySource; 3] {
        [&self.sessions, &self.timetable, &self.bookings]
    }

    pub fn resolve(&self, resource: &Resource, slot: &TimeSlot, day: Day, viewer_department: &str) -> WeeklyTimeSlot {
        let occupied_by = self
            .sources()
            .into_iter()
            .find_map(|source| source.find_occupant(resource, slot, day, viewer_department));
        WeeklyTimeSlot {
            resource_id: resource.id,
            time_slot_id: slot.id.clone(),
            day,
            occupied_by,
        }
    }

    /// Every occupant of the slot across all sources, in precedence order.
    pub fn all_occupants(&self, resource: &Resource, slot: &TimeSlot, day: Day, viewer_department: &str) -> Vec<Occupant> {
        self.sources()
            .into_iter()
            .flat_map(|source| source.occupants(resource, slot, day, viewer_department))
            .collect()
    }

    pub fn is_occupied(&self, resource: &Resource, slot: &TimeSlot, day: Day) -> bool {
        self.sources()
            .into_iter()
            .any(|source| source.find_occupant(resource, slot, day, resource.department()).is_some())
    }
}

/// Weekly grid for `resources`, recomputed from scratch: one cell per
/// resource × weekday × catalog slot, ordered resource, day, slot.
pub fn project_week(
    resources: &[Resource],
    snapshot: &Snapshot,
    catalog: &SlotCatalog,
    viewer_department: &str,
) -> Vec<WeeklyTimeSlot> {
    let resolver = Resolver::new(snapshot);
    let mut grid = Vec::with_capacity(resources.len() * WEEKDAYS.len() * catalog.len());
    for resource in resources {
        for day in WEEKDAYS {
            for slot in catalog.slots() {
                grid.push(resolver.resolve(resource, slot, day, viewer_department));
            }
        }
    }
    grid
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use ulid::Ulid;

    use super::*;

    fn lab() -> Resource {
        Resource::new(Ulid::new(), "CS Lab 2", ResourceType::Lab, 40, Some("CS"))
    }

    fn session(resource_id: Ulid, slot: &str, day: Day) -> ClassSession {
        ClassSession {
            id: Ulid::new(),
            course_id: Ulid::new(),
            resource_id,
            time_slot_id: slot.into(),
            day,
            faculty: "Dr. Nair".into(),
            kind: SessionType::Practical,
            department: "CS".into(),
        }
    }

    fn cs_timetable() -> Timetable {
        Timetable {
            id: Ulid::new(),
            department: "CS".into(),
            semester: "5".into(),
            section: "B".into(),
            academic_year: "2026-27".into(),
            is_active: true,
        }
    }

    fn approved_booking(resource_id: Ulid, slot: &str, day: Day) -> BookingRequest {
        BookingRequest {
            id: Ulid::new(),
            requester_id: "hod-ee".into(),
            requester_department: "EE".into(),
            requester_designation: Some("HOD".into()),
            target_resource_id: resource_id,
            target_department: "CS".into(),
            time_slot_id: slot.into(),
            day,
            course_name: "Circuits Lab".into(),
            purpose: String::new(),
            expected_attendance: 35,
            request_date: 0,
            status: BookingStatus::Approved,
            approved_by: Some("hod-cs".into()),
            response_date: Some(1),
            notes: None,
            vc_approved: None,
        }
    }

    #[test]
    fn session_beats_timetable_beats_booking() {
        let catalog = SlotCatalog::standard();
        let lab = lab();
        let slot = catalog.get("1").unwrap();
        let tt = cs_timetable();
        let mut snapshot = Snapshot {
            timetables: [(tt.id, tt.clone())].into_iter().collect(),
            entries: vec![TimetableEntry {
                id: Ulid::new(),
                timetable_id: tt.id,
                subject: "Networks".into(),
                faculty: "Dr. Pillai".into(),
                resource_id: lab.id,
                day: 1,
                start: slot.start,
                end: slot.end,
            }],
            bookings: vec![approved_booking(lab.id, "1", 1)],
            sessions: vec![session(lab.id, "1", 1)],
            courses: HashMap::new(),
        };

        let cell = Resolver::new(&snapshot).resolve(&lab, slot, 1, "CS");
        assert_eq!(cell.occupied_by.unwrap().kind, OccupancyKind::ClassSession);

        snapshot.sessions.clear();
        let cell = Resolver::new(&snapshot).resolve(&lab, slot, 1, "CS");
        assert_eq!(cell.occupied_by.unwrap().kind, OccupancyKind::Timetable);

        snapshot.entries.clear();
        let cell = Resolver::new(&snapshot).resolve(&lab, slot, 1, "CS");
        let occupant = cell.occupied_by.unwrap();
        assert_eq!(occupant.kind, OccupancyKind::Booking);
        assert_eq!(occupant.department, "EE");

        snapshot.bookings.clear();
        assert!(!Resolver::new(&snapshot).resolve(&lab, slot, 1, "CS").is_occupied());
    }

    #[test]
    fn all_occupants_reports_every_source() {
        let catalog = SlotCatalog::standard();
        let lab = lab();
        let snapshot = Snapshot {
            sessions: vec![session(lab.id, "4", 2)],
            bookings: vec![approved_booking(lab.id, "4", 2)],
            ..Snapshot::default()
        };
        let occupants = Resolver::new(&snapshot).all_occupants(&lab, catalog.get("4").unwrap(), 2, "CS");
        let kinds: Vec<_> = occupants.iter().map(|o| o.kind).collect();
        assert_eq!(kinds, vec![OccupancyKind::ClassSession, OccupancyKind::Booking]);
    }

    #[test]
    fn timetable_matches_on_start_time_with_seconds() {
        let catalog = SlotCatalog::standard();
        let lab = lab();
        let tt = cs_timetable();
        let snapshot = Snapshot {
            timetables: [(tt.id, tt.clone())].into_iter().collect(),
            entries: vec![TimetableEntry {
                id: Ulid::new(),
                timetable_id: tt.id,
                subject: "DBMS".into(),
                faculty: "Dr. Das".into(),
                resource_id: lab.id,
                day: 5,
                start: ClockTime::parse("10:00:00").unwrap(),
                end: ClockTime::parse("11:00:00").unwrap(),
            }],
            ..Snapshot::default()
        };
        let resolver = Resolver::new(&snapshot);
        assert!(resolver.resolve(&lab, catalog.get("3").unwrap(), 5, "CS").is_occupied());
        assert!(!resolver.resolve(&lab, catalog.get("4").unwrap(), 5, "CS").is_occupied());
        assert!(!resolver.resolve(&lab, catalog.get("3").unwrap(), 4, "CS").is_occupied());
    }

    #[test]
    fn projection_covers_full_week_and_is_idempotent() {
        let catalog = SlotCatalog::legacy();
        let resources = vec![lab(), lab()];
        let snapshot = Snapshot {
            sessions: vec![session(resources[1].id, "6", 5)],
            ..Snapshot::default()
        };
        let grid = project_week(&resources, &snapshot, &catalog, "CS");
        assert_eq!(grid.len(), 2 * 5 * 6);
        assert_eq!(grid.iter().filter(|c| c.is_occupied()).count(), 1);
        let last = grid.last().unwrap();
        assert_eq!((last.resource_id, last.day, last.time_slot_id.as_str()), (resources[1].id, 5, "6"));
        assert!(last.is_occupied());

        assert_eq!(project_week(&resources, &snapshot, &catalog, "CS"), grid);
    }
}
