use std::fmt;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds, used for request and response timestamps.
pub type Ms = i64;

/// ISO weekday number, 1 = Monday … 5 = Friday.
pub type Day = u8;

/// Department label used for resources that no department owns.
pub const UNIVERSITY: &str = "University";

/// Wall-clock time of day in minutes since midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClockTime(u16);

impl ClockTime {
    pub fn new(hour: u16, minute: u16) -> Self {
        debug_assert!(hour < 24 && minute < 60, "ClockTime out of range");
        Self(hour * 60 + minute)
    }

    /// Parse `HH:MM` or `HH:MM:SS`. Seconds are dropped, so both forms of the
    /// same minute compare equal.
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.trim().split(':');
        let hour: u16 = parts.next()?.parse().ok()?;
        let minute: u16 = parts.next()?.parse().ok()?;
        if let Some(sec) = parts.next() {
            let sec: u16 = sec.parse().ok()?;
            if sec >= 60 {
                return None;
            }
        }
        if parts.next().is_some() || hour >= 24 || minute >= 60 {
            return None;
        }
        Some(Self::new(hour, minute))
    }

    pub fn minutes(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

/// One daily time window of the slot catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub id: String,
    pub start: ClockTime,
    pub end: ClockTime,
    pub label: String,
}

impl TimeSlot {
    pub fn new(id: &str, start: ClockTime, end: ClockTime, label: &str) -> Self {
        debug_assert!(start < end, "TimeSlot start must be before end");
        Self {
            id: id.to_string(),
            start,
            end,
            label: label.to_string(),
        }
    }
}

// ── Actors ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Student,
    Faculty,
    Hod,
    Principal,
    Vc,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Faculty => "faculty",
            Role::Hod => "hod",
            Role::Principal => "principal",
            Role::Vc => "vc",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "student" => Some(Role::Student),
            "faculty" => Some(Role::Faculty),
            "hod" => Some(Role::Hod),
            "principal" => Some(Role::Principal),
            "vc" => Some(Role::Vc),
            _ => None,
        }
    }

    /// Roles that act for the university as a whole rather than a department.
    pub fn is_university_admin(&self) -> bool {
        matches!(self, Role::Principal | Role::Vc)
    }
}

/// The authenticated caller of a workflow operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub department: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: &str, department: &str, role: Role) -> Self {
        Self {
            id: id.to_string(),
            department: department.to_string(),
            role,
        }
    }

    pub fn is_hod_of(&self, department: &str) -> bool {
        self.role == Role::Hod && self.department.eq_ignore_ascii_case(department)
    }
}

// ── Resources ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceType {
    Classroom,
    Lab,
    SeminarHall,
    ConferenceRoom,
    Auditorium,
    SportsFacility,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Classroom => "classroom",
            ResourceType::Lab => "lab",
            ResourceType::SeminarHall => "seminar_hall",
            ResourceType::ConferenceRoom => "conference_room",
            ResourceType::Auditorium => "auditorium",
            ResourceType::SportsFacility => "sports_facility",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "classroom" => Some(ResourceType::Classroom),
            "lab" => Some(ResourceType::Lab),
            "seminar_hall" => Some(ResourceType::SeminarHall),
            "conference_room" => Some(ResourceType::ConferenceRoom),
            "auditorium" => Some(ResourceType::Auditorium),
            "sports_facility" => Some(ResourceType::SportsFacility),
            _ => None,
        }
    }
}

/// A bookable space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: Ulid,
    pub name: String,
    pub kind: ResourceType,
    pub capacity: u32,
    /// `None` for shared, university-wide resources.
    pub owning_department: Option<String>,
    pub building: Option<String>,
    pub floor: Option<String>,
    pub location: Option<String>,
    pub equipment: Vec<String>,
    pub facilities: Vec<String>,
    pub is_active: bool,
}

impl Resource {
    pub fn new(id: Ulid, name: &str, kind: ResourceType, capacity: u32, owning_department: Option<&str>) -> Self {
        Self {
            id,
            name: name.to_string(),
            kind,
            capacity,
            owning_department: owning_department
                .filter(|d| !d.eq_ignore_ascii_case(UNIVERSITY))
                .map(str::to_string),
            building: None,
            floor: None,
            location: None,
            equipment: Vec::new(),
            facilities: Vec::new(),
            is_active: true,
        }
    }

    pub fn is_shared(&self) -> bool {
        self.owning_department.is_none()
    }

    /// Owning department, or [`UNIVERSITY`] for shared resources.
    pub fn department(&self) -> &str {
        self.owning_department.as_deref().unwrap_or(UNIVERSITY)
    }

    pub fn is_owned_by(&self, department: &str) -> bool {
        self.owning_department
            .as_deref()
            .is_some_and(|d| d.eq_ignore_ascii_case(department))
    }
}

// ── Courses and class sessions ───────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: Ulid,
    pub name: String,
    pub department: String,
    pub expected_size: u32,
    pub weekly_hours: u32,
    pub faculty: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionType {
    Theory,
    Practical,
    Tutorial,
    Seminar,
}

impl SessionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionType::Theory => "theory",
            SessionType::Practical => "practical",
            SessionType::Tutorial => "tutorial",
            SessionType::Seminar => "seminar",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "theory" => Some(SessionType::Theory),
            "practical" => Some(SessionType::Practical),
            "tutorial" => Some(SessionType::Tutorial),
            "seminar" => Some(SessionType::Seminar),
            _ => None,
        }
    }
}

/// A recurring weekly class a department allocated on one of its own resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassSession {
    pub id: Ulid,
    pub course_id: Ulid,
    pub resource_id: Ulid,
    pub time_slot_id: String,
    pub day: Day,
    pub faculty: String,
    pub kind: SessionType,
    /// Department that made the allocation.
    pub department: String,
}

// ── Timetables ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timetable {
    pub id: Ulid,
    pub department: String,
    pub semester: String,
    pub section: String,
    pub academic_year: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimetableEntry {
    pub id: Ulid,
    pub timetable_id: Ulid,
    pub subject: String,
    pub faculty: String,
    pub resource_id: Ulid,
    pub day: Day,
    pub start: ClockTime,
    pub end: ClockTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimetableWithEntries {
    pub timetable: Timetable,
    pub entries: Vec<TimetableEntry>,
}

// ── Booking requests ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BookingStatus {
    Pending,
    Approved,
    Rejected,
    Withdrawn,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Approved => "approved",
            BookingStatus::Rejected => "rejected",
            BookingStatus::Withdrawn => "withdrawn",
        }
    }
}

/// A cross-department request for someone else's resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRequest {
    pub id: Ulid,
    pub requester_id: String,
    pub requester_department: String,
    pub requester_designation: Option<String>,
    pub target_resource_id: Ulid,
    pub target_department: String,
    pub time_slot_id: String,
    pub day: Day,
    pub course_name: String,
    pub purpose: String,
    pub expected_attendance: u32,
    pub request_date: Ms,
    pub status: BookingStatus,
    pub approved_by: Option<String>,
    pub response_date: Option<Ms>,
    pub notes: Option<String>,
    /// Second-stage decision for university resources; `None` while waiting.
    pub vc_approved: Option<bool>,
}

impl BookingRequest {
    /// University-owned targets need a VC decision after the first approval.
    pub fn requires_vc(&self) -> bool {
        self.target_department.eq_ignore_ascii_case(UNIVERSITY)
    }

    pub fn awaiting_vc(&self) -> bool {
        self.status == BookingStatus::Approved && self.requires_vc() && self.vc_approved.is_none()
    }

    /// Whether this request currently holds its slot.
    pub fn occupies_slot(&self) -> bool {
        self.status == BookingStatus::Approved && (!self.requires_vc() || self.vc_approved == Some(true))
    }

    /// Workflow state label, including the VC sub-state.
    pub fn state_label(&self) -> &'static str {
        match (self.status, self.requires_vc(), self.vc_approved) {
            (BookingStatus::Approved, true, None) => "awaiting_vc",
            (BookingStatus::Approved, true, Some(false)) => "vc_rejected",
            (status, _, _) => status.as_str(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        match self.status {
            BookingStatus::Rejected | BookingStatus::Withdrawn => true,
            BookingStatus::Approved => !self.requires_vc() || self.vc_approved.is_some(),
            BookingStatus::Pending => false,
        }
    }
}

// ── Derived occupancy view ───────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OccupancyKind {
    ClassSession,
    Timetable,
    Booking,
}

impl OccupancyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OccupancyKind::ClassSession => "class_session",
            OccupancyKind::Timetable => "timetable",
            OccupancyKind::Booking => "booking",
        }
    }
}

/// Who holds a slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occupant {
    pub kind: OccupancyKind,
    /// Id of the session, timetable entry or booking request.
    pub source_id: Ulid,
    pub course_name: String,
    pub department: String,
    pub faculty: String,
    pub class_size: Option<u32>,
}

/// One cell of the weekly grid. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyTimeSlot {
    pub resource_id: Ulid,
    pub time_slot_id: String,
    pub day: Day,
    pub occupied_by: Option<Occupant>,
}

impl WeeklyTimeSlot {
    pub fn is_occupied(&self) -> bool {
        self.occupied_by.is_some()
    }
}

/// One record per state change. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ActorRegistered {
        actor: Actor,
    },
    ResourceCreated {
        resource: Resource,
    },
    ResourceUpdated {
        resource: Resource,
    },
    ResourceArchived {
        id: Ulid,
    },
    CourseSaved {
        course: Course,
    },
    SessionCreated {
        session: ClassSession,
    },
    SessionDeleted {
        id: Ulid,
        resource_id: Ulid,
    },
    TimetablePublished {
        timetable: Timetable,
        entries: Vec<TimetableEntry>,
    },
    TimetableEntryAdded {
        entry: TimetableEntry,
    },
    TimetableActivation {
        id: Ulid,
        is_active: bool,
    },
    BookingRequested {
        request: BookingRequest,
    },
    BookingResponded {
        id: Ulid,
        resource_id: Ulid,
        status: BookingStatus,
        approved_by: String,
        response_date: Ms,
        notes: Option<String>,
    },
    BookingVcResponded {
        id: Ulid,
        resource_id: Ulid,
        vc_approved: bool,
        notes: Option<String>,
    },
    BookingWithdrawn {
        id: Ulid,
        resource_id: Ulid,
    },
    BookingDeleted {
        id: Ulid,
        resource_id: Ulid,
    },
}

impl Event {
    /// Resource whose slot grid this event can change, when it names one directly.
    pub fn resource_id(&self) -> Option<Ulid> {
        match self {
            Event::ResourceCreated { resource } | Event::ResourceUpdated { resource } => Some(resource.id),
            Event::ResourceArchived { id } => Some(*id),
            Event::SessionCreated { session } => Some(session.resource_id),
            Event::TimetableEntryAdded { entry } => Some(entry.resource_id),
            Event::BookingRequested { request } => Some(request.target_resource_id),
            Event::SessionDeleted { resource_id, .. }
            | Event::BookingResponded { resource_id, .. }
            | Event::BookingVcResponded { resource_id, .. }
            | Event::BookingWithdrawn { resource_id, .. }
            | Event::BookingDeleted { resource_id, .. } => Some(*resource_id),
            Event::ActorRegistered { .. }
            | Event::CourseSaved { .. }
            | Event::TimetablePublished { .. }
            | Event::TimetableActivation { .. } => None,
        }
    }
}
