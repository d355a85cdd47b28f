use std::fmt;

use ulid::Ulid;

use crate::catalog::{SlotCatalog, day_name, is_weekday};
use crate::model::*;

use super::EngineError;
use super::resolver::Resolver;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or(0)
}

/// Why a `(resource, slot, day)` write would be refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictReason {
    SlotOccupied(Occupant),
    FacultyBusy { faculty: String, resource_id: Ulid },
    UnknownResource(Ulid),
    ResourceInactive(Ulid),
    UnknownTimeSlot(String),
    InvalidDay(Day),
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictReason::SlotOccupied(o) => write!(
                f,
                "slot occupied by {} ({}, {})",
                o.course_name,
                o.department,
                o.kind.as_str()
            ),
            ConflictReason::FacultyBusy { faculty, .. } => write!(f, "{faculty} already scheduled at this time"),
            ConflictReason::UnknownResource(id) => write!(f, "resource {id} does not exist"),
            ConflictReason::ResourceInactive(id) => write!(f, "resource {id} is archived"),
            ConflictReason::UnknownTimeSlot(id) => write!(f, "unknown time slot '{id}'"),
            ConflictReason::InvalidDay(day) => write!(f, "day {day} is not a weekday (1-5)"),
        }
    }
}

impl ConflictReason {
    pub fn kind(&self) -> &'static str {
        match self {
            ConflictReason::SlotOccupied(_) => "slot_occupied",
            ConflictReason::FacultyBusy { .. } => "faculty_busy",
            ConflictReason::UnknownResource(_) => "unknown_resource",
            ConflictReason::ResourceInactive(_) => "resource_inactive",
            ConflictReason::UnknownTimeSlot(_) => "unknown_time_slot",
            ConflictReason::InvalidDay(_) => "invalid_day",
        }
    }
}

/// A proposed placement to validate.
#[derive(Debug, Clone, Copy)]
pub struct Placement<'a> {
    pub resource_id: Ulid,
    pub time_slot_id: &'a str,
    pub day: Day,
    /// Skip the faculty check when `None` or blank.
    pub faculty: Option<&'a str>,
}

/// Every reason the placement cannot be written. Empty means it can.
/// All checks run; none short-circuits another.
pub fn check_conflicts(
    placement: &Placement<'_>,
    resource: Option<&Resource>,
    catalog: &SlotCatalog,
    resolver: &Resolver<'_>,
) -> Vec<ConflictReason> {
    let mut reasons = Vec::new();
    let slot = catalog.get(placement.time_slot_id);

    match resource {
        None => reasons.push(ConflictReason::UnknownResource(placement.resource_id)),
        Some(r) if !r.is_active => reasons.push(ConflictReason::ResourceInactive(r.id)),
        Some(_) => {}
    }
    if slot.is_none() {
        reasons.push(ConflictReason::UnknownTimeSlot(placement.time_slot_id.to_string()));
    }
    if !is_weekday(placement.day) {
        reasons.push(ConflictReason::InvalidDay(placement.day));
    }

    if let (Some(resource), Some(slot)) = (resource, slot) {
        let occupants = resolver.all_occupants(resource, slot, placement.day, resource.department());
        reasons.extend(occupants.into_iter().map(ConflictReason::SlotOccupied));

        if let Some(faculty) = placement.faculty.map(str::trim).filter(|f| !f.is_empty()) {
            for session in resolver
                .sessions
                .faculty_elsewhere(faculty, resource.id, &slot.id, placement.day)
            {
                tracing::debug!(
                    faculty,
                    day = day_name(placement.day),
                    slot = %slot.id,
                    other = %session.resource_id,
                    "faculty double-booked"
                );
                reasons.push(ConflictReason::FacultyBusy {
                    faculty: faculty.to_string(),
                    resource_id: session.resource_id,
                });
            }
        }
    }

    for reason in &reasons {
        metrics::counter!(crate::observability::CONFLICTS_TOTAL, "reason" => reason.kind()).increment(1);
    }
    reasons
}

pub(crate) fn into_result(reasons: Vec<ConflictReason>) -> Result<(), EngineError> {
    if reasons.is_empty() {
        Ok(())
    } else {
        Err(EngineError::Conflict(reasons))
    }
}

// ── Field validation ─────────────────────────────────────────────

/// Collects human-readable validation reasons for one write.
#[derive(Debug, Default)]
pub(crate) struct Checks {
    reasons: Vec<String>,
}

impl Checks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require(&mut self, ok: bool, reason: impl Into<String>) -> &mut Self {
        if !ok {
            self.reasons.push(reason.into());
        }
        self
    }

    pub fn non_empty(&mut self, field: &str, value: &str) -> &mut Self {
        self.require(!value.trim().is_empty(), format!("{field} is required"))
    }

    pub fn max_len(&mut self, field: &str, value: &str, max: usize) -> &mut Self {
        self.require(value.len() <= max, format!("{field} longer than {max} bytes"))
    }

    pub fn finish(&mut self) -> Result<(), EngineError> {
        if self.reasons.is_empty() {
            Ok(())
        } else {
            Err(EngineError::Validation(std::mem::take(&mut self.reasons)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::store::Snapshot;

    fn room(dept: Option<&str>) -> Resource {
        Resource::new(Ulid::new(), "LH-101", ResourceType::Classroom, 60, dept)
    }

    fn session(resource_id: Ulid, slot: &str, day: Day, faculty: &str) -> ClassSession {
        ClassSession {
            id: Ulid::new(),
            course_id: Ulid::new(),
            resource_id,
            time_slot_id: slot.into(),
            day,
            faculty: faculty.into(),
            kind: SessionType::Theory,
            department: "Physics".into(),
        }
    }

    #[test]
    fn free_slot_has_no_reasons() {
        let catalog = SlotCatalog::standard();
        let r = room(Some("Physics"));
        let snapshot = Snapshot::default();
        let resolver = Resolver::new(&snapshot);
        let placement = Placement {
            resource_id: r.id,
            time_slot_id: "2",
            day: 1,
            faculty: Some("Dr. Bose"),
        };
        assert!(check_conflicts(&placement, Some(&r), &catalog, &resolver).is_empty());
    }

    #[test]
    fn faculty_busy_elsewhere() {
        let catalog = SlotCatalog::standard();
        let r1 = room(Some("Physics"));
        let r2 = room(Some("Physics"));
        let snapshot = Snapshot {
            sessions: vec![session(r1.id, "3", 2, "Dr. Bose")],
            ..Snapshot::default()
        };
        let resolver = Resolver::new(&snapshot);
        let placement = Placement {
            resource_id: r2.id,
            time_slot_id: "3",
            day: 2,
            faculty: Some("dr. bose"),
        };
        let reasons = check_conflicts(&placement, Some(&r2), &catalog, &resolver);
        assert_eq!(reasons.len(), 1);
        assert_eq!(reasons[0].to_string(), "dr. bose already scheduled at this time");
        assert_eq!(reasons[0].kind(), "faculty_busy");
    }

    #[test]
    fn occupied_and_faculty_both_reported() {
        let catalog = SlotCatalog::standard();
        let r1 = room(Some("Physics"));
        let r2 = room(Some("Physics"));
        let snapshot = Snapshot {
            sessions: vec![
                session(r1.id, "5", 4, "Dr. Bose"),
                session(r2.id, "5", 4, "Dr. Raman"),
            ],
            ..Snapshot::default()
        };
        let resolver = Resolver::new(&snapshot);
        let placement = Placement {
            resource_id: r2.id,
            time_slot_id: "5",
            day: 4,
            faculty: Some("Dr. Bose"),
        };
        let kinds: Vec<_> = check_conflicts(&placement, Some(&r2), &catalog, &resolver)
            .iter()
            .map(ConflictReason::kind)
            .collect();
        assert_eq!(kinds, vec!["slot_occupied", "faculty_busy"]);
    }

    #[test]
    fn bad_inputs_all_reported_without_panicking() {
        let catalog = SlotCatalog::standard();
        let mut r = room(None);
        r.is_active = false;
        let snapshot = Snapshot::default();
        let resolver = Resolver::new(&snapshot);
        let placement = Placement {
            resource_id: r.id,
            time_slot_id: "99",
            day: 6,
            faculty: None,
        };
        let kinds: Vec<_> = check_conflicts(&placement, Some(&r), &catalog, &resolver)
            .iter()
            .map(ConflictReason::kind)
            .collect();
        assert_eq!(kinds, vec!["resource_inactive", "unknown_time_slot", "invalid_day"]);

        let missing = Placement { time_slot_id: "1", day: 1, ..placement };
        let reasons = check_conflicts(&missing, None, &catalog, &resolver);
        assert_eq!(reasons, vec![ConflictReason::UnknownResource(r.id)]);
    }

    #[test]
    fn legacy_slot_id_is_accepted() {
        let catalog = SlotCatalog::standard();
        let r = room(None);
        let snapshot = Snapshot::default();
        let resolver = Resolver::new(&snapshot);
        let placement = Placement {
            resource_id: r.id,
            time_slot_id: "morning_2",
            day: 3,
            faculty: None,
        };
        assert!(check_conflicts(&placement, Some(&r), &catalog, &resolver).is_empty());
    }

    #[test]
    fn checks_collect_every_reason() {
        let err = Checks::new()
            .non_empty("course_name", "  ")
            .max_len("purpose", "abcdef", 3)
            .require(true, "never shown")
            .finish()
            .unwrap_err();
        assert_eq!(
            err.reasons(),
            vec!["course_name is required".to_string(), "purpose longer than 3 bytes".to_string()]
        );
    }
}
