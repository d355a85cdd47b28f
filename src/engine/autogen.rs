use std::collections::HashSet;

use ulid::Ulid;

use crate::catalog::{SlotCatalog, WEEKDAYS};
use crate::model::*;

/// Greedy first-fit placement of each course's weekly hours.
///
/// For every course the first active resource large enough is chosen, then
/// each hour takes the earliest free `(day, slot)` Monday to Friday. A cell is
/// free when `is_taken` says so and no session from this batch already sits
/// there. Hours that find no cell are dropped.
pub fn auto_generate(
    courses: &[Course],
    resources: &[Resource],
    catalog: &SlotCatalog,
    is_taken: impl Fn(&Resource, &TimeSlot, Day) -> bool,
) -> Vec<ClassSession> {
    let mut batch = Vec::new();
    let mut claimed: HashSet<(Ulid, String, Day)> = HashSet::new();

    for course in courses {
        let Some(resource) = resources
            .iter()
            .find(|r| r.is_active && r.capacity >= course.expected_size)
        else {
            tracing::debug!(course = %course.name, size = course.expected_size, "no resource large enough");
            continue;
        };

        let mut free = WEEKDAYS.iter().flat_map(|&day| catalog.slots().iter().map(move |slot| (day, slot)));
        for _ in 0..course.weekly_hours {
            let Some((day, slot)) = free.find(|(day, slot)| {
                !claimed.contains(&(resource.id, slot.id.clone(), *day)) && !is_taken(resource, slot, *day)
            }) else {
                break;
            };
            claimed.insert((resource.id, slot.id.clone(), day));
            batch.push(ClassSession {
                id: Ulid::new(),
                course_id: course.id,
                resource_id: resource.id,
                time_slot_id: slot.id.clone(),
                day,
                faculty: course.faculty.clone(),
                kind: SessionType::Theory,
                department: course.department.clone(),
            });
        }
    }
    batch
}
