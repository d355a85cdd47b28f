//! Booking request state machine.
//!
//! ```text
//! pending ──hod approve──▶ approved ──(university target)──▶ vc approve ─▶ occupies
//!    │                        │                              vc reject  ─▶ terminal
//!    ├──hod reject──▶ rejected
//!    └──withdraw────▶ withdrawn
//! ```
//!
//! Every transition is a pure function from the current request to the event
//! that records it. The engine persists the event and applies it.

use ulid::Ulid;

use crate::catalog::{SlotCatalog, is_weekday, normalize_slot_id};
use crate::limits::{MAX_NAME_LEN, MAX_TEXT_LEN};
use crate::model::*;

use super::EngineError;
use super::conflict::Checks;

/// Caller-supplied fields of a new booking request.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingDraft {
    pub id: Ulid,
    pub target_resource_id: Ulid,
    pub time_slot_id: String,
    pub day: Day,
    pub course_name: String,
    pub purpose: String,
    pub expected_attendance: u32,
    pub designation: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HodDecision {
    Approve,
    Reject,
}

impl HodDecision {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "approve" | "approved" => Some(HodDecision::Approve),
            "reject" | "rejected" => Some(HodDecision::Reject),
            _ => None,
        }
    }
}

pub fn create(
    actor: &Actor,
    draft: BookingDraft,
    resource: Option<&Resource>,
    catalog: &SlotCatalog,
    now: Ms,
) -> Result<BookingRequest, EngineError> {
    if actor.role == Role::Student {
        return Err(EngineError::Forbidden("students cannot request resources".into()));
    }
    let resource = resource.ok_or(EngineError::NotFound(draft.target_resource_id))?;
    let slot_id = normalize_slot_id(draft.time_slot_id.trim()).to_string();

    Checks::new()
        .require(resource.is_active, format!("{} is archived", resource.name))
        .require(
            !resource.department().eq_ignore_ascii_case(&actor.department),
            "cannot request a resource owned by your own department",
        )
        .require(catalog.get(&slot_id).is_some(), format!("unknown time slot '{slot_id}'"))
        .require(is_weekday(draft.day), format!("day {} is not a weekday (1-5)", draft.day))
        .require(
            !(draft.course_name.trim().is_empty() && draft.purpose.trim().is_empty()),
            "course_name or purpose is required",
        )
        .max_len("course_name", &draft.course_name, MAX_NAME_LEN)
        .max_len("purpose", &draft.purpose, MAX_TEXT_LEN)
        .finish()?;

    Ok(BookingRequest {
        id: draft.id,
        requester_id: actor.id.clone(),
        requester_department: actor.department.clone(),
        requester_designation: draft.designation,
        target_resource_id: resource.id,
        target_department: resource.department().to_string(),
        time_slot_id: slot_id,
        day: draft.day,
        course_name: draft.course_name,
        purpose: draft.purpose,
        expected_attendance: draft.expected_attendance,
        request_date: now,
        status: BookingStatus::Pending,
        approved_by: None,
        response_date: None,
        notes: None,
        vc_approved: None,
    })
}

/// Who may make the first-stage decision: the target department's HOD, or
/// the principal / VC for university resources.
pub fn can_respond(actor: &Actor, request: &BookingRequest) -> bool {
    if request.requires_vc() {
        actor.role.is_university_admin()
    } else {
        actor.is_hod_of(&request.target_department)
    }
}

pub fn hod_respond(
    actor: &Actor,
    request: &BookingRequest,
    decision: HodDecision,
    notes: Option<String>,
    now: Ms,
) -> Result<Event, EngineError> {
    if request.status != BookingStatus::Pending {
        return Err(EngineError::InvalidTransition {
            id: request.id,
            state: request.state_label(),
            action: "respond to",
        });
    }
    if !can_respond(actor, request) {
        return Err(EngineError::Forbidden(format!(
            "{} cannot respond to requests for {}",
            actor.id, request.target_department
        )));
    }
    let status = match decision {
        HodDecision::Approve => BookingStatus::Approved,
        HodDecision::Reject => BookingStatus::Rejected,
    };
    Ok(Event::BookingResponded {
        id: request.id,
        resource_id: request.target_resource_id,
        status,
        approved_by: actor.id.clone(),
        response_date: now,
        notes,
    })
}

pub fn vc_respond(
    actor: &Actor,
    request: &BookingRequest,
    approve: bool,
    notes: Option<String>,
) -> Result<Event, EngineError> {
    if actor.role != Role::Vc {
        return Err(EngineError::Forbidden("only the VC can give final approval".into()));
    }
    if !request.awaiting_vc() {
        return Err(EngineError::InvalidTransition {
            id: request.id,
            state: request.state_label(),
            action: "record a VC decision on",
        });
    }
    Ok(Event::BookingVcResponded {
        id: request.id,
        resource_id: request.target_resource_id,
        vc_approved: approve,
        notes,
    })
}

pub fn withdraw(actor: &Actor, request: &BookingRequest) -> Result<Event, EngineError> {
    if request.status != BookingStatus::Pending {
        return Err(EngineError::InvalidTransition {
            id: request.id,
            state: request.state_label(),
            action: "withdraw",
        });
    }
    if actor.id != request.requester_id {
        return Err(EngineError::Forbidden("only the requester can withdraw a request".into()));
    }
    Ok(Event::BookingWithdrawn {
        id: request.id,
        resource_id: request.target_resource_id,
    })
}

pub fn delete(actor: &Actor, request: &BookingRequest) -> Result<Event, EngineError> {
    if actor.id != request.requester_id && !actor.role.is_university_admin() {
        return Err(EngineError::Forbidden("only the requester can delete a request".into()));
    }
    Ok(Event::BookingDeleted {
        id: request.id,
        resource_id: request.target_resource_id,
    })
}

/// Whether applying `event` would make its request start holding the slot.
pub fn claims_slot(request: &BookingRequest, event: &Event) -> bool {
    match event {
        Event::BookingResponded {
            status: BookingStatus::Approved,
            ..
        } => !request.requires_vc(),
        Event::BookingVcResponded { vc_approved, .. } => *vc_approved,
        _ => false,
    }
}
