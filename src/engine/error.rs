use ulid::Ulid;

use super::conflict::ConflictReason;

#[derive(Debug)]
pub enum EngineError {
    NotFound(Ulid),
    AlreadyExists(Ulid),
    /// Human-readable reasons the write was refused.
    Validation(Vec<String>),
    Conflict(Vec<ConflictReason>),
    InvalidTransition {
        id: Ulid,
        state: &'static str,
        action: &'static str,
    },
    Forbidden(String),
    UnknownActor(String),
    LimitExceeded(&'static str),
    WalError(String),
}

impl EngineError {
    /// Reasons a caller can show inline next to the form that caused them.
    pub fn reasons(&self) -> Vec<String> {
        match self {
            EngineError::Validation(reasons) => reasons.clone(),
            EngineError::Conflict(reasons) => reasons.iter().map(ToString::to_string).collect(),
            other => vec![other.to_string()],
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::Validation(reasons) => write!(f, "invalid request: {}", reasons.join("; ")),
            EngineError::Conflict(reasons) => {
                let text: Vec<String> = reasons.iter().map(ToString::to_string).collect();
                write!(f, "conflict: {}", text.join("; "))
            }
            EngineError::InvalidTransition { id, state, action } => {
                write!(f, "cannot {action} request {id}: request is {state}")
            }
            EngineError::Forbidden(msg) => write!(f, "forbidden: {msg}"),
            EngineError::UnknownActor(id) => write!(f, "unknown actor: {id}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
