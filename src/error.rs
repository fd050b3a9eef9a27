use serde::Serialize;
use thiserror::Error;

use crate::core::{AlertId, AlertStatus, Transition};

/// A single rule a detection payload broke.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    /// Path of the offending field, e.g. `items[2].quantity`.
    pub field: String,
    pub message: String,
}

impl Violation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Every violation found in a detection payload, not just the first.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid detection report: {}", join(.violations))]
pub struct ValidationError {
    pub violations: Vec<Violation>,
}

fn join(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("alert not found: {0}")]
    AlertNotFound(AlertId),

    #[error("staff member not found: {0}")]
    StaffNotFound(String),

    #[error("staff member inactive: {0}")]
    StaffInactive(String),

    #[error("invalid transition: cannot {attempted} alert {id} while {current}")]
    InvalidTransition {
        id: AlertId,
        current: AlertStatus,
        attempted: Transition,
    },

    #[error("catalog lookup failed: {0}")]
    Catalog(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl EngineError {
    /// Short machine-readable kind, used in bulk outcome reports.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "validation",
            EngineError::InvalidRequest(_) => "invalid_request",
            EngineError::AlertNotFound(_) => "not_found",
            EngineError::StaffNotFound(_) => "staff_not_found",
            EngineError::StaffInactive(_) => "staff_inactive",
            EngineError::InvalidTransition { .. } => "invalid_transition",
            EngineError::Catalog(_) => "catalog",
            EngineError::Storage(_) => "storage",
        }
    }
}
