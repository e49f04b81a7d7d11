//! Error taxonomy shared by every dispatch operation.

use crate::model::{IncidentType, Role, Status};
use report_registry::FieldError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("validation failed: {}", summarize(.0))]
    Validation(Vec<FieldError>),

    #[error("invalid incident type '{0}'")]
    InvalidIncidentType(String),

    #[error("invalid status '{0}'")]
    InvalidStatus(String),

    #[error("invalid priority '{0}'")]
    InvalidPriority(String),

    #[error("illegal transition from {from} to {to}")]
    IllegalTransition { from: Status, to: Status },

    #[error("{role} is not eligible for {incident_type} incidents")]
    ResponderNotEligible { role: Role, incident_type: IncidentType },

    #[error("responder '{0}' not found")]
    ResponderNotFound(String),

    #[error("incident '{0}' not found")]
    IncidentNotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("incident '{0}' was modified concurrently; re-read and retry")]
    ConcurrentModification(String),

    #[error("store error: {0}")]
    Store(String),
}

impl DispatchError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        DispatchError::Validation(vec![FieldError::new(field, message)])
    }

    /// Stable taxonomy name placed in failure responses.
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::Validation(_) => "ValidationError",
            DispatchError::InvalidIncidentType(_) => "InvalidIncidentType",
            DispatchError::InvalidStatus(_) => "InvalidStatus",
            DispatchError::InvalidPriority(_) => "InvalidPriority",
            DispatchError::IllegalTransition { .. } => "IllegalTransition",
            DispatchError::ResponderNotEligible { .. } => "ResponderNotEligible",
            DispatchError::ResponderNotFound(_) => "ResponderNotFound",
            DispatchError::IncidentNotFound(_) => "IncidentNotFound",
            DispatchError::Forbidden(_) => "Forbidden",
            DispatchError::ConcurrentModification(_) => "ConcurrentModification",
            DispatchError::Store(_) => "StoreError",
        }
    }

    pub fn field_errors(&self) -> Option<&[FieldError]> {
        match self {
            DispatchError::Validation(errors) => Some(errors),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for DispatchError {
    fn from(err: rusqlite::Error) -> Self {
        DispatchError::Store(err.to_string())
    }
}

impl From<serde_json::Error> for DispatchError {
    fn from(err: serde_json::Error) -> Self {
        DispatchError::Store(err.to_string())
    }
}

fn summarize(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}
