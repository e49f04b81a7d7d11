//! `{success, message, data?}` envelope shared by every endpoint.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use dispatch_core::{DispatchError, Page};
use report_registry::FieldError;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

#[derive(Debug, Serialize)]
pub struct Pagination {
    pub current: u32,
    pub pages: u64,
    pub total: u64,
}

pub fn ok<T: Serialize>(message: impl Into<String>, data: T) -> Response {
    respond(StatusCode::OK, message, data)
}

pub fn created<T: Serialize>(message: impl Into<String>, data: T) -> Response {
    respond(StatusCode::CREATED, message, data)
}

pub fn paged<T: Serialize>(message: impl Into<String>, page: Page<T>) -> Response {
    let pagination = Pagination {
        current: page.page,
        pages: page.pages(),
        total: page.total,
    };
    let body = Envelope {
        success: true,
        message: message.into(),
        data: Some(page.items),
        pagination: Some(pagination),
    };
    (StatusCode::OK, Json(body)).into_response()
}

pub fn message_only(message: impl Into<String>) -> Response {
    let body: Envelope<()> = Envelope {
        success: true,
        message: message.into(),
        data: None,
        pagination: None,
    };
    (StatusCode::OK, Json(body)).into_response()
}

fn respond<T: Serialize>(status: StatusCode, message: impl Into<String>, data: T) -> Response {
    let body = Envelope {
        success: true,
        message: message.into(),
        data: Some(data),
        pagination: None,
    };
    (status, Json(body)).into_response()
}

#[derive(Debug, Serialize)]
struct Failure<'a> {
    success: bool,
    message: &'a str,
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<&'a [FieldError]>,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub kind: &'static str,
    pub message: String,
    pub errors: Vec<FieldError>,
}

impl ApiError {
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            kind: "Unauthenticated",
            message: message.into(),
            errors: Vec::new(),
        }
    }

    pub fn bad_request(kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            kind,
            message: message.into(),
            errors: Vec::new(),
        }
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            kind: "StoreError",
            message: detail.into(),
            errors: Vec::new(),
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        let status = match &err {
            DispatchError::Validation(_)
            | DispatchError::InvalidIncidentType(_)
            | DispatchError::InvalidStatus(_)
            | DispatchError::InvalidPriority(_)
            | DispatchError::IllegalTransition { .. }
            | DispatchError::ResponderNotEligible { .. } => StatusCode::BAD_REQUEST,
            DispatchError::Forbidden(_) => StatusCode::FORBIDDEN,
            DispatchError::IncidentNotFound(_) | DispatchError::ResponderNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            DispatchError::ConcurrentModification(_) => StatusCode::CONFLICT,
            DispatchError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            kind: err.kind(),
            errors: err.field_errors().map(<[FieldError]>::to_vec).unwrap_or_default(),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = if self.status.is_server_error() {
            tracing::error!(kind = self.kind, detail = %self.message, "request failed");
            "internal server error"
        } else {
            tracing::debug!(status = %self.status, kind = self.kind, message = %self.message, "request rejected");
            self.message.as_str()
        };
        let body = Failure {
            success: false,
            message,
            error: self.kind,
            errors: (!self.errors.is_empty()).then_some(self.errors.as_slice()),
        };
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispatch_core::{IncidentType, Role};

    #[test]
    fn dispatch_errors_map_to_status_codes() {
        let cases = [
            (DispatchError::validation("type", "required"), StatusCode::BAD_REQUEST),
            (
                DispatchError::ResponderNotEligible {
                    role: Role::Veterinarian,
                    incident_type: IncidentType::Human,
                },
                StatusCode::BAD_REQUEST,
            ),
            (DispatchError::Forbidden("no".into()), StatusCode::FORBIDDEN),
            (DispatchError::IncidentNotFound("x".into()), StatusCode::NOT_FOUND),
            (DispatchError::ConcurrentModification("x".into()), StatusCode::CONFLICT),
            (DispatchError::Store("disk".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }

    #[test]
    fn validation_keeps_every_field() {
        let err = ApiError::from(DispatchError::Validation(vec![
            FieldError::new("type", "type is required"),
            FieldError::new("date", "date is required"),
        ]));
        assert_eq!(err.kind, "ValidationError");
        assert_eq!(err.errors.len(), 2);
    }
}
