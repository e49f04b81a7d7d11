use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const GUEST_REPORT_V1: &str = "report.v1";
pub const OPERATOR_REPORT_V1: &str = "operator-report.v1";

const MAX_DESCRIPTION_LEN: usize = 2000;
const MAX_LOCATION_LEN: usize = 200;
const MAX_NAME_LEN: usize = 100;

/// Public intake form submitted by park visitors and staff without an account.
///
/// Every field is optional at the wire level so that a missing field is
/// reported by [`validate_guest_report`] alongside all other problems instead
/// of failing deserialization on the first one.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GuestReportV1 {
    #[serde(rename = "type")]
    pub incident_type: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    /// `YYYY-MM-DD`, or an RFC 3339 timestamp whose date part is used.
    pub date: Option<String>,
    /// `HH:MM` or `HH:MM:SS`.
    pub time: Option<String>,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub role: Option<String>,
}

/// Report filed by a call operator on behalf of a caller.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OperatorReportV1 {
    #[serde(rename = "type")]
    pub incident_type: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub priority: Option<String>,
    pub reporter_name: Option<String>,
    pub reporter_phone: Option<String>,
    /// Responder account to bind at creation.
    pub assigned_officer: Option<String>,
    /// Responder model label (`Vet`, `EmergencyOfficer`, `WildlifeOfficer`).
    pub forwarded_to: Option<String>,
    pub is_direct_call: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Fields common to both intake paths after trimming and parsing.
///
/// `incident_type` stays raw: mapping it onto the closed set of incident types
/// belongs to the dispatch router, which reports unknown values separately.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedReport {
    pub incident_type: String,
    pub description: String,
    pub location: String,
    pub time_of_incident: NaiveDateTime,
    pub contact_name: Option<String>,
    pub contact_phone: Option<String>,
    pub contact_role: Option<String>,
}

pub fn validate_guest_report(form: &GuestReportV1) -> Result<ValidatedReport, Vec<FieldError>> {
    let mut errors = Vec::new();
    let core = validate_core(
        CoreFields {
            incident_type: form.incident_type.as_deref(),
            description: form.description.as_deref(),
            location: form.location.as_deref(),
            date: form.date.as_deref(),
            time: form.time.as_deref(),
        },
        &mut errors,
    );
    let contact_name = optional_text("name", form.name.as_deref(), MAX_NAME_LEN, &mut errors);
    let contact_phone = optional_phone("phone", form.phone.as_deref(), &mut errors);
    let contact_role = optional_text("role", form.role.as_deref(), MAX_NAME_LEN, &mut errors);

    match core {
        Some((incident_type, description, location, time_of_incident)) if errors.is_empty() => {
            Ok(ValidatedReport {
                incident_type,
                description,
                location,
                time_of_incident,
                contact_name,
                contact_phone,
                contact_role,
            })
        }
        _ => Err(errors),
    }
}

pub fn validate_operator_report(
    form: &OperatorReportV1,
) -> Result<ValidatedReport, Vec<FieldError>> {
    let mut errors = Vec::new();
    let core = validate_core(
        CoreFields {
            incident_type: form.incident_type.as_deref(),
            description: form.description.as_deref(),
            location: form.location.as_deref(),
            date: form.date.as_deref(),
            time: form.time.as_deref(),
        },
        &mut errors,
    );
    let contact_name = optional_text(
        "reporterName",
        form.reporter_name.as_deref(),
        MAX_NAME_LEN,
        &mut errors,
    );
    let contact_phone = optional_phone("reporterPhone", form.reporter_phone.as_deref(), &mut errors);
    if let Some(officer) = form.assigned_officer.as_deref() {
        if officer.trim().is_empty() {
            errors.push(FieldError::new("assignedOfficer", "must not be blank when present"));
        }
    }

    match core {
        Some((incident_type, description, location, time_of_incident)) if errors.is_empty() => {
            Ok(ValidatedReport {
                incident_type,
                description,
                location,
                time_of_incident,
                contact_name,
                contact_phone,
                contact_role: None,
            })
        }
        _ => Err(errors),
    }
}

/// JSON Schemas for both intake forms, keyed by schema name.
pub fn report_schemas() -> Result<serde_json::Value, String> {
    let guest = serde_json::to_value(schemars::schema_for!(GuestReportV1)).map_err(|e| e.to_string())?;
    let operator =
        serde_json::to_value(schemars::schema_for!(OperatorReportV1)).map_err(|e| e.to_string())?;
    Ok(serde_json::json!({
        GUEST_REPORT_V1: guest,
        OPERATOR_REPORT_V1: operator,
    }))
}

struct CoreFields<'a> {
    incident_type: Option<&'a str>,
    description: Option<&'a str>,
    location: Option<&'a str>,
    date: Option<&'a str>,
    time: Option<&'a str>,
}

fn validate_core(
    fields: CoreFields<'_>,
    errors: &mut Vec<FieldError>,
) -> Option<(String, String, String, NaiveDateTime)> {
    let incident_type = required_text("type", fields.incident_type, MAX_NAME_LEN, errors);
    let description = required_text("description", fields.description, MAX_DESCRIPTION_LEN, errors);
    let location = required_text("location", fields.location, MAX_LOCATION_LEN, errors);
    let date = match fields.date.map(str::trim).filter(|d| !d.is_empty()) {
        None => {
            errors.push(FieldError::new("date", "date is required"));
            None
        }
        Some(raw) => {
            let parsed = parse_date(raw);
            if parsed.is_none() {
                errors.push(FieldError::new("date", format!("invalid date '{raw}'")));
            }
            parsed
        }
    };
    let time = match fields.time.map(str::trim).filter(|t| !t.is_empty()) {
        None => {
            errors.push(FieldError::new("time", "time is required"));
            None
        }
        Some(raw) => {
            let parsed = parse_time(raw);
            if parsed.is_none() {
                errors.push(FieldError::new("time", format!("invalid time '{raw}'")));
            }
            parsed
        }
    };

    Some((
        incident_type?,
        description?,
        location?,
        NaiveDateTime::new(date?, time?),
    ))
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
}

fn parse_time(raw: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .ok()
}

fn required_text(
    field: &str,
    value: Option<&str>,
    max_len: usize,
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => {
            errors.push(FieldError::new(field, format!("{field} is required")));
            None
        }
        Some(v) if v.chars().count() > max_len => {
            errors.push(FieldError::new(
                field,
                format!("{field} must be at most {max_len} characters"),
            ));
            None
        }
        Some(v) => Some(v.to_string()),
    }
}

fn optional_text(
    field: &str,
    value: Option<&str>,
    max_len: usize,
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    let v = value.map(str::trim).filter(|v| !v.is_empty())?;
    if v.chars().count() > max_len {
        errors.push(FieldError::new(
            field,
            format!("{field} must be at most {max_len} characters"),
        ));
        return None;
    }
    Some(v.to_string())
}

fn optional_phone(field: &str, value: Option<&str>, errors: &mut Vec<FieldError>) -> Option<String> {
    let v = value.map(str::trim).filter(|v| !v.is_empty())?;
    let digits = v.chars().filter(char::is_ascii_digit).count();
    let allowed = v
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | ' ' | '(' | ')'));
    if !allowed || !(6..=15).contains(&digits) {
        errors.push(FieldError::new(field, format!("invalid phone number '{v}'")));
        return None;
    }
    Some(v.to_string())
}
