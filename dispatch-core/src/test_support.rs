use crate::model::{
    Assignment, GuestInfo, Incident, IncidentType, Priority, ReportMethod, Reporter, Role, Status,
};
use crate::router::route;
use chrono::Utc;

pub(crate) fn db_path(name: &str) -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("time")
        .as_nanos();
    format!("/tmp/wildlife-dispatch-tests/{name}-{nanos}.db")
}

pub(crate) fn sample_incident(incident_type: IncidentType) -> Incident {
    let now = Utc::now();
    Incident {
        id: uuid::Uuid::new_v4().to_string(),
        incident_type,
        category: route(incident_type).category.to_string(),
        priority: Priority::Medium,
        status: Status::Reported,
        description: "Visitor fell".into(),
        location: "Trail 3".into(),
        time_reported: now,
        time_of_incident: now.naive_utc(),
        reporter: Reporter::Guest(GuestInfo::default()),
        report_method: ReportMethod::Form,
        assignment: Assignment::default(),
        admin_notes: Vec::new(),
        response_started_at: None,
        response_completed_at: None,
        created_at: now,
        updated_at: now,
        version: 0,
    }
}

/// Binds a responder without going through the assignment engine.
pub(crate) fn assign_directly(incident: &mut Incident, responder: &str, role: Role) {
    incident.assignment.assigned_to = Some(responder.into());
    incident.assignment.assigned_role = Some(role);
    incident.assignment.assigned_by = Some("dispatcher".into());
    incident.assignment.assigned_at = Some(Utc::now());
}
