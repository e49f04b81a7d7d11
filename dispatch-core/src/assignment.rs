use crate::error::DispatchError;
use crate::model::{Actor, Incident, Responder, Role, Status};
use crate::router::route;
use chrono::{DateTime, Utc};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AssignOutcome {
    /// First binding on this incident.
    Assigned,
    /// A different responder held the incident and was replaced.
    Reassigned {
        previous: String,
        previous_role: Option<Role>,
    },
    /// Same responder again; only `assignedAt` moved.
    Refreshed,
}

/// Binds `responder` to `incident` in `role`.
///
/// Every check runs before the incident is touched, so a failed call leaves it
/// exactly as it was.
pub fn assign(
    incident: &mut Incident,
    responder: &Responder,
    role: Role,
    dispatcher: &Actor,
    now: DateTime<Utc>,
) -> Result<AssignOutcome, DispatchError> {
    if !dispatcher.role.is_dispatcher() {
        return Err(DispatchError::Forbidden(format!(
            "{} may not assign responders",
            dispatcher.role
        )));
    }
    if !route(incident.incident_type).allows(role) {
        return Err(DispatchError::ResponderNotEligible {
            role,
            incident_type: incident.incident_type,
        });
    }
    if responder.deleted || responder.role != role {
        return Err(DispatchError::ResponderNotFound(responder.id.clone()));
    }
    if incident.status.is_finished() {
        return Err(DispatchError::IllegalTransition {
            from: incident.status,
            to: Status::Assigned,
        });
    }

    let outcome = match incident.assignment.assigned_to.as_deref() {
        None => AssignOutcome::Assigned,
        Some(current) if current == responder.id => AssignOutcome::Refreshed,
        Some(current) => AssignOutcome::Reassigned {
            previous: current.to_string(),
            previous_role: incident.assignment.assigned_role,
        },
    };

    let binding = &mut incident.assignment;
    binding.assigned_to = Some(responder.id.clone());
    binding.assigned_role = Some(role);
    binding.assigned_by = Some(dispatcher.id.clone());
    binding.assigned_at = Some(now);
    if matches!(incident.status, Status::Reported | Status::Acknowledged) {
        incident.status = Status::Assigned;
    }
    incident.updated_at = now;

    if !responder.active {
        tracing::info!(
            incident_id = %incident.id,
            responder = %responder.id,
            "assigned responder account is inactive"
        );
    }
    Ok(outcome)
}
