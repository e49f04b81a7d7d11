//! Incident lifecycle transitions.
//!
//! The strict chain is `Reported -> Acknowledged -> Assigned -> InProgress ->
//! Resolved -> Closed`. Officers may also jump from `Reported`/`Acknowledged`
//! straight to `InProgress`, but only on an incident that already has an
//! assignee. Nothing ever moves backwards and `Closed` is terminal.

use crate::error::DispatchError;
use crate::model::{Actor, Incident, Status};
use crate::permissions::may_act_on;
use chrono::{DateTime, Utc};

fn successors(from: Status) -> &'static [Status] {
    match from {
        Status::Reported => &[Status::Acknowledged, Status::Assigned, Status::InProgress],
        Status::Acknowledged => &[Status::Assigned, Status::InProgress],
        Status::Assigned => &[Status::InProgress],
        Status::InProgress => &[Status::Resolved],
        Status::Resolved => &[Status::Closed],
        Status::Closed => &[],
    }
}

/// Whether `to` is reachable from `from` in one step.
///
/// `has_assignee` guards the targets that require a bound responder.
pub fn can_transition(from: Status, to: Status, has_assignee: bool) -> bool {
    if !successors(from).contains(&to) {
        return false;
    }
    match to {
        Status::Assigned | Status::InProgress => has_assignee,
        _ => true,
    }
}

pub fn transition(
    incident: &mut Incident,
    to: Status,
    actor: &Actor,
    note: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Status, DispatchError> {
    if !may_act_on(actor, incident) {
        return Err(DispatchError::Forbidden(format!(
            "{} is not the assignee or reporting operator of incident {}",
            actor.id, incident.id
        )));
    }

    let from = incident.status;
    let has_assignee = incident.assignment.assigned_to.is_some();
    if !can_transition(from, to, has_assignee) {
        return Err(DispatchError::IllegalTransition { from, to });
    }

    incident.status = to;
    match to {
        Status::InProgress => {
            incident.response_started_at.get_or_insert(now);
        }
        Status::Resolved | Status::Closed => {
            incident.response_completed_at.get_or_insert(now);
        }
        _ => {}
    }
    if let Some(note) = note.map(str::trim).filter(|n| !n.is_empty()) {
        incident.append_note(note, &actor.id, false, now);
    }
    incident.updated_at = now;

    tracing::debug!(
        incident_id = %incident.id,
        actor = %actor.id,
        %from,
        %to,
        "status transition"
    );
    Ok(from)
}
