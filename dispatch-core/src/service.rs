//! The orchestration surface other subsystems call.
//!
//! Every operation is a single read followed by at most one conditional
//! write, and that write carries the audit events describing it. A lost race
//! surfaces as [`DispatchError::ConcurrentModification`]; nothing here
//! retries on the caller's behalf.

use crate::assignment::{self, AssignOutcome};
use crate::error::DispatchError;
use crate::event_log::{Event, EventLog, EventType};
use crate::model::{
    Actor, GuestInfo, Incident, IncidentType, Priority, ReportMethod, Reporter, Responder, Role,
    Status,
};
use crate::permissions::{authorize, may_act_on, Operation};
use crate::router::{self, Routing};
use crate::state_machine;
use crate::stats::{self, Period, Snapshot};
use crate::store::{IncidentFilter, IncidentStore, ListQuery, Page, ResponderDirectory};
use chrono::{DateTime, Utc};
use report_registry::{
    validate_guest_report, validate_operator_report, GuestReportV1, OperatorReportV1,
    ValidatedReport,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Body of the full status update: a target status, optional notes, and an
/// optional responder to bind first.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StatusUpdate {
    pub status: Option<Status>,
    pub notes: Option<String>,
    pub assigned_to: Option<String>,
}

pub struct DispatchService<S> {
    store: Arc<S>,
    log: EventLog,
}

impl<S> Clone for DispatchService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            log: self.log.clone(),
        }
    }
}

impl<S> DispatchService<S>
where
    S: IncidentStore + ResponderDirectory,
{
    pub fn new(store: Arc<S>, log: EventLog) -> Self {
        Self { store, log }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Public intake. The reporter is kept as free-text guest details.
    pub fn report_guest(&self, form: &GuestReportV1) -> Result<Incident, DispatchError> {
        let report = validate_guest_report(form).map_err(DispatchError::Validation)?;
        let (incident_type, routing) = router::route_raw(&report.incident_type)?;
        let now = Utc::now();

        let reporter = Reporter::Guest(GuestInfo {
            name: report.contact_name.clone(),
            phone: report.contact_phone.clone(),
            role: report.contact_role.clone(),
        });
        let incident = new_incident(&report, incident_type, routing, reporter, ReportMethod::Form, now);
        let reported = audit_event(
            &incident.id,
            EventType::Reported,
            "guest",
            format!("reported via public form as {}", incident.category),
            Some(serde_json::json!({
                "type": incident.incident_type,
                "category": incident.category,
                "method": incident.report_method,
            })),
            now,
        );
        self.store.insert(&incident, &[reported])?;

        info!(
            incident_id = %incident.id,
            incident_type = %incident.incident_type,
            category = %incident.category,
            "incident reported via public form"
        );
        Ok(incident)
    }

    /// Call-operator intake. Optionally binds a responder in the same write.
    pub fn report_by_operator(
        &self,
        form: &OperatorReportV1,
        actor: &Actor,
    ) -> Result<Incident, DispatchError> {
        authorize(actor, Operation::ReportByOperator)?;
        let report = validate_operator_report(form).map_err(DispatchError::Validation)?;
        let (incident_type, routing) = router::route_raw(&report.incident_type)?;

        let priority = form
            .priority
            .as_deref()
            .map(str::parse::<Priority>)
            .transpose()?
            .unwrap_or_default();
        let forwarded_to = form
            .forwarded_to
            .as_deref()
            .map(|model| {
                Role::from_user_model(model)
                    .map_err(|_| DispatchError::validation("forwardedTo", format!("unknown user model '{model}'")))
            })
            .transpose()?;
        if let Some(role) = forwarded_to {
            if !routing.allows(role) {
                return Err(DispatchError::ResponderNotEligible { role, incident_type });
            }
        }
        let method = if form.is_direct_call.unwrap_or(true) {
            ReportMethod::Phone
        } else {
            ReportMethod::Form
        };

        let caller = (report.contact_name.is_some() || report.contact_phone.is_some()).then(|| GuestInfo {
            name: report.contact_name.clone(),
            phone: report.contact_phone.clone(),
            role: None,
        });
        let now = Utc::now();
        let reporter = Reporter::CallOperator {
            account_id: actor.id.clone(),
            caller,
        };
        let mut incident = new_incident(&report, incident_type, routing, reporter, method, now);
        incident.priority = priority;
        incident.assignment.call_operator = Some(actor.id.clone());
        incident.assignment.forwarded_to = forwarded_to;

        let mut events = vec![audit_event(
            &incident.id,
            EventType::Reported,
            &actor.id,
            format!("reported by call operator as {}", incident.category),
            Some(serde_json::json!({
                "type": incident.incident_type,
                "category": incident.category,
                "method": incident.report_method,
                "priority": incident.priority,
            })),
            now,
        )];
        if let Some(officer) = form.assigned_officer.as_deref().map(str::trim) {
            let responder = self.resolve(officer)?;
            let role = forwarded_to.unwrap_or(responder.role);
            let outcome = assignment::assign(&mut incident, &responder, role, actor, now)?;
            events.push(assignment_event(&incident.id, actor, &responder.id, role, &outcome, now));
            if incident.status != Status::Reported {
                events.push(transition_event(&incident.id, Status::Reported, incident.status, actor, now));
            }
        }

        self.store.insert(&incident, &events)?;
        info!(
            incident_id = %incident.id,
            operator = %actor.id,
            incident_type = %incident.incident_type,
            method = ?incident.report_method,
            assigned_to = ?incident.assignment.assigned_to,
            "incident reported by call operator"
        );
        Ok(incident)
    }

    pub fn get_incident(&self, id: &str, actor: &Actor) -> Result<Incident, DispatchError> {
        authorize(actor, Operation::ViewIncident)?;
        Ok(redact(actor, self.load(id)?))
    }

    pub fn list_incidents(
        &self,
        query: &ListQuery,
        actor: &Actor,
    ) -> Result<Page<Incident>, DispatchError> {
        authorize(actor, Operation::ListIncidents)?;
        Ok(self.store.list(query)?.map(|incident| redact(actor, incident)))
    }

    /// Full status update used by the dispatch desk and emergency officers.
    pub fn update_status(
        &self,
        id: &str,
        update: &StatusUpdate,
        actor: &Actor,
    ) -> Result<Incident, DispatchError> {
        authorize(actor, Operation::UpdateStatus)?;
        let mut incident = self.load(id)?;
        let before = incident.status;
        let now = Utc::now();

        let mut bound = None;
        if let Some(responder_id) = update.assigned_to.as_deref() {
            let responder = self.resolve(responder_id)?;
            let outcome = assignment::assign(&mut incident, &responder, responder.role, actor, now)?;
            bound = Some((responder, outcome));
        }

        let target = update.status.unwrap_or(incident.status);
        if target != incident.status {
            state_machine::transition(&mut incident, target, actor, update.notes.as_deref(), now)?;
        } else if bound.is_some() {
            if let Some(note) = non_blank(update.notes.as_deref()) {
                incident.append_note(note, &actor.id, false, now);
            }
        } else {
            return Err(DispatchError::IllegalTransition {
                from: incident.status,
                to: target,
            });
        }

        let mut events = Vec::new();
        if let Some((responder, outcome)) = &bound {
            events.push(assignment_event(&incident.id, actor, &responder.id, responder.role, outcome, now));
        }
        if incident.status != before {
            events.push(transition_event(&incident.id, before, incident.status, actor, now));
        }

        let saved = self.store.update(&incident, &events)?;
        log_transition(&saved, before, actor);
        Ok(redact(actor, saved))
    }

    /// Officer-facing update, limited to incidents bound to the caller.
    ///
    /// Incidents assigned to someone else are reported as not found.
    pub fn update_status_simple(
        &self,
        id: &str,
        status: Status,
        actor: &Actor,
    ) -> Result<Incident, DispatchError> {
        authorize(actor, Operation::UpdateStatusSimple)?;
        let mut incident = self.load(id)?;
        if !actor.is_admin() && !incident.is_assigned_to(&actor.id) {
            return Err(DispatchError::IncidentNotFound(id.to_string()));
        }
        let now = Utc::now();
        let from = state_machine::transition(&mut incident, status, actor, None, now)?;
        let changed = transition_event(&incident.id, from, incident.status, actor, now);
        let saved = self.store.update(&incident, &[changed])?;
        log_transition(&saved, from, actor);
        Ok(redact(actor, saved))
    }

    pub fn assign(
        &self,
        id: &str,
        responder_id: &str,
        role: Role,
        dispatcher: &Actor,
    ) -> Result<Incident, DispatchError> {
        authorize(dispatcher, Operation::Assign)?;
        let mut incident = self.load(id)?;
        if !router::is_eligible(incident.incident_type, role) {
            return Err(DispatchError::ResponderNotEligible {
                role,
                incident_type: incident.incident_type,
            });
        }
        let responder = self.resolve(responder_id)?;
        let before = incident.status;
        let now = Utc::now();
        let outcome = assignment::assign(&mut incident, &responder, role, dispatcher, now)?;

        let mut events = vec![assignment_event(&incident.id, dispatcher, &responder.id, role, &outcome, now)];
        if incident.status != before {
            events.push(transition_event(&incident.id, before, incident.status, dispatcher, now));
        }
        let saved = self.store.update(&incident, &events)?;
        info!(
            incident_id = %saved.id,
            responder = %responder.id,
            %role,
            dispatcher = %dispatcher.id,
            outcome = ?outcome,
            "responder assigned"
        );
        log_transition(&saved, before, dispatcher);
        Ok(saved)
    }

    pub fn set_priority(
        &self,
        id: &str,
        priority: Priority,
        actor: &Actor,
    ) -> Result<Incident, DispatchError> {
        authorize(actor, Operation::SetPriority)?;
        let mut incident = self.load(id)?;
        if !may_act_on(actor, &incident) {
            return Err(DispatchError::Forbidden(format!(
                "{} may not change the priority of incident {id}",
                actor.id
            )));
        }
        let previous = incident.priority;
        let now = Utc::now();
        incident.priority = priority;
        incident.updated_at = now;

        let changed = audit_event(
            &incident.id,
            EventType::PriorityChanged,
            &actor.id,
            format!("priority {previous} -> {priority}"),
            Some(serde_json::json!({ "from": previous, "to": priority })),
            now,
        );
        let saved = self.store.update(&incident, &[changed])?;
        info!(incident_id = %saved.id, actor = %actor.id, role = %actor.role, %previous, %priority, "priority changed");
        Ok(redact(actor, saved))
    }

    pub fn add_note(
        &self,
        id: &str,
        note: &str,
        is_private: bool,
        actor: &Actor,
    ) -> Result<Incident, DispatchError> {
        authorize(actor, Operation::AddNote)?;
        let note = non_blank(Some(note))
            .ok_or_else(|| DispatchError::validation("note", "note is required"))?;
        let mut incident = self.load(id)?;
        if !actor.role.is_dispatcher() && !may_act_on(actor, &incident) {
            return Err(DispatchError::Forbidden(format!(
                "{} may not annotate incident {id}",
                actor.id
            )));
        }
        let now = Utc::now();
        incident.append_note(note, &actor.id, is_private, now);
        incident.updated_at = now;

        let description = if is_private { "private note added" } else { "note added" };
        let added = audit_event(&incident.id, EventType::NoteAdded, &actor.id, description.to_string(), None, now);
        let saved = self.store.update(&incident, &[added])?;
        info!(incident_id = %saved.id, actor = %actor.id, role = %actor.role, is_private, "note added");
        Ok(redact(actor, saved))
    }

    /// Admins may delete anything; call operators only what they filed.
    pub fn delete_incident(&self, id: &str, actor: &Actor) -> Result<(), DispatchError> {
        authorize(actor, Operation::DeleteIncident)?;
        let incident = self.load(id)?;
        if !actor.is_admin() && !incident.created_by(&actor.id) {
            return Err(DispatchError::Forbidden(format!(
                "{} did not create incident {id}",
                actor.id
            )));
        }
        let deleted = audit_event(
            id,
            EventType::Deleted,
            &actor.id,
            format!("deleted by {}", actor.role),
            Some(serde_json::to_value(&incident)?),
            Utc::now(),
        );
        if !self.store.delete(id, &[deleted])? {
            return Err(DispatchError::IncidentNotFound(id.to_string()));
        }

        warn!(incident_id = %id, actor = %actor.id, role = %actor.role, "incident deleted");
        Ok(())
    }

    /// Incidents bound to `responder_id`. Non-admins may only ask about themselves.
    pub fn list_assigned(
        &self,
        responder_id: &str,
        filter: &IncidentFilter,
        actor: &Actor,
    ) -> Result<Vec<Incident>, DispatchError> {
        authorize(actor, Operation::ListAssigned)?;
        if !actor.is_admin() && actor.id != responder_id {
            return Err(DispatchError::Forbidden(format!(
                "{} may not list assignments of {responder_id}",
                actor.id
            )));
        }
        Ok(self
            .store
            .assigned_to(responder_id, filter)?
            .into_iter()
            .map(|incident| redact(actor, incident))
            .collect())
    }

    pub fn stats(&self, period: Period, actor: &Actor) -> Result<Snapshot, DispatchError> {
        authorize(actor, Operation::ViewStats)?;
        stats::aggregate(self.store.as_ref(), period, Utc::now())
    }

    pub fn timeline(&self, id: &str, actor: &Actor) -> Result<Vec<Event>, DispatchError> {
        authorize(actor, Operation::ViewTimeline)?;
        let events = self.log.events_for_incident(id)?;
        if events.is_empty() {
            return Err(DispatchError::IncidentNotFound(id.to_string()));
        }
        Ok(events)
    }

    /// Every binding the incident has had, oldest first.
    pub fn assignment_history(&self, id: &str, actor: &Actor) -> Result<Vec<Event>, DispatchError> {
        Ok(self
            .timeline(id, actor)?
            .into_iter()
            .filter(|e| e.event_type.is_assignment())
            .collect())
    }

    fn load(&self, id: &str) -> Result<Incident, DispatchError> {
        self.store
            .get(id)?
            .ok_or_else(|| DispatchError::IncidentNotFound(id.to_string()))
    }

    fn resolve(&self, responder_id: &str) -> Result<Responder, DispatchError> {
        self.store
            .find_responder(responder_id)?
            .ok_or_else(|| DispatchError::ResponderNotFound(responder_id.to_string()))
    }
}

fn audit_event(
    incident_id: &str,
    event_type: EventType,
    actor: &str,
    description: String,
    details: Option<serde_json::Value>,
    now: DateTime<Utc>,
) -> Event {
    Event {
        id: None,
        incident_id: incident_id.to_string(),
        event_type,
        actor: actor.to_string(),
        description,
        details,
        timestamp: now.to_rfc3339(),
    }
}

fn assignment_event(
    incident_id: &str,
    dispatcher: &Actor,
    responder_id: &str,
    role: Role,
    outcome: &AssignOutcome,
    now: DateTime<Utc>,
) -> Event {
    let (event_type, description, details) = match outcome {
        AssignOutcome::Assigned => (
            EventType::Assigned,
            format!("assigned to {responder_id} as {role}"),
            serde_json::json!({ "assignedTo": responder_id, "assignedRole": role }),
        ),
        AssignOutcome::Refreshed => (
            EventType::Assigned,
            format!("assignment of {responder_id} refreshed"),
            serde_json::json!({ "assignedTo": responder_id, "assignedRole": role, "refreshed": true }),
        ),
        AssignOutcome::Reassigned {
            previous,
            previous_role,
        } => (
            EventType::Reassigned,
            format!("reassigned from {previous} to {responder_id}"),
            serde_json::json!({
                "assignedTo": responder_id,
                "assignedRole": role,
                "previous": { "assignedTo": previous, "assignedRole": previous_role },
            }),
        ),
    };
    audit_event(incident_id, event_type, &dispatcher.id, description, Some(details), now)
}

fn transition_event(incident_id: &str, from: Status, to: Status, actor: &Actor, now: DateTime<Utc>) -> Event {
    audit_event(
        incident_id,
        EventType::StatusChanged,
        &actor.id,
        format!("{from} -> {to}"),
        Some(serde_json::json!({ "from": from, "to": to })),
        now,
    )
}

fn log_transition(incident: &Incident, from: Status, actor: &Actor) {
    if incident.status != from {
        info!(
            incident_id = %incident.id,
            actor = %actor.id,
            role = %actor.role,
            %from,
            to = %incident.status,
            "status updated"
        );
    }
}

fn new_incident(
    report: &ValidatedReport,
    incident_type: IncidentType,
    routing: Routing,
    reporter: Reporter,
    report_method: ReportMethod,
    now: DateTime<Utc>,
) -> Incident {
    Incident {
        id: uuid::Uuid::new_v4().to_string(),
        incident_type,
        category: routing.category.to_string(),
        priority: Priority::default(),
        status: Status::Reported,
        description: report.description.clone(),
        location: report.location.clone(),
        time_reported: now,
        time_of_incident: report.time_of_incident,
        reporter,
        report_method,
        assignment: Default::default(),
        admin_notes: Vec::new(),
        response_started_at: None,
        response_completed_at: None,
        created_at: now,
        updated_at: now,
        version: 0,
    }
}

fn redact(actor: &Actor, incident: Incident) -> Incident {
    if actor.role.is_dispatcher() {
        incident
    } else {
        incident.without_private_notes()
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
