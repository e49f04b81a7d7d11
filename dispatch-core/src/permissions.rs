use crate::error::DispatchError;
use crate::model::{Actor, Incident, Role};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    ReportByOperator,
    ListIncidents,
    ViewIncident,
    UpdateStatus,
    UpdateStatusSimple,
    Assign,
    ListAssigned,
    ViewStats,
    DeleteIncident,
    SetPriority,
    AddNote,
    ViewTimeline,
}

impl Operation {
    pub fn permitted_roles(&self) -> &'static [Role] {
        use Role::*;
        match self {
            Operation::ReportByOperator | Operation::Assign | Operation::DeleteIncident => {
                &[CallOperator, Admin]
            }
            Operation::ListIncidents
            | Operation::ViewIncident
            | Operation::UpdateStatus
            | Operation::ViewStats => &[CallOperator, Admin, EmergencyOfficer],
            Operation::UpdateStatusSimple | Operation::ListAssigned => {
                &[EmergencyOfficer, Veterinarian, WildlifeOfficer, Admin]
            }
            Operation::SetPriority | Operation::AddNote => {
                &[CallOperator, Admin, EmergencyOfficer, Veterinarian, WildlifeOfficer]
            }
            Operation::ViewTimeline => &[CallOperator, Admin],
        }
    }
}

/// Role gate applied before any ownership or assignee predicate.
pub fn authorize(actor: &Actor, op: Operation) -> Result<(), DispatchError> {
    if op.permitted_roles().contains(&actor.role) {
        Ok(())
    } else {
        Err(DispatchError::Forbidden(format!(
            "{} may not perform {op:?}",
            actor.role
        )))
    }
}

/// Who may move an incident through its lifecycle or edit its priority and notes.
pub fn may_act_on(actor: &Actor, incident: &Incident) -> bool {
    actor.is_admin() || incident.is_assigned_to(&actor.id) || incident.created_by(&actor.id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vets_cannot_list_all_incidents() {
        let vet = Actor::new("vet-1", Role::Veterinarian);
        assert!(authorize(&vet, Operation::ListAssigned).is_ok());
        assert!(matches!(
            authorize(&vet, Operation::ListIncidents),
            Err(DispatchError::Forbidden(_))
        ));
    }

    #[test]
    fn only_dispatchers_assign() {
        for role in Role::ALL {
            let actor = Actor::new("x", role);
            assert_eq!(authorize(&actor, Operation::Assign).is_ok(), role.is_dispatcher());
        }
    }
}
