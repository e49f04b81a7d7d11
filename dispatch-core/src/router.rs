use crate::error::DispatchError;
use crate::model::{IncidentType, Role};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Routing {
    pub category: &'static str,
    /// Roles that may hold the assignment. The first entry is the default responder.
    pub eligible_roles: &'static [Role],
    /// Forms-based incidents the default responder may pick up without dispatch.
    pub handled_directly: bool,
}

impl Routing {
    pub fn default_role(&self) -> Role {
        self.eligible_roles[0]
    }

    pub fn allows(&self, role: Role) -> bool {
        self.eligible_roles.contains(&role)
    }
}

pub fn route(incident_type: IncidentType) -> Routing {
    match incident_type {
        IncidentType::Human => Routing {
            category: "Medical Emergency",
            eligible_roles: &[Role::EmergencyOfficer],
            handled_directly: false,
        },
        IncidentType::Animal => Routing {
            category: "Injured Animal",
            eligible_roles: &[Role::Veterinarian, Role::WildlifeOfficer],
            handled_directly: false,
        },
        IncidentType::Unethical => Routing {
            category: "Poaching",
            eligible_roles: &[Role::WildlifeOfficer, Role::Veterinarian],
            handled_directly: false,
        },
        IncidentType::Physical => Routing {
            category: "Fire",
            eligible_roles: &[Role::EmergencyOfficer],
            handled_directly: true,
        },
        IncidentType::Equipment => Routing {
            category: "Equipment Failure",
            eligible_roles: &[Role::WildlifeOfficer],
            handled_directly: false,
        },
        IncidentType::NaturalDisaster => Routing {
            category: "Storm",
            eligible_roles: &[Role::WildlifeOfficer],
            handled_directly: false,
        },
    }
}

/// Routes a raw type string from an intake form.
pub fn route_raw(raw: &str) -> Result<(IncidentType, Routing), DispatchError> {
    let incident_type = raw.parse::<IncidentType>()?;
    Ok((incident_type, route(incident_type)))
}

pub fn is_eligible(incident_type: IncidentType, role: Role) -> bool {
    route(incident_type).allows(role)
}
