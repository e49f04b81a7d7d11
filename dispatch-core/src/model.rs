use crate::error::DispatchError;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IncidentType {
    Human,
    Animal,
    Physical,
    Unethical,
    Equipment,
    NaturalDisaster,
}

impl IncidentType {
    pub const ALL: [IncidentType; 6] = [
        IncidentType::Human,
        IncidentType::Animal,
        IncidentType::Physical,
        IncidentType::Unethical,
        IncidentType::Equipment,
        IncidentType::NaturalDisaster,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentType::Human => "Human",
            IncidentType::Animal => "Animal",
            IncidentType::Physical => "Physical",
            IncidentType::Unethical => "Unethical",
            IncidentType::Equipment => "Equipment",
            IncidentType::NaturalDisaster => "NaturalDisaster",
        }
    }
}

impl FromStr for IncidentType {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IncidentType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| DispatchError::InvalidIncidentType(s.to_string()))
    }
}

impl fmt::Display for IncidentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Priority {
    pub const ALL: [Priority; 4] = [Priority::Low, Priority::Medium, Priority::High, Priority::Critical];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
            Priority::Critical => "Critical",
        }
    }

    pub fn rank(&self) -> i64 {
        match self {
            Priority::Low => 0,
            Priority::Medium => 1,
            Priority::High => 2,
            Priority::Critical => 3,
        }
    }
}

impl FromStr for Priority {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Priority::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| DispatchError::InvalidPriority(s.to_string()))
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status. Declaration order is the forward order of the lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Status {
    Reported,
    Acknowledged,
    Assigned,
    InProgress,
    Resolved,
    Closed,
}

impl Status {
    pub const ALL: [Status; 6] = [
        Status::Reported,
        Status::Acknowledged,
        Status::Assigned,
        Status::InProgress,
        Status::Resolved,
        Status::Closed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Reported => "Reported",
            Status::Acknowledged => "Acknowledged",
            Status::Assigned => "Assigned",
            Status::InProgress => "InProgress",
            Status::Resolved => "Resolved",
            Status::Closed => "Closed",
        }
    }

    pub fn index(&self) -> i64 {
        match self {
            Status::Reported => 0,
            Status::Acknowledged => 1,
            Status::Assigned => 2,
            Status::InProgress => 3,
            Status::Resolved => 4,
            Status::Closed => 5,
        }
    }

    /// Resolved or Closed: the responder's work is finished.
    pub fn is_finished(&self) -> bool {
        matches!(self, Status::Resolved | Status::Closed)
    }
}

impl FromStr for Status {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Status::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| DispatchError::InvalidStatus(s.to_string()))
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    Admin,
    #[serde(rename = "Call Operator")]
    CallOperator,
    #[serde(rename = "Emergency Officer")]
    EmergencyOfficer,
    Veterinarian,
    #[serde(rename = "Wildlife Officer")]
    WildlifeOfficer,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Admin,
        Role::CallOperator,
        Role::EmergencyOfficer,
        Role::Veterinarian,
        Role::WildlifeOfficer,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Role::Admin => "Admin",
            Role::CallOperator => "Call Operator",
            Role::EmergencyOfficer => "Emergency Officer",
            Role::Veterinarian => "Veterinarian",
            Role::WildlifeOfficer => "Wildlife Officer",
        }
    }

    /// Call operators and admins create incidents and bind responders.
    pub fn is_dispatcher(&self) -> bool {
        matches!(self, Role::Admin | Role::CallOperator)
    }

    /// Maps the account model names used by the assignment endpoint.
    pub fn from_user_model(model: &str) -> Result<Role, DispatchError> {
        match model {
            "Vet" => Ok(Role::Veterinarian),
            "EmergencyOfficer" => Ok(Role::EmergencyOfficer),
            "WildlifeOfficer" => Ok(Role::WildlifeOfficer),
            other => Err(DispatchError::validation(
                "userModel",
                format!("unknown user model '{other}'"),
            )),
        }
    }
}

impl FromStr for Role {
    type Err = DispatchError;

    /// Accepts display labels as well as the compact names the auth layer emits.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let role = match s {
            "Admin" => Role::Admin,
            "Call Operator" | "CallOperator" => Role::CallOperator,
            "Emergency Officer" | "EmergencyOfficer" => Role::EmergencyOfficer,
            "Veterinarian" | "Vet" => Role::Veterinarian,
            "Wildlife Officer" | "WildlifeOfficer" => Role::WildlifeOfficer,
            other => return Err(DispatchError::validation("role", format!("unknown role '{other}'"))),
        };
        Ok(role)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Authenticated caller, as attached by the auth layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self { id: id.into(), role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestInfo {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub role: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Reporter {
    Guest(GuestInfo),
    #[serde(rename_all = "camelCase")]
    CallOperator {
        account_id: String,
        caller: Option<GuestInfo>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportMethod {
    Form,
    Phone,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub assigned_to: Option<String>,
    pub assigned_role: Option<Role>,
    pub assigned_by: Option<String>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub call_operator: Option<String>,
    pub forwarded_to: Option<Role>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminNote {
    pub note: String,
    pub added_at: DateTime<Utc>,
    pub added_by: String,
    pub is_private: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    pub id: String,
    #[serde(rename = "type")]
    pub incident_type: IncidentType,
    pub category: String,
    pub priority: Priority,
    pub status: Status,
    pub description: String,
    pub location: String,
    pub time_reported: DateTime<Utc>,
    pub time_of_incident: NaiveDateTime,
    pub reporter: Reporter,
    pub report_method: ReportMethod,
    pub assignment: Assignment,
    pub admin_notes: Vec<AdminNote>,
    pub response_started_at: Option<DateTime<Utc>>,
    pub response_completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic-concurrency token, bumped by the store on every write.
    pub version: i64,
}

impl Incident {
    pub fn is_assigned_to(&self, account_id: &str) -> bool {
        self.assignment.assigned_to.as_deref() == Some(account_id)
    }

    /// True for the call operator who filed this incident.
    pub fn created_by(&self, account_id: &str) -> bool {
        if self.assignment.call_operator.as_deref() == Some(account_id) {
            return true;
        }
        matches!(&self.reporter, Reporter::CallOperator { account_id: owner, .. } if owner == account_id)
    }

    pub fn append_note(&mut self, note: &str, added_by: &str, is_private: bool, at: DateTime<Utc>) {
        self.admin_notes.push(AdminNote {
            note: note.to_string(),
            added_at: at,
            added_by: added_by.to_string(),
            is_private,
        });
    }

    /// Copy with private notes removed, for callers outside the dispatch desk.
    pub fn without_private_notes(mut self) -> Self {
        self.admin_notes.retain(|n| !n.is_private);
        self
    }
}

/// Responder account as resolved from the account directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Responder {
    pub id: String,
    pub name: String,
    pub role: Role,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub deleted: bool,
}

fn default_true() -> bool {
    true
}
