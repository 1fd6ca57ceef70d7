use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validated role vocabulary.
///
/// Role names arrive as strings from the role-management service. Parsing them
/// here turns a typo into a visible error instead of a silent deny.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Role {
    SuperAdmin,
    Admin,
    FincheckInspection,
    FincheckReports,
    FincheckConfig,
    Qc1Inspection,
    Qc2Inspection,
    InspectionDashboard,
    UserManagement,
    RoleManagement,
    Reports,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown role name: '{0}'")]
pub struct RoleParseError(pub String);

impl Role {
    pub const ALL: [Role; 11] = [
        Role::SuperAdmin,
        Role::Admin,
        Role::FincheckInspection,
        Role::FincheckReports,
        Role::FincheckConfig,
        Role::Qc1Inspection,
        Role::Qc2Inspection,
        Role::InspectionDashboard,
        Role::UserManagement,
        Role::RoleManagement,
        Role::Reports,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "Super Admin",
            Role::Admin => "Admin",
            Role::FincheckInspection => "Fincheck Inspection",
            Role::FincheckReports => "Fincheck Reports",
            Role::FincheckConfig => "Fincheck Config",
            Role::Qc1Inspection => "QC1 Inspection",
            Role::Qc2Inspection => "QC2 Inspection",
            Role::InspectionDashboard => "Inspection Dashboard",
            Role::UserManagement => "User Management",
            Role::RoleManagement => "Role Management",
            Role::Reports => "Reports",
        }
    }

    /// Roles that grant every non-locked, non-allow-listed capability
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::SuperAdmin | Role::Admin)
    }
}

impl FromStr for Role {
    type Err = RoleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Role::ALL
            .iter()
            .copied()
            .find(|role| role.as_str() == trimmed)
            .ok_or_else(|| RoleParseError(s.to_string()))
    }
}

impl TryFrom<String> for Role {
    type Error = RoleParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.as_str().to_string()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
