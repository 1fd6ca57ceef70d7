use std::collections::{BTreeSet, HashMap};

use super::role::{Role, RoleParseError};
use crate::collab::RoleAssignmentRecord;
use crate::types::Principal;

/// One validated role-table row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleAssignment {
    pub role: Role,
    pub job_titles: BTreeSet<String>,
    pub principals: BTreeSet<String>,
}

impl RoleAssignment {
    pub fn new<J, S>(role: Role, job_titles: J) -> Self
    where
        J: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            role,
            job_titles: job_titles.into_iter().map(Into::into).collect(),
            principals: BTreeSet::new(),
        }
    }

    pub fn with_principals<P, S>(mut self, principals: P) -> Self
    where
        P: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.principals.extend(principals.into_iter().map(Into::into));
        self
    }
}

impl TryFrom<RoleAssignmentRecord> for RoleAssignment {
    type Error = RoleParseError;

    fn try_from(record: RoleAssignmentRecord) -> Result<Self, Self::Error> {
        let role: Role = record.role.parse()?;
        Ok(RoleAssignment::new(role, record.job_titles).with_principals(record.principals))
    }
}

/// Snapshot of the fetched role table plus explicit per-principal roles.
///
/// The empty table is the fail-closed default: nothing is granted through it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleTable {
    assignments: Vec<RoleAssignment>,
    principal_roles: HashMap<String, BTreeSet<Role>>,
}

impl RoleTable {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(assignments: Vec<RoleAssignment>) -> Self {
        Self {
            assignments,
            principal_roles: HashMap::new(),
        }
    }

    /// Validate raw rows. Rows naming an unknown role are returned separately
    /// and never take part in decisions.
    pub fn from_records(records: Vec<RoleAssignmentRecord>) -> (Self, Vec<RoleParseError>) {
        let mut assignments = Vec::with_capacity(records.len());
        let mut rejected = Vec::new();

        for record in records {
            match RoleAssignment::try_from(record) {
                Ok(assignment) => assignments.push(assignment),
                Err(e) => rejected.push(e),
            }
        }

        (Self::new(assignments), rejected)
    }

    pub fn with_principal_roles(mut self, principal_id: impl Into<String>, roles: impl IntoIterator<Item = Role>) -> Self {
        self.set_principal_roles(principal_id, roles);
        self
    }

    pub fn set_principal_roles(&mut self, principal_id: impl Into<String>, roles: impl IntoIterator<Item = Role>) {
        self.principal_roles
            .insert(principal_id.into(), roles.into_iter().collect());
    }

    pub fn forget_principal(&mut self, principal_id: &str) {
        self.principal_roles.remove(principal_id);
    }

    pub fn assignments(&self) -> &[RoleAssignment] {
        &self.assignments
    }

    pub fn into_assignments(self) -> Vec<RoleAssignment> {
        self.assignments
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty() && self.principal_roles.is_empty()
    }

    /// Explicit roles of the principal plus every row that lists its id
    pub fn roles_of(&self, principal: &Principal) -> BTreeSet<Role> {
        let mut roles = self
            .principal_roles
            .get(&principal.id)
            .cloned()
            .unwrap_or_default();

        roles.extend(
            self.assignments
                .iter()
                .filter(|a| a.principals.contains(&principal.id))
                .map(|a| a.role),
        );

        roles
    }

    /// First required role held through the principal's job title
    pub fn job_title_grant(&self, principal: &Principal, required: &BTreeSet<Role>) -> Option<Role> {
        self.assignments
            .iter()
            .find(|a| required.contains(&a.role) && a.job_titles.contains(&principal.job_title))
            .map(|a| a.role)
    }

    /// Replace the rows, keeping explicit principal roles
    pub(crate) fn replace_assignments(&mut self, assignments: Vec<RoleAssignment>) {
        self.assignments = assignments;
    }
}
