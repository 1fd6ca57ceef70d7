use super::descriptor::CapabilityDescriptor;
use super::role::Role;
use super::table::RoleTable;
use crate::error::SessionError;
use crate::types::Principal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantReason {
    AllowListed,
    AdminOverride,
    RoleMatch(Role),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    Locked,
    NotAllowListed,
    MissingRole,
    NoRequirement,
    NoPrincipal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Grant(GrantReason),
    Deny(DenyReason),
}

impl Decision {
    pub fn is_granted(&self) -> bool {
        matches!(self, Decision::Grant(_))
    }

    pub fn into_result(self, descriptor: &CapabilityDescriptor) -> Result<GrantReason, SessionError> {
        match self {
            Decision::Grant(reason) => Ok(reason),
            Decision::Deny(_) => Err(SessionError::authorization_denied(&descriptor.key)),
        }
    }
}

/// Decide whether `principal` may use the feature described by `descriptor`.
///
/// First match wins:
/// 1. locked descriptors are denied to everyone
/// 2. a non-empty allow-list grants exactly its members, nobody else
/// 3. Super Admin / Admin are granted
/// 4. required roles are granted through a role-table row matching the job title
/// 5. everything else is denied
///
/// Pure and total; an empty table denies everything past step 3.
pub fn resolve(principal: &Principal, table: &RoleTable, descriptor: &CapabilityDescriptor) -> Decision {
    if descriptor.locked {
        return Decision::Deny(DenyReason::Locked);
    }

    if descriptor.has_allow_list() {
        return if descriptor.allow_list_ids.contains(&principal.id) {
            Decision::Grant(GrantReason::AllowListed)
        } else {
            Decision::Deny(DenyReason::NotAllowListed)
        };
    }

    if table.roles_of(principal).iter().any(Role::is_admin) {
        return Decision::Grant(GrantReason::AdminOverride);
    }

    if descriptor.required_roles.is_empty() {
        return Decision::Deny(DenyReason::NoRequirement);
    }

    match table.job_title_grant(principal, &descriptor.required_roles) {
        Some(role) => Decision::Grant(GrantReason::RoleMatch(role)),
        None => Decision::Deny(DenyReason::MissingRole),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::table::RoleAssignment;

    fn clerk() -> Principal {
        Principal::new("E100", "Ana", "QA Clerk")
    }

    fn fincheck_table() -> RoleTable {
        RoleTable::new(vec![RoleAssignment::new(Role::FincheckReports, ["QA Clerk"])])
    }

    fn sample_descriptors() -> Vec<CapabilityDescriptor> {
        vec![
            CapabilityDescriptor::new("home"),
            CapabilityDescriptor::new("fincheck.reports").requires([Role::FincheckReports]),
            CapabilityDescriptor::new("fincheck.config").requires([Role::FincheckConfig]),
            CapabilityDescriptor::new("qc").requires([Role::Qc1Inspection, Role::Qc2Inspection]),
            CapabilityDescriptor::new("roles").requires([Role::RoleManagement, Role::UserManagement]),
        ]
    }

    #[test]
    fn required_role_through_job_title_is_granted() {
        let descriptor = CapabilityDescriptor::new("fincheck.reports").requires([Role::FincheckReports]);
        assert_eq!(
            resolve(&clerk(), &fincheck_table(), &descriptor),
            Decision::Grant(GrantReason::RoleMatch(Role::FincheckReports))
        );
    }

    #[test]
    fn role_not_held_by_job_title_is_denied() {
        let descriptor = CapabilityDescriptor::new("fincheck.config").requires([Role::FincheckConfig]);
        assert_eq!(
            resolve(&clerk(), &fincheck_table(), &descriptor),
            Decision::Deny(DenyReason::MissingRole)
        );
    }

    #[test]
    fn locked_denies_everyone_including_super_admin() {
        let admin = Principal::new("SA1", "Root", "IT");
        let table = fincheck_table().with_principal_roles("SA1", [Role::SuperAdmin]);

        let mut descriptors = sample_descriptors();
        descriptors.push(CapabilityDescriptor::new("vip").allow_ids(["SA1"]));

        for descriptor in descriptors {
            let descriptor = descriptor.locked();
            assert_eq!(resolve(&admin, &table, &descriptor), Decision::Deny(DenyReason::Locked));
            assert_eq!(resolve(&clerk(), &table, &descriptor), Decision::Deny(DenyReason::Locked));
        }
    }

    #[test]
    fn super_admin_is_granted_every_open_descriptor() {
        let admin = Principal::new("SA1", "Root", "Unlisted Title");
        let table = RoleTable::empty().with_principal_roles("SA1", [Role::SuperAdmin]);

        for descriptor in sample_descriptors() {
            assert_eq!(
                resolve(&admin, &table, &descriptor),
                Decision::Grant(GrantReason::AdminOverride),
                "{}",
                descriptor.key
            );
        }
    }

    #[test]
    fn admin_membership_through_table_row_counts() {
        let admin = Principal::new("E300", "Vanna", "Manager");
        let table = RoleTable::new(vec![RoleAssignment::new(Role::Admin, Vec::<String>::new()).with_principals(["E300"])]);
        let descriptor = CapabilityDescriptor::new("fincheck.config").requires([Role::FincheckConfig]);

        assert!(resolve(&admin, &table, &descriptor).is_granted());
    }

    #[test]
    fn allow_list_bypasses_roles_for_members() {
        let descriptor = CapabilityDescriptor::new("qc.special").allow_ids(["TL04", "TL09"]);
        let member = Principal::new("TL04", "Lina", "Team Lead");

        assert_eq!(
            resolve(&member, &RoleTable::empty(), &descriptor),
            Decision::Grant(GrantReason::AllowListed)
        );
    }

    #[test]
    fn allow_list_is_checked_before_admin_override() {
        let descriptor = CapabilityDescriptor::new("qc.special").allow_ids(["TL04", "TL09"]);
        let admin = Principal::new("TL01", "Bora", "Team Lead");
        let table = RoleTable::empty().with_principal_roles("TL01", [Role::Admin]);

        assert_eq!(
            resolve(&admin, &table, &descriptor),
            Decision::Deny(DenyReason::NotAllowListed)
        );
    }

    #[test]
    fn allow_list_ignores_required_roles() {
        let descriptor = CapabilityDescriptor::new("fincheck.special")
            .requires([Role::FincheckReports])
            .allow_ids(["TL09"]);

        assert_eq!(
            resolve(&clerk(), &fincheck_table(), &descriptor),
            Decision::Deny(DenyReason::NotAllowListed)
        );
    }

    #[test]
    fn empty_table_fails_closed() {
        for descriptor in sample_descriptors() {
            assert!(!resolve(&clerk(), &RoleTable::empty(), &descriptor).is_granted());
        }
    }

    #[test]
    fn descriptor_without_requirements_is_denied_to_non_admins() {
        assert_eq!(
            resolve(&clerk(), &fincheck_table(), &CapabilityDescriptor::new("home")),
            Decision::Deny(DenyReason::NoRequirement)
        );
    }

    #[test]
    fn deny_maps_to_authorization_denied() {
        let descriptor = CapabilityDescriptor::new("fincheck.config").requires([Role::FincheckConfig]);
        let err = resolve(&clerk(), &fincheck_table(), &descriptor)
            .into_result(&descriptor)
            .unwrap_err();

        assert_eq!(err, SessionError::authorization_denied("fincheck.config"));
        assert!(!err.is_fatal());
    }
}
