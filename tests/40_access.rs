mod common;

use anyhow::Result;
use fincheck_session::access::{CapabilityDescriptor, Decision, DenyReason, GrantReason, Role};
use fincheck_session::collab::{CollabError, LoginGrant};
use fincheck_session::{Principal, SessionError};

use common::{credentials, lone_context, record, MockBackend};

fn menu() -> Vec<CapabilityDescriptor> {
    vec![
        CapabilityDescriptor::new("fincheck.inspection").requires([Role::FincheckInspection]),
        CapabilityDescriptor::new("fincheck.reports").requires([Role::FincheckReports]),
        CapabilityDescriptor::new("fincheck.config").requires([Role::FincheckConfig]),
        CapabilityDescriptor::new("qc.special").allow_ids(["TL04", "TL09"]),
        CapabilityDescriptor::new("maintenance").requires([Role::FincheckReports]).locked(),
    ]
}

fn login_as(backend: &MockBackend, principal: Principal) {
    backend.set_login(Ok(LoginGrant {
        access_token: format!("access-{}", principal.id),
        refresh_token: format!("refresh-{}", principal.id),
        principal,
    }));
}

fn standard_table(backend: &MockBackend) {
    backend.set_role_table(Ok(vec![
        record("Fincheck Reports", &["QA Clerk"], &[]),
        record("Fincheck Inspection", &["QA Clerk", "Inspector"], &[]),
        record("Admin", &[], &["E300"]),
        record("Fincheck Reprots", &["QA Clerk"], &[]),
    ]));
}

#[tokio::test]
async fn clerk_sees_only_what_the_job_title_grants() -> Result<()> {
    let backend = MockBackend::new();
    standard_table(&backend);
    let (ctx, _storage) = lone_context(&backend);
    ctx.sign_in(&credentials("ana", "secret")).await?;
    ctx.load_access().await?;

    let menu = menu();
    let visible: Vec<&str> = ctx.visible(&menu).into_iter().map(|d| d.key.as_str()).collect();
    assert_eq!(visible, vec!["fincheck.inspection", "fincheck.reports"]);

    assert_eq!(
        ctx.can(&menu[1]),
        Decision::Grant(GrantReason::RoleMatch(Role::FincheckReports))
    );
    assert_eq!(
        ctx.require(&menu[2]).unwrap_err(),
        SessionError::authorization_denied("fincheck.config")
    );
    assert_eq!(ctx.can(&menu[4]), Decision::Deny(DenyReason::Locked));
    Ok(())
}

#[tokio::test]
async fn super_admin_sees_everything_open_but_not_locked_or_foreign_allow_lists() -> Result<()> {
    let backend = MockBackend::new();
    standard_table(&backend);
    backend.set_principal_roles("SA1", &["Super Admin"]);
    login_as(&backend, Principal::new("SA1", "Root", "IT Support"));

    let (ctx, _storage) = lone_context(&backend);
    ctx.sign_in(&credentials("root", "secret")).await?;
    ctx.load_access().await?;

    let menu = menu();
    let visible: Vec<&str> = ctx.visible(&menu).into_iter().map(|d| d.key.as_str()).collect();
    assert_eq!(visible, vec!["fincheck.inspection", "fincheck.reports", "fincheck.config"]);
    assert_eq!(ctx.can(&menu[0]), Decision::Grant(GrantReason::AdminOverride));
    Ok(())
}

#[tokio::test]
async fn allow_listed_team_lead_gets_the_special_feature_only() -> Result<()> {
    let backend = MockBackend::new();
    standard_table(&backend);
    login_as(&backend, Principal::new("TL04", "Lina", "Team Lead"));

    let (ctx, _storage) = lone_context(&backend);
    ctx.sign_in(&credentials("lina", "secret")).await?;
    ctx.load_access().await?;

    let menu = menu();
    let visible: Vec<&str> = ctx.visible(&menu).into_iter().map(|d| d.key.as_str()).collect();
    assert_eq!(visible, vec!["qc.special"]);
    Ok(())
}

#[tokio::test]
async fn admin_outside_allow_list_is_denied() -> Result<()> {
    let backend = MockBackend::new();
    standard_table(&backend);
    backend.set_principal_roles("TL01", &["Admin"]);
    login_as(&backend, Principal::new("TL01", "Bora", "Team Lead"));

    let (ctx, _storage) = lone_context(&backend);
    ctx.sign_in(&credentials("bora", "secret")).await?;
    ctx.load_access().await?;

    let menu = menu();
    assert_eq!(ctx.can(&menu[3]), Decision::Deny(DenyReason::NotAllowListed));
    assert!(ctx.can(&menu[2]).is_granted());
    Ok(())
}

#[tokio::test]
async fn nothing_is_granted_before_the_table_loads_or_after_logout() -> Result<()> {
    let backend = MockBackend::new();
    standard_table(&backend);
    let (ctx, _storage) = lone_context(&backend);
    let menu = menu();

    assert_eq!(ctx.can(&menu[1]), Decision::Deny(DenyReason::NoPrincipal));

    ctx.sign_in(&credentials("ana", "secret")).await?;
    assert!(!ctx.access().is_loaded());
    assert!(ctx.visible(&menu).is_empty());

    ctx.load_access().await?;
    assert!(ctx.can(&menu[1]).is_granted());

    ctx.sign_out();
    assert_eq!(ctx.can(&menu[1]), Decision::Deny(DenyReason::NoPrincipal));
    assert!(ctx.visible(&menu).is_empty());
    Ok(())
}

#[tokio::test]
async fn failed_table_fetch_keeps_previous_snapshot() -> Result<()> {
    let backend = MockBackend::new();
    standard_table(&backend);
    let (ctx, _storage) = lone_context(&backend);
    ctx.sign_in(&credentials("ana", "secret")).await?;
    ctx.load_access().await?;

    backend.set_role_table(Err(CollabError::Transient("503 Service Unavailable".into())));
    let err = ctx.load_access().await.unwrap_err();
    assert!(matches!(err, SessionError::TransientNetwork(_)));

    assert_eq!(ctx.access().snapshot().assignments().len(), 3);
    assert!(ctx.can(&menu()[1]).is_granted());
    Ok(())
}
