//! Role-based access control.
//!
//! `resolve` is the pure decision function. `AccessResolver` keeps the last
//! good role table for a context and answers capability checks against it.

pub mod descriptor;
pub mod resolver;
pub mod role;
pub mod table;

pub use descriptor::CapabilityDescriptor;
pub use resolver::{resolve, Decision, DenyReason, GrantReason};
pub use role::{Role, RoleParseError};
pub use table::{RoleAssignment, RoleTable};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::collab::RoleSource;
use crate::error::SessionError;
use crate::types::Principal;

/// Cached role table for one context
pub struct AccessResolver {
    source: Arc<dyn RoleSource>,
    table: RwLock<RoleTable>,
    loaded: AtomicBool,
}

impl AccessResolver {
    pub fn new(source: Arc<dyn RoleSource>) -> Self {
        Self {
            source,
            table: RwLock::new(RoleTable::empty()),
            loaded: AtomicBool::new(false),
        }
    }

    /// Fetch the role table. On failure the previous snapshot stays in place
    /// (or the empty, deny-everything table if none was ever loaded).
    pub async fn refresh_table(&self) -> Result<usize, SessionError> {
        let records = match self.source.get_role_assignments().await {
            Ok(records) => records,
            Err(e) => {
                warn!("Role table fetch failed, keeping previous snapshot: {}", e);
                return Err(e.into());
            }
        };

        let (fetched, rejected) = RoleTable::from_records(records);
        for err in &rejected {
            warn!("Dropping role table row: {}", err);
        }

        let count = fetched.assignments().len();
        self.table.write().replace_assignments(fetched.into_assignments());
        self.loaded.store(true, Ordering::Release);

        info!("Loaded role table: {} assignments ({} rejected)", count, rejected.len());
        Ok(count)
    }

    /// Fetch and cache the explicit roles of one principal
    pub async fn load_principal_roles(&self, principal_id: &str) -> Result<Vec<Role>, SessionError> {
        let response = match self.source.get_principal_roles(principal_id).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Role lookup for principal '{}' failed: {}", principal_id, e);
                return Err(e.into());
            }
        };

        let mut roles = Vec::with_capacity(response.roles.len());
        for name in &response.roles {
            match name.parse::<Role>() {
                Ok(role) => roles.push(role),
                Err(e) => warn!("Ignoring role of principal '{}': {}", principal_id, e),
            }
        }

        self.table
            .write()
            .set_principal_roles(principal_id, roles.iter().copied());
        debug!("Cached {} explicit roles for principal '{}'", roles.len(), principal_id);
        Ok(roles)
    }

    /// Drop cached roles of a principal after a session change
    pub fn forget_principal(&self, principal_id: &str) {
        self.table.write().forget_principal(principal_id);
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> RoleTable {
        self.table.read().clone()
    }

    pub fn check(&self, principal: &Principal, descriptor: &CapabilityDescriptor) -> Decision {
        let decision = resolve(principal, &self.table.read(), descriptor);
        debug!("Access '{}' for '{}': {:?}", descriptor.key, principal.id, decision);
        decision
    }

    /// Like `check`, mapping a deny to `AuthorizationDenied`
    pub fn require(&self, principal: &Principal, descriptor: &CapabilityDescriptor) -> Result<GrantReason, SessionError> {
        self.check(principal, descriptor).into_result(descriptor)
    }

    /// Descriptors the principal may see, in input order. Used to compose menus.
    pub fn visible<'a, I>(&self, principal: &Principal, descriptors: I) -> Vec<&'a CapabilityDescriptor>
    where
        I: IntoIterator<Item = &'a CapabilityDescriptor>,
    {
        let table = self.table.read();
        descriptors
            .into_iter()
            .filter(|descriptor| resolve(principal, &table, descriptor).is_granted())
            .collect()
    }
}
