use std::collections::BTreeSet;

use super::role::Role;

/// Declarative access requirements of one protected feature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityDescriptor {
    pub key: String,
    pub required_roles: BTreeSet<Role>,
    pub allow_list_ids: BTreeSet<String>,
    pub locked: bool,
}

impl CapabilityDescriptor {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            required_roles: BTreeSet::new(),
            allow_list_ids: BTreeSet::new(),
            locked: false,
        }
    }

    pub fn requires(mut self, roles: impl IntoIterator<Item = Role>) -> Self {
        self.required_roles.extend(roles);
        self
    }

    /// Restrict the feature to these principal ids. Role checks are skipped
    /// entirely for descriptors with an allow-list.
    pub fn allow_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allow_list_ids.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn locked(mut self) -> Self {
        self.locked = true;
        self
    }

    pub fn has_allow_list(&self) -> bool {
        !self.allow_list_ids.is_empty()
    }
}
