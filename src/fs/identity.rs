//! Owner and group name resolution
//!
//! Numeric ids are resolved through an [`IdentityLookup`] and memoized in
//! an [`IdentityCache`] for the lifetime of one run. Unknown ids are
//! cached too, so the identity system is asked at most once per id
//! (modulo two resolvers racing on the same uncached id).

use nix::unistd::{Gid, Group, Uid, User};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

/// Identity lookup capability: numeric id to display name
pub trait IdentityLookup: Send + Sync {
    /// Resolve an id, `None` if the identity system does not know it
    fn lookup(&self, id: u32) -> Option<String>;
}

/// User names from the system user database
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemUsers;

impl IdentityLookup for SystemUsers {
    fn lookup(&self, id: u32) -> Option<String> {
        match User::from_uid(Uid::from_raw(id)) {
            Ok(user) => user.map(|u| u.name),
            Err(e) => {
                debug!(uid = id, error = %e, "User lookup failed");
                None
            }
        }
    }
}

/// Group names from the system group database
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemGroups;

impl IdentityLookup for SystemGroups {
    fn lookup(&self, id: u32) -> Option<String> {
        match Group::from_gid(Gid::from_raw(id)) {
            Ok(group) => group.map(|g| g.name),
            Err(e) => {
                debug!(gid = id, error = %e, "Group lookup failed");
                None
            }
        }
    }
}

/// Write-once-per-key memo of id -> name
pub struct IdentityCache {
    lookup: Box<dyn IdentityLookup>,
    names: RwLock<HashMap<u32, Option<String>>>,
}

impl IdentityCache {
    pub fn new(lookup: impl IdentityLookup + 'static) -> Self {
        Self {
            lookup: Box::new(lookup),
            names: RwLock::new(HashMap::new()),
        }
    }

    /// Cache backed by the system user database
    pub fn users() -> Self {
        Self::new(SystemUsers)
    }

    /// Cache backed by the system group database
    pub fn groups() -> Self {
        Self::new(SystemGroups)
    }

    /// Resolve an id, consulting the identity system only on first access
    pub fn resolve(&self, id: u32) -> Option<String> {
        if let Some(name) = self.names.read().get(&id) {
            return name.clone();
        }

        // Lookup runs without holding the lock; the first insert wins.
        let resolved = self.lookup.lookup(id);
        self.names
            .write()
            .entry(id)
            .or_insert(resolved)
            .clone()
    }

    /// Number of distinct ids seen
    pub fn len(&self) -> usize {
        self.names.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.read().is_empty()
    }
}

impl std::fmt::Debug for IdentityCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityCache")
            .field("entries", &self.len())
            .finish()
    }
}
