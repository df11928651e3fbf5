//! Profile id to store mapping.
//!
//! Each profile carries its own write gate inside its [`ProfileStore`], so
//! different personas reconcile fully in parallel; the registry itself is a
//! sharded concurrent map and never becomes a global write lock.

use std::sync::Arc;

use dashmap::DashMap;

use crate::profile::store::ProfileStore;

/// Concurrent map of profile id to live store.
#[derive(Debug, Default)]
pub struct ProfileRegistry {
    profiles: DashMap<String, Arc<ProfileStore>>,
}

impl ProfileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a live profile store.
    pub fn get(&self, profile_id: &str) -> Option<Arc<ProfileStore>> {
        self.profiles.get(profile_id).map(|entry| entry.clone())
    }

    /// Fetch the store for `profile_id`, creating it with `init` on first
    /// access. Racing callers converge on a single store.
    pub fn get_or_insert_with(
        &self,
        profile_id: &str,
        init: impl FnOnce() -> ProfileStore,
    ) -> Arc<ProfileStore> {
        self.profiles
            .entry(profile_id.to_string())
            .or_insert_with(|| Arc::new(init()))
            .clone()
    }

    /// Drop a profile from the registry, returning its store if present.
    /// Callers holding the returned `Arc` keep a detached store.
    pub fn remove(&self, profile_id: &str) -> Option<Arc<ProfileStore>> {
        self.profiles.remove(profile_id).map(|(_, store)| store)
    }

    pub fn contains(&self, profile_id: &str) -> bool {
        self.profiles.contains_key(profile_id)
    }

    /// Ids of every live profile, in no particular order.
    pub fn ids(&self) -> Vec<String> {
        self.profiles
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}
