//! Profile registry
//!
//! Provides [`ProfileRegistry`], the id → descriptor mapping used by every run.
//! The registry always holds a default profile, so [`ProfileRegistry::lookup`]
//! is total: stale or corrupted ids resolve to the default descriptor.

use crate::builtin;
use crate::error::ProfileError;
use crate::profile::{ExecutionProfile, ProfileId};
use once_cell::sync::Lazy;
use std::collections::HashMap;

static BUILTIN: Lazy<ProfileRegistry> = Lazy::new(ProfileRegistry::with_defaults);

/// Registry of execution profiles
///
/// Profiles keep their registration order, which is also the order in which
/// detectors are evaluated during auto-resolution.
#[derive(Debug, Clone)]
pub struct ProfileRegistry {
    profiles: Vec<ExecutionProfile>,
    index: HashMap<ProfileId, usize>,
    default: ProfileId,
}

impl ProfileRegistry {
    /// Create registry holding only the given default profile
    #[must_use]
    pub fn new(default: ExecutionProfile) -> Self {
        let id = default.id.clone();
        let mut registry = Self {
            profiles: Vec::new(),
            index: HashMap::new(),
            default: id,
        };
        registry.register(default);
        registry
    }

    /// Create registry with built-in profiles
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new(builtin::vanilla());
        registry.register(builtin::threejs());
        registry
    }

    /// Shared registry of built-in profiles
    #[inline]
    #[must_use]
    pub fn builtin() -> &'static Self {
        &BUILTIN
    }

    /// Register a profile
    ///
    /// A profile with an already registered id replaces the old descriptor in
    /// place and the old one is returned.
    pub fn register(&mut self, profile: ExecutionProfile) -> Option<ExecutionProfile> {
        if let Some(&slot) = self.index.get(&profile.id) {
            return Some(std::mem::replace(&mut self.profiles[slot], profile));
        }
        self.index.insert(profile.id.clone(), self.profiles.len());
        self.profiles.push(profile);
        None
    }

    /// Remove a profile
    ///
    /// The default profile cannot be removed; `None` is returned for it and for
    /// unknown ids.
    pub fn remove(&mut self, id: &str) -> Option<ExecutionProfile> {
        if id == self.default.as_str() {
            return None;
        }
        let slot = self.index.remove(id)?;
        let removed = self.profiles.remove(slot);
        for position in self.index.values_mut() {
            if *position > slot {
                *position -= 1;
            }
        }
        Some(removed)
    }

    /// Make a registered profile the default
    ///
    /// # Errors
    /// Returns [`ProfileError::UnknownProfile`] if `id` is not registered
    pub fn set_default(&mut self, id: &str) -> Result<(), ProfileError> {
        let slot = self
            .index
            .get(id)
            .ok_or_else(|| ProfileError::UnknownProfile(id.to_string()))?;
        self.default = self.profiles[*slot].id.clone();
        Ok(())
    }

    /// Check if profile exists
    #[inline]
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Strict lookup, `None` for unknown ids
    #[inline]
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&ExecutionProfile> {
        self.index.get(id).map(|&slot| &self.profiles[slot])
    }

    /// Lookup with fallback to the default profile
    #[must_use]
    pub fn lookup(&self, id: &str) -> &ExecutionProfile {
        match self.get(id) {
            Some(profile) => profile,
            None => {
                tracing::debug!(
                    requested = id,
                    fallback = %self.default,
                    "registry miss, using default profile"
                );
                self.default_profile()
            }
        }
    }

    /// Id of the default profile
    #[inline]
    #[must_use]
    pub fn default_id(&self) -> &ProfileId {
        &self.default
    }

    /// The default profile descriptor
    #[must_use]
    pub fn default_profile(&self) -> &ExecutionProfile {
        // `default` is registered on construction and can never be removed
        let slot = self.index.get(&self.default).copied().unwrap_or(0);
        &self.profiles[slot]
    }

    /// Registered ids in registration order
    #[must_use]
    pub fn ids(&self) -> Vec<&ProfileId> {
        self.profiles.iter().map(|p| &p.id).collect()
    }

    /// Iterate over profiles in registration order
    pub fn iter(&self) -> impl Iterator<Item = &ExecutionProfile> {
        self.profiles.iter()
    }

    /// Get number of registered profiles
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    /// Check if registry is empty (never true, the default is always present)
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

impl Default for ProfileRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
