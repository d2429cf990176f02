//! Sandbox configuration
//!
//! Loaded from TOML; every field has a default, so an empty file is a valid
//! configuration.
//!
//! ```toml
//! debounce_ms = 1000
//! status_revert_ms = 2000
//! max_source_bytes = 1048576
//!
//! [headless]
//! timeout_ms = 5000
//! memory_limit = 67108864
//! max_ticks = 1000
//!
//! [storage]
//! code_key = "codecore_code"
//! framework_key = "codecore_framework"
//! ```
//!
//! Extra profiles can be declared as `[[profiles]]` tables; one with a
//! built-in id replaces that built-in.

use crate::error::ConfigError;
use crate::headless::HeadlessConfig;
use crate::store::StorageKeys;
use codecore_document::synthesize::DEFAULT_MAX_SOURCE_BYTES;
use codecore_profile::{ExecutionProfile, PatternDetector, ProfileRegistry};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Sandbox configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Quiet interval after the last edit before a run
    pub debounce_ms: u64,
    /// Time a status message stays before reverting to ready
    pub status_revert_ms: u64,
    /// Largest accepted source text in bytes
    pub max_source_bytes: usize,
    /// Headless engine limits
    pub headless: HeadlessConfig,
    /// Persisted state keys
    pub storage: StorageKeys,
    /// Additional profiles, registered after the built-ins
    pub profiles: Vec<ExecutionProfile>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 1_000,
            status_revert_ms: 2_000,
            max_source_bytes: DEFAULT_MAX_SOURCE_BYTES,
            headless: HeadlessConfig::default(),
            storage: StorageKeys::default(),
            profiles: Vec::new(),
        }
    }
}

impl SandboxConfig {
    /// Parse TOML text and check the configured profiles
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every configured detection pattern compiles
    pub fn validate(&self) -> Result<(), ConfigError> {
        for profile in &self.profiles {
            if let Some(rule) = &profile.detection {
                PatternDetector::new(profile.id.clone(), rule)?;
            }
        }
        Ok(())
    }

    /// Load TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// With debounce interval
    #[must_use]
    pub fn with_debounce_ms(mut self, ms: u64) -> Self {
        self.debounce_ms = ms;
        self
    }

    /// With status revert interval
    #[must_use]
    pub fn with_status_revert_ms(mut self, ms: u64) -> Self {
        self.status_revert_ms = ms;
        self
    }

    /// With source size limit
    #[must_use]
    pub fn with_max_source_bytes(mut self, bytes: usize) -> Self {
        self.max_source_bytes = bytes;
        self
    }

    /// With headless limits
    #[must_use]
    pub fn with_headless(mut self, headless: HeadlessConfig) -> Self {
        self.headless = headless;
        self
    }

    /// With an additional profile
    #[must_use]
    pub fn with_profile(mut self, profile: ExecutionProfile) -> Self {
        self.profiles.push(profile);
        self
    }

    /// Debounce interval
    #[inline]
    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Status revert interval
    #[inline]
    #[must_use]
    pub fn status_revert(&self) -> Duration {
        Duration::from_millis(self.status_revert_ms)
    }

    /// Built-in profiles plus the configured ones
    #[must_use]
    pub fn registry(&self) -> ProfileRegistry {
        let mut registry = ProfileRegistry::with_defaults();
        for profile in &self.profiles {
            if registry.register(profile.clone()).is_some() {
                tracing::debug!(profile = %profile.id, "configured profile replaces built-in");
            }
        }
        registry
    }
}
