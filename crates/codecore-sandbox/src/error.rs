//! Error types for the sandbox
//!
//! Only orchestration-level failures are errors here. Exceptions and console
//! errors raised by user code are captured inside the execution context and
//! never surface as a Rust error.

use codecore_document::SynthesisError;
use codecore_profile::ProfileError;
use std::path::PathBuf;

/// Main sandbox error type
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// Profile configuration is invalid
    #[error("profile error: {0}")]
    Profile(#[from] ProfileError),

    /// Document could not be built
    #[error("synthesis failed: {0}")]
    Synthesis(#[from] SynthesisError),

    /// Document could not be loaded
    #[error("host failed: {0}")]
    Host(#[from] HostError),

    /// Persisted state could not be read or written
    #[error("store failed: {0}")]
    Store(#[from] StoreError),

    /// Configuration could not be loaded
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl SandboxError {
    /// Check if the failure happened while building or loading a run's
    /// document; these are reported through the status indicator and the
    /// host keeps running
    #[inline]
    #[must_use]
    pub fn is_synthesis_failure(&self) -> bool {
        matches!(self, Self::Synthesis(_) | Self::Host(_))
    }
}

/// Isolation host failures
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// Writing the surface failed
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Script engine could not be created
    #[error("engine init failed: {0}")]
    Engine(String),

    /// Blocking worker died
    #[error("worker failed: {0}")]
    Worker(String),
}

impl HostError {
    /// Create engine error
    pub fn engine(msg: impl std::fmt::Display) -> Self {
        Self::Engine(msg.to_string())
    }
}

/// Persisted state failures
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Backing file is not a flat JSON string map
    #[error("malformed state file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration failures
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("cannot read {path}: {source}")]
    Io {
        /// Config path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for [`crate::SandboxConfig`]
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A configured profile is invalid
    #[error("invalid profile: {0}")]
    Profile(#[from] ProfileError),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, SandboxError>;
