//! Error types for profile registration and detection

/// Errors raised while building registries or resolvers
///
/// Lookups and resolution themselves never fail; these only surface when
/// profiles are configured.
#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    /// Detection pattern is not a valid regular expression
    #[error("invalid detection pattern for profile '{profile}': {source}")]
    InvalidPattern {
        /// Profile the pattern belongs to
        profile: String,
        /// Underlying regex error
        #[source]
        source: regex::Error,
    },

    /// Profile id is empty or whitespace
    #[error("profile id must not be empty")]
    EmptyId,

    /// Referenced profile is not registered
    #[error("unknown profile: '{0}'")]
    UnknownProfile(String),
}

impl ProfileError {
    /// Create invalid pattern error for profile
    pub fn invalid_pattern(profile: impl Into<String>, source: regex::Error) -> Self {
        Self::InvalidPattern {
            profile: profile.into(),
            source,
        }
    }
}
