//! Execution profile descriptors
//!
//! An [`ExecutionProfile`] is an immutable bundle of everything that varies
//! between frameworks: which external scripts load before user code, how the
//! page and capture panels are styled, which instrumentation variant applies,
//! and how the profile is recognised in source text.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::convert::Infallible;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Sentinel selection value that asks for content detection
pub const AUTO: &str = "auto";

/// Identifier of a registered profile
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileId(String);

impl ProfileId {
    /// Create profile id
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get id as string slice
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ProfileId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProfileId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ProfileId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Borrow<str> for ProfileId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ProfileId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The user's profile choice
///
/// Persisted and parsed as a plain string: `"auto"` (or an empty string)
/// requests detection, anything else names a profile verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Selection {
    /// Detect the profile from the source text
    #[default]
    Auto,
    /// Use this profile id as-is
    Profile(ProfileId),
}

impl Selection {
    /// Create explicit selection
    #[inline]
    #[must_use]
    pub fn profile(id: impl Into<ProfileId>) -> Self {
        Self::Profile(id.into())
    }

    /// Check if this is the `auto` sentinel
    #[inline]
    #[must_use]
    pub fn is_auto(&self) -> bool {
        matches!(self, Self::Auto)
    }
}

impl FromStr for Selection {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed == AUTO {
            Ok(Self::Auto)
        } else {
            Ok(Self::Profile(ProfileId::new(trimmed)))
        }
    }
}

impl From<String> for Selection {
    fn from(s: String) -> Self {
        match s.parse() {
            Ok(selection) => selection,
            Err(never) => match never {},
        }
    }
}

impl From<Selection> for String {
    fn from(selection: Selection) -> Self {
        selection.to_string()
    }
}

impl Display for Selection {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str(AUTO),
            Self::Profile(id) => f.write_str(id.as_str()),
        }
    }
}

/// External script loaded before user code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDependency {
    /// Script URL
    pub url: String,
}

impl ResourceDependency {
    /// Create script dependency
    #[inline]
    #[must_use]
    pub fn script(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

/// Baseline CSS declarations for the page and both capture panels
///
/// Each field is the body of a declaration block, without selector or braces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StylingRules {
    /// Declarations for `body`
    pub body: String,
    /// Declarations for the error panel
    pub error_panel: String,
    /// Declarations for the console panel
    pub console_panel: String,
}

/// Instrumentation behaviour that differs between profiles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentationVariant {
    /// Variant name, emitted into the document for diagnostics
    pub name: String,
    /// Whether intercepted error/warning calls also reach the original channel
    pub forward_errors: bool,
}

impl InstrumentationVariant {
    /// Create variant
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>, forward_errors: bool) -> Self {
        Self {
            name: name.into(),
            forward_errors,
        }
    }
}

/// Source patterns that identify a framework
///
/// Patterns are regular expressions matched case-insensitively; any match
/// selects the owning profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionRule {
    /// Ordered regex patterns
    pub patterns: Vec<String>,
}

impl DetectionRule {
    /// Create rule from patterns
    #[must_use]
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }
}

/// Immutable execution profile descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionProfile {
    /// Profile id
    pub id: ProfileId,
    /// Human-readable label
    pub label: String,
    /// External scripts, in load order
    #[serde(default)]
    pub resources: Vec<ResourceDependency>,
    /// Page and panel styling
    pub styling: StylingRules,
    /// Instrumentation variant
    pub instrumentation: InstrumentationVariant,
    /// Content detection, if the profile can be auto-selected
    #[serde(default)]
    pub detection: Option<DetectionRule>,
}

impl ExecutionProfile {
    /// Create profile without resources or detection
    #[must_use]
    pub fn new(
        id: impl Into<ProfileId>,
        label: impl Into<String>,
        styling: StylingRules,
        instrumentation: InstrumentationVariant,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            resources: Vec::new(),
            styling,
            instrumentation,
            detection: None,
        }
    }

    /// With an additional external script (appended to load order)
    #[inline]
    #[must_use]
    pub fn with_resource(mut self, resource: ResourceDependency) -> Self {
        self.resources.push(resource);
        self
    }

    /// With detection rule
    #[inline]
    #[must_use]
    pub fn with_detection(mut self, rule: DetectionRule) -> Self {
        self.detection = Some(rule);
        self
    }

    /// Check if the profile takes part in auto-detection
    #[inline]
    #[must_use]
    pub fn is_detectable(&self) -> bool {
        self.detection
            .as_ref()
            .is_some_and(|rule| !rule.patterns.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_parse_auto() {
        assert_eq!("auto".parse::<Selection>().unwrap(), Selection::Auto);
        assert_eq!("".parse::<Selection>().unwrap(), Selection::Auto);
        assert_eq!("  auto ".parse::<Selection>().unwrap(), Selection::Auto);
    }

    #[test]
    fn selection_parse_explicit() {
        let selection: Selection = "threejs".parse().unwrap();
        assert_eq!(selection, Selection::profile("threejs"));
        assert!(!selection.is_auto());
    }

    #[test]
    fn selection_is_case_sensitive() {
        let selection: Selection = "AUTO".parse().unwrap();
        assert_eq!(selection, Selection::profile("AUTO"));
    }

    #[test]
    fn selection_display_roundtrip() {
        assert_eq!(Selection::Auto.to_string(), "auto");
        assert_eq!(Selection::profile("vanilla").to_string(), "vanilla");
    }

    #[test]
    fn selection_serde_as_string() {
        let json = serde_json::to_string(&Selection::profile("threejs")).unwrap();
        assert_eq!(json, "\"threejs\"");

        let back: Selection = serde_json::from_str("\"auto\"").unwrap();
        assert_eq!(back, Selection::Auto);
    }

    #[test]
    fn profile_id_borrow() {
        let mut map = std::collections::HashMap::new();
        map.insert(ProfileId::new("vanilla"), 1);
        assert_eq!(map.get("vanilla"), Some(&1));
    }

    #[test]
    fn profile_detectable() {
        let styling = StylingRules {
            body: String::new(),
            error_panel: String::new(),
            console_panel: String::new(),
        };
        let plain = ExecutionProfile::new(
            "plain",
            "Plain",
            styling,
            InstrumentationVariant::new("plain", false),
        );
        assert!(!plain.is_detectable());
        assert!(!plain.clone().with_detection(DetectionRule::default()).is_detectable());
        assert!(plain.with_detection(DetectionRule::new(["p5\\."])).is_detectable());
    }
}
