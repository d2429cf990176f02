//! Framework resolution
//!
//! [`FrameworkResolver`] maps `(source, selection)` to a concrete profile id.
//! Explicit selections are trusted verbatim; `auto` evaluates an ordered list
//! of [`Detector`]s and falls back to the default id when none match.

use crate::error::ProfileError;
use crate::profile::{DetectionRule, ProfileId, Selection};
use crate::registry::ProfileRegistry;
use regex::{Regex, RegexBuilder};

/// Content detector for one profile
///
/// Implement this trait to recognise a framework by something other than
/// regular expressions.
pub trait Detector: Send + Sync + 'static {
    /// Profile selected when this detector matches
    fn profile(&self) -> &ProfileId;

    /// Check if the source text shows characteristic usage of the framework
    fn matches(&self, source: &str) -> bool;
}

/// Regex-based detector built from a [`DetectionRule`]
#[derive(Debug, Clone)]
pub struct PatternDetector {
    profile: ProfileId,
    patterns: Vec<Regex>,
}

impl PatternDetector {
    /// Compile detector for profile
    ///
    /// # Errors
    /// Returns [`ProfileError::InvalidPattern`] if a pattern does not compile
    pub fn new(profile: ProfileId, rule: &DetectionRule) -> Result<Self, ProfileError> {
        let patterns = rule
            .patterns
            .iter()
            .map(|pattern| {
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| ProfileError::invalid_pattern(profile.as_str(), e))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { profile, patterns })
    }
}

impl Detector for PatternDetector {
    fn profile(&self) -> &ProfileId {
        &self.profile
    }

    fn matches(&self, source: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(source))
    }
}

/// Resolves the profile for a run
pub struct FrameworkResolver {
    detectors: Vec<Box<dyn Detector>>,
    default: ProfileId,
}

impl std::fmt::Debug for FrameworkResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameworkResolver")
            .field("detectors", &self.detector_order())
            .field("default", &self.default)
            .finish()
    }
}

impl FrameworkResolver {
    /// Create resolver without detectors
    #[inline]
    #[must_use]
    pub fn new(default: ProfileId) -> Self {
        Self {
            detectors: Vec::new(),
            default,
        }
    }

    /// Build resolver from registry
    ///
    /// Every profile with a non-empty detection rule contributes one detector,
    /// in registration order.
    ///
    /// # Errors
    /// Returns [`ProfileError::InvalidPattern`] for a pattern that does not compile
    pub fn from_registry(registry: &ProfileRegistry) -> Result<Self, ProfileError> {
        let mut resolver = Self::new(registry.default_id().clone());
        for profile in registry.iter().filter(|p| p.is_detectable()) {
            if let Some(rule) = &profile.detection {
                resolver.push(PatternDetector::new(profile.id.clone(), rule)?);
            }
        }
        Ok(resolver)
    }

    /// Append a detector (evaluated after those already present)
    pub fn push<D: Detector>(&mut self, detector: D) {
        self.detectors.push(Box::new(detector));
    }

    /// Resolve profile id for a run
    ///
    /// Total and deterministic: the result depends only on `source` and
    /// `selection`.
    #[must_use]
    pub fn resolve(&self, source: &str, selection: &Selection) -> ProfileId {
        match selection {
            Selection::Profile(id) => id.clone(),
            Selection::Auto => self.detect(source),
        }
    }

    /// Run detectors only, first match wins
    #[must_use]
    pub fn detect(&self, source: &str) -> ProfileId {
        self.detectors
            .iter()
            .find(|d| d.matches(source))
            .map_or_else(|| self.default.clone(), |d| d.profile().clone())
    }

    /// Default id returned when nothing matches
    #[inline]
    #[must_use]
    pub fn default_id(&self) -> &ProfileId {
        &self.default
    }

    /// Profiles of the registered detectors, in evaluation order
    #[must_use]
    pub fn detector_order(&self) -> Vec<&ProfileId> {
        self.detectors.iter().map(|d| d.profile()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> FrameworkResolver {
        FrameworkResolver::from_registry(&ProfileRegistry::with_defaults()).unwrap()
    }

    #[test]
    fn detects_three_namespace() {
        let r = resolver();
        assert_eq!(r.detect("const scene = new THREE.Scene();").as_str(), "threejs");
        assert_eq!(r.detect("THREE.MathUtils.clamp(1, 0, 2)").as_str(), "threejs");
    }

    #[test]
    fn detects_three_imports() {
        let r = resolver();
        assert_eq!(r.detect("import * as THREE from 'x';").as_str(), "threejs");
        assert_eq!(r.detect("import { Scene } from \"three\";").as_str(), "threejs");
        assert_eq!(r.detect("const T = require('three');").as_str(), "threejs");
    }

    #[test]
    fn plain_code_uses_default() {
        let r = resolver();
        assert_eq!(r.detect("console.log('hi', 42)").as_str(), "vanilla");
        assert_eq!(r.detect("").as_str(), "vanilla");
    }

    #[test]
    fn explicit_selection_is_verbatim() {
        let r = resolver();
        let id = r.resolve("new THREE.Scene()", &Selection::profile("vanilla"));
        assert_eq!(id.as_str(), "vanilla");

        let id = r.resolve("", &Selection::profile("not-registered"));
        assert_eq!(id.as_str(), "not-registered");
    }

    #[test]
    fn first_matching_detector_wins() {
        struct Always(ProfileId);
        impl Detector for Always {
            fn profile(&self) -> &ProfileId {
                &self.0
            }
            fn matches(&self, _source: &str) -> bool {
                true
            }
        }

        let mut r = resolver();
        r.push(Always(ProfileId::new("catch-all")));

        assert_eq!(r.detect("new THREE.Scene()").as_str(), "threejs");
        assert_eq!(r.detect("let x = 1;").as_str(), "catch-all");
        assert_eq!(r.detector_order().len(), 2);
    }

    #[test]
    fn invalid_pattern_rejected() {
        let rule = DetectionRule::new(["(unclosed"]);
        let err = PatternDetector::new(ProfileId::new("broken"), &rule).unwrap_err();
        assert!(matches!(err, ProfileError::InvalidPattern { .. }));
    }

    #[test]
    fn resolver_debug() {
        let debug = format!("{:?}", resolver());
        assert!(debug.contains("FrameworkResolver"));
        assert!(debug.contains("threejs"));
    }
}
