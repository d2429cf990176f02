//! CodeCore Profiles
//!
//! Execution profiles and the machinery that decides which one applies to a
//! piece of user code.
//!
//! # Core Concepts
//!
//! - [`ExecutionProfile`]: resources, styling and instrumentation variant for a run
//! - [`ProfileRegistry`]: id → profile mapping with a guaranteed default
//! - [`FrameworkResolver`]: turns `(source, selection)` into a concrete [`ProfileId`]
//! - [`Selection`]: the user's choice, either `auto` or an explicit id
//!
//! # Example
//!
//! ```rust
//! use codecore_profile::{FrameworkResolver, ProfileRegistry, Selection};
//!
//! let registry = ProfileRegistry::with_defaults();
//! let resolver = FrameworkResolver::from_registry(&registry).unwrap();
//!
//! let id = resolver.resolve("const scene = new THREE.Scene();", &Selection::Auto);
//! assert_eq!(id.as_str(), "threejs");
//!
//! // Unknown ids never fail, they fall back to the default descriptor
//! let profile = registry.lookup("no-such-profile");
//! assert_eq!(profile.id.as_str(), "vanilla");
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod builtin;
pub mod error;
pub mod profile;
pub mod registry;
pub mod resolver;

// Re-exports
pub use error::ProfileError;
pub use profile::{
    DetectionRule, ExecutionProfile, InstrumentationVariant, ProfileId, ResourceDependency,
    Selection, StylingRules,
};
pub use registry::ProfileRegistry;
pub use resolver::{Detector, FrameworkResolver, PatternDetector};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for profile resolution
    pub use crate::{
        Detector, ExecutionProfile, FrameworkResolver, InstrumentationVariant, ProfileId,
        ProfileRegistry, Selection,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod integration_tests {
    use super::*;

    #[test]
    fn resolve_then_lookup() {
        let registry = ProfileRegistry::with_defaults();
        let resolver = FrameworkResolver::from_registry(&registry).unwrap();

        let id = resolver.resolve("import * as THREE from 'three';", &Selection::Auto);
        let profile = registry.lookup(id.as_str());

        assert_eq!(profile.id, id);
        assert_eq!(profile.resources.len(), 1);
        assert!(profile.instrumentation.forward_errors);
    }

    #[test]
    fn explicit_default_selection_falls_back() {
        let registry = ProfileRegistry::with_defaults();
        let resolver = FrameworkResolver::from_registry(&registry).unwrap();

        let id = resolver.resolve("console.log(1)", &"default".parse().unwrap());
        assert_eq!(id.as_str(), "default");

        // "default" is not a registered id, so the registry fallback applies
        let profile = registry.lookup(id.as_str());
        assert_eq!(profile.id, *registry.default_id());
    }
}
