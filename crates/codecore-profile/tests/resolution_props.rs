//! Property tests for profile resolution
//!
//! Run with: cargo test --package codecore-profile --test resolution_props

use codecore_profile::builtin::{DEFAULT_PROFILE_ID, THREEJS_PROFILE_ID};
use codecore_profile::{FrameworkResolver, ProfileRegistry, Selection};
use proptest::prelude::*;

fn resolver() -> FrameworkResolver {
    FrameworkResolver::from_registry(ProfileRegistry::builtin()).unwrap()
}

fn plain_source() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 ;(){}.=,'\"\n]{0,200}"
        .prop_filter("must not mention three", |s| !s.to_lowercase().contains("three"))
}

const MARKERS: &[&str] = &[
    "new THREE.Scene()",
    "THREE.Vector3",
    "import * as THREE from './lib.js'",
    "import { WebGLRenderer } from 'three'",
    "const three = require(\"three\")",
];

proptest! {
    #[test]
    fn unmarked_source_resolves_to_default(source in plain_source()) {
        let id = resolver().resolve(&source, &Selection::Auto);
        prop_assert_eq!(id.as_str(), DEFAULT_PROFILE_ID);
    }

    #[test]
    fn marked_source_resolves_to_threejs(
        prefix in plain_source(),
        suffix in plain_source(),
        marker in proptest::sample::select(MARKERS),
    ) {
        let source = format!("{prefix}\n{marker}\n{suffix}");
        let id = resolver().resolve(&source, &Selection::Auto);
        prop_assert_eq!(id.as_str(), THREEJS_PROFILE_ID);
    }

    #[test]
    fn resolution_is_deterministic(source in ".{0,300}", explicit in "[a-z]{0,12}") {
        let selection: Selection = explicit.parse().unwrap();
        let r = resolver();
        prop_assert_eq!(r.resolve(&source, &selection), r.resolve(&source, &selection));
    }

    #[test]
    fn explicit_selection_wins_over_content(id in "[a-z][a-z0-9-]{0,15}") {
        prop_assume!(id != "auto");
        let selection = Selection::profile(id.as_str());
        let resolved = resolver().resolve("new THREE.Scene()", &selection);
        prop_assert_eq!(resolved.as_str(), id.as_str());
    }

    #[test]
    fn lookup_never_fails(id in ".{0,40}") {
        let registry = ProfileRegistry::builtin();
        let profile = registry.lookup(&id);
        if registry.contains(&id) {
            prop_assert_eq!(profile.id.as_str(), id.as_str());
        } else {
            prop_assert_eq!(profile.id.as_str(), DEFAULT_PROFILE_ID);
        }
    }
}
