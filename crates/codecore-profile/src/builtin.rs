//! Built-in profiles
//!
//! - `vanilla`: plain script on a light page, the default
//! - `threejs`: three.js loaded from a CDN on a black full-bleed canvas page

use crate::profile::{
    DetectionRule, ExecutionProfile, InstrumentationVariant, ResourceDependency, StylingRules,
};

/// Id of the default profile
pub const DEFAULT_PROFILE_ID: &str = "vanilla";

/// Id of the three.js profile
pub const THREEJS_PROFILE_ID: &str = "threejs";

/// three.js build loaded by the `threejs` profile
pub const THREEJS_CDN: &str = "https://cdn.jsdelivr.net/npm/three@0.167.1/build/three.min.js";

const ERROR_PANEL_CSS: &str = "position: fixed; top: 10px; left: 10px; \
background: rgba(255,0,0,0.9); color: white; padding: 10px; border-radius: 4px; \
max-width: 80%; max-height: 80%; overflow: auto; z-index: 9999; font-family: monospace;";

const CONSOLE_PANEL_CSS: &str = "position: fixed; bottom: 10px; left: 10px; \
background: rgba(0,0,0,0.9); color: #0f0; padding: 10px; border-radius: 4px; \
max-width: 80%; max-height: 40%; overflow: auto; font-family: monospace; font-size: 12px;";

fn panel_styling(body: &str) -> StylingRules {
    StylingRules {
        body: body.to_string(),
        error_panel: ERROR_PANEL_CSS.to_string(),
        console_panel: CONSOLE_PANEL_CSS.to_string(),
    }
}

/// Plain script profile
#[must_use]
pub fn vanilla() -> ExecutionProfile {
    ExecutionProfile::new(
        DEFAULT_PROFILE_ID,
        "Vanilla JS",
        panel_styling("margin: 0; background: #f0f0f0; font-family: Arial;"),
        InstrumentationVariant::new("contained", false),
    )
}

/// three.js profile
///
/// Recognised by references to the `THREE` namespace, namespace imports bound
/// to `THREE`, and imports or requires of the `three` package.
#[must_use]
pub fn threejs() -> ExecutionProfile {
    ExecutionProfile::new(
        THREEJS_PROFILE_ID,
        "Three.js",
        panel_styling("margin: 0; overflow: hidden; background: #000; font-family: Arial;"),
        InstrumentationVariant::new("forwarding", true),
    )
    .with_resource(ResourceDependency::script(THREEJS_CDN))
    .with_detection(DetectionRule::new([
        r"THREE\.",
        r"new\s+THREE\.",
        r"import\s+\*?\s+as\s+THREE",
        r#"from\s+['"]three"#,
        r#"require\(\s*['"]three['"]"#,
    ]))
}

/// All built-in profiles, default first
#[must_use]
pub fn all() -> Vec<ExecutionProfile> {
    vec![vanilla(), threejs()]
}
