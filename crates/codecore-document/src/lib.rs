//! CodeCore Documents
//!
//! Builds the self-contained document that one sandbox run loads.
//!
//! # Architecture
//!
//! ```text
//! ExecutionProfile ──► InstrumentationInjector ──► InstrumentationFragment
//!        │                                                │
//!        └──────────────┐        SourceText ──┐           │
//!                       ▼                     ▼           ▼
//!                 DocumentSynthesizer (ordered fragment builders)
//!                       │
//!                       ▼
//!               SynthesizedDocument
//! ```
//!
//! Builders run in a fixed order: head, resources, styling, surfaces,
//! instrumentation, protective open, user payload, protective close. The
//! instrumentation therefore always precedes the first line of user code.
//!
//! # Example
//!
//! ```rust
//! use codecore_document::{DocumentSynthesizer, InstrumentationInjector, SourceText};
//! use codecore_profile::ProfileRegistry;
//!
//! let registry = ProfileRegistry::with_defaults();
//! let profile = registry.lookup("threejs");
//!
//! let fragment = InstrumentationInjector::new().produce(profile);
//! let source = SourceText::from("const scene = new THREE.Scene();");
//! let document = DocumentSynthesizer::new().synthesize(profile, &fragment, &source).unwrap();
//!
//! assert!(document.text().contains("three.min.js"));
//! assert!(document.script().contains("new THREE.Scene()"));
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod document;
pub mod error;
pub mod instrument;
pub mod surface;
pub mod synthesize;

// Re-exports
pub use document::{DocumentDigest, SourceText, SynthesizedDocument};
pub use error::SynthesisError;
pub use instrument::{InstrumentationFragment, InstrumentationInjector, SINK_BINDING};
pub use surface::SurfaceLayout;
pub use synthesize::{DocumentSynthesizer, DocumentWriter, FragmentBuilder, SynthesisInput};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for document synthesis
    pub use crate::{
        DocumentSynthesizer, InstrumentationFragment, InstrumentationInjector, SourceText,
        SurfaceLayout, SynthesizedDocument,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
