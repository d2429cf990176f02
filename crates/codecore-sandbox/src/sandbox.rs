//! Run orchestration
//!
//! ```text
//! SourceText + Selection
//!        │
//!        ▼
//! FrameworkResolver ──► ProfileId ──► ProfileRegistry::lookup ──► ExecutionProfile
//!                                                                   │
//!                         InstrumentationInjector::produce ◄────────┤
//!                                      │                            │
//!                                      ▼                            ▼
//!                               DocumentSynthesizer::synthesize ──► SynthesizedDocument
//!                                                                   │
//!                                                                   ▼
//!                                                     IsolationHost::load
//! ```
//!
//! Every run builds a new document and hands it to the host, which replaces
//! the previous context wholesale. Failures before or during the hand-off
//! are orchestration-level: they are logged, shown as a transient status
//! message and returned, and the sandbox stays usable.

use crate::capture::ContextId;
use crate::config::SandboxConfig;
use crate::error::SandboxError;
use crate::host::IsolationHost;
use crate::status::{StatusIndicator, RUNNING};
use codecore_document::{
    DocumentDigest, DocumentSynthesizer, InstrumentationInjector, SourceText, SurfaceLayout,
    SynthesizedDocument,
};
use codecore_profile::{ExecutionProfile, FrameworkResolver, ProfileId, ProfileRegistry, Selection};
use serde::Serialize;
use std::fmt::{self, Display, Formatter};
use ulid::Ulid;

/// What started a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunCause {
    /// Explicit run action
    Explicit,
    /// Profile selection changed
    SelectionChange,
    /// Debounced text edit
    Edit,
    /// Saved state restored
    Load,
    /// Editor cleared
    Clear,
}

impl Display for RunCause {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Explicit => "explicit",
            Self::SelectionChange => "selection_change",
            Self::Edit => "edit",
            Self::Load => "load",
            Self::Clear => "clear",
        };
        f.write_str(name)
    }
}

/// Summary of one run handed to the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Unique run id
    pub run_id: Ulid,
    /// What started the run
    pub cause: RunCause,
    /// Selection the run was requested with
    pub requested: Selection,
    /// Profile the document was built for
    pub profile: ProfileId,
    /// Digest of the document
    #[serde(serialize_with = "serialize_digest")]
    pub digest: DocumentDigest,
    /// Context occupying the host after the hand-off
    pub context: Option<ContextId>,
}

/// Serialize a digest as its hex string
pub(crate) fn serialize_digest<S: serde::Serializer>(
    digest: &DocumentDigest,
    s: S,
) -> Result<S::Ok, S::Error> {
    s.collect_str(digest)
}

/// Profile resolution, synthesis and hand-off to one isolation host
pub struct Sandbox<H> {
    registry: ProfileRegistry,
    resolver: FrameworkResolver,
    injector: InstrumentationInjector,
    synthesizer: DocumentSynthesizer,
    status: StatusIndicator,
    host: H,
}

impl<H> std::fmt::Debug for Sandbox<H> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sandbox")
            .field("profiles", &self.registry.ids())
            .field("detectors", &self.resolver.detector_order())
            .field("stages", &self.synthesizer.stages())
            .finish_non_exhaustive()
    }
}

impl<H: IsolationHost> Sandbox<H> {
    /// Create sandbox with the default configuration
    pub fn new(host: H) -> Result<Self, SandboxError> {
        Self::from_config(&SandboxConfig::default(), host)
    }

    /// Create sandbox from configuration
    pub fn from_config(config: &SandboxConfig, host: H) -> Result<Self, SandboxError> {
        Self::with_registry(config.registry(), config, host)
    }

    /// Create sandbox over an explicit registry
    pub fn with_registry(
        registry: ProfileRegistry,
        config: &SandboxConfig,
        host: H,
    ) -> Result<Self, SandboxError> {
        let resolver = FrameworkResolver::from_registry(&registry)?;
        Ok(Self {
            registry,
            resolver,
            injector: InstrumentationInjector::new(),
            synthesizer: DocumentSynthesizer::new().with_max_source_bytes(config.max_source_bytes),
            status: StatusIndicator::new(config.status_revert()),
            host,
        })
    }

    /// Use a custom panel layout for instrumentation and markup
    #[must_use]
    pub fn with_layout(mut self, layout: SurfaceLayout) -> Self {
        self.injector = self.injector.with_layout(layout.clone());
        self.synthesizer = self.synthesizer.with_layout(layout);
        self
    }

    /// Profile registry
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &ProfileRegistry {
        &self.registry
    }

    /// Framework resolver
    #[inline]
    #[must_use]
    pub fn resolver(&self) -> &FrameworkResolver {
        &self.resolver
    }

    /// Status indicator
    #[inline]
    #[must_use]
    pub fn status(&self) -> &StatusIndicator {
        &self.status
    }

    /// Isolation host
    #[inline]
    #[must_use]
    pub fn host(&self) -> &H {
        &self.host
    }

    /// Profile that applies to `source` under `selection`
    #[must_use]
    pub fn resolve(&self, source: &str, selection: &Selection) -> &ExecutionProfile {
        let id = self.resolver.resolve(source, selection);
        self.registry.lookup(id.as_str())
    }

    /// Build the document for `source` without running it
    pub fn render(
        &self,
        source: &SourceText,
        selection: &Selection,
    ) -> Result<SynthesizedDocument, SandboxError> {
        let profile = self.resolve(source.as_str(), selection);
        let fragment = self.injector.produce(profile);
        Ok(self.synthesizer.synthesize(profile, &fragment, source)?)
    }

    /// Run `source` as an explicit action
    pub async fn run(
        &self,
        source: &SourceText,
        selection: &Selection,
    ) -> Result<RunReport, SandboxError> {
        self.run_for(RunCause::Explicit, source, selection).await
    }

    /// Run `source`, recording what started the run
    pub async fn run_for(
        &self,
        cause: RunCause,
        source: &SourceText,
        selection: &Selection,
    ) -> Result<RunReport, SandboxError> {
        let run_id = Ulid::new();
        self.status.set(RUNNING);

        let result = match self.render(source, selection) {
            Ok(document) => match self.host.load(&document).await {
                Ok(()) => Ok(document),
                Err(err) => Err(SandboxError::from(err)),
            },
            Err(err) => Err(err),
        };

        match result {
            Ok(document) => {
                tracing::info!(
                    %run_id,
                    %cause,
                    selection = %selection,
                    profile = %document.profile(),
                    digest = %document.digest().short(),
                    "run handed to host"
                );
                Ok(RunReport {
                    run_id,
                    cause,
                    requested: selection.clone(),
                    profile: document.profile().clone(),
                    digest: document.digest(),
                    context: self.host.current_context(),
                })
            }
            Err(err) => {
                self.status.error(&err);
                tracing::error!(%run_id, %cause, error = %err, "run failed");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HostError;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        documents: Mutex<Vec<SynthesizedDocument>>,
        fail: bool,
    }

    #[async_trait]
    impl IsolationHost for Recorder {
        async fn load(&self, document: &SynthesizedDocument) -> Result<(), HostError> {
            if self.fail {
                return Err(HostError::engine("no engine"));
            }
            self.documents.lock().push(document.clone());
            Ok(())
        }

        fn current_context(&self) -> Option<ContextId> {
            let count = self.documents.lock().len() as u64;
            (count > 0).then_some(ContextId(count))
        }
    }

    #[tokio::test]
    async fn run_hands_document_to_host() {
        let sandbox = Sandbox::new(Recorder::default()).unwrap();
        let report = sandbox
            .run(&SourceText::from("new THREE.Scene();"), &Selection::Auto)
            .await
            .unwrap();

        assert_eq!(report.profile.as_str(), "threejs");
        assert_eq!(report.cause, RunCause::Explicit);
        assert_eq!(report.context, Some(ContextId(1)));
        assert_eq!(sandbox.status().current(), RUNNING);

        let documents = sandbox.host().documents.lock();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].digest(), report.digest);
    }

    #[tokio::test]
    async fn unknown_selection_runs_default() {
        let sandbox = Sandbox::new(Recorder::default()).unwrap();
        let report = sandbox
            .run(&SourceText::from("1"), &Selection::profile("default"))
            .await
            .unwrap();

        assert_eq!(report.requested, Selection::profile("default"));
        assert_eq!(report.profile.as_str(), "vanilla");
    }

    #[tokio::test]
    async fn synthesis_failure_sets_status() {
        let config = SandboxConfig::default().with_max_source_bytes(3);
        let sandbox = Sandbox::from_config(&config, Recorder::default()).unwrap();

        let err = sandbox
            .run(&SourceText::from("too long"), &Selection::Auto)
            .await
            .unwrap_err();

        assert!(err.is_synthesis_failure());
        assert!(sandbox.status().current().starts_with("Error: "));
        assert!(sandbox.host().documents.lock().is_empty());

        // The sandbox keeps working after a failed run
        sandbox.run(&SourceText::from("1"), &Selection::Auto).await.unwrap();
        assert_eq!(sandbox.host().documents.lock().len(), 1);
    }

    #[tokio::test]
    async fn host_failure_is_reported() {
        let host = Recorder {
            fail: true,
            ..Recorder::default()
        };
        let sandbox = Sandbox::new(host).unwrap();
        let err = sandbox
            .run(&SourceText::from("1"), &Selection::Auto)
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::Host(_)));
        assert_eq!(sandbox.status().current(), "Error: host failed: engine init failed: no engine");
    }

    #[test]
    fn render_is_deterministic() {
        let sandbox = Sandbox::new(Recorder::default()).unwrap();
        let source = SourceText::from("console.log('x')");
        let a = sandbox.render(&source, &Selection::Auto).unwrap();
        let b = sandbox.render(&source, &Selection::Auto).unwrap();
        assert_eq!(a, b);
    }
}
