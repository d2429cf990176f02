//! Document synthesis
//!
//! A [`DocumentSynthesizer`] runs an ordered list of [`FragmentBuilder`]s over
//! a [`DocumentWriter`]:
//!
//! ```text
//! head-open → resources → styling → surfaces → instrumentation
//!           → protective-open → user-payload → protective-close
//! ```
//!
//! The instrumentation builder opens the inline script block and the
//! protective-close builder closes it, so the block always starts with the
//! sink and ends after the user's code.

use crate::document::{SourceText, SynthesizedDocument};
use crate::error::SynthesisError;
use crate::instrument::{InstrumentationFragment, SINK_BINDING};
use crate::surface::SurfaceLayout;
use codecore_profile::ExecutionProfile;
use std::ops::Range;

/// Default limit on the size of user source (1 MiB)
pub const DEFAULT_MAX_SOURCE_BYTES: usize = 1024 * 1024;

/// Inputs shared by every fragment builder
#[derive(Debug, Clone, Copy)]
pub struct SynthesisInput<'a> {
    /// Profile in effect for the run
    pub profile: &'a ExecutionProfile,
    /// Instrumentation produced for the profile
    pub fragment: &'a InstrumentationFragment,
    /// User source snapshot
    pub source: &'a SourceText,
    /// Capture panel layout
    pub layout: &'a SurfaceLayout,
}

/// One stage of document assembly
pub trait FragmentBuilder: Send + Sync {
    /// Stage name, for logging and introspection
    fn name(&self) -> &'static str;

    /// Append this stage's output
    fn build(&self, input: &SynthesisInput<'_>, out: &mut DocumentWriter)
        -> Result<(), SynthesisError>;
}

/// Append-only document buffer tracking the inline script block
#[derive(Debug, Default)]
pub struct DocumentWriter {
    text: String,
    script_start: Option<usize>,
    script_end: Option<usize>,
}

impl DocumentWriter {
    /// Create empty writer
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw text
    #[inline]
    pub fn push(&mut self, text: &str) {
        self.text.push_str(text);
    }

    /// Open the inline script block
    pub fn open_script(&mut self) -> Result<(), SynthesisError> {
        if self.script_start.is_some() {
            return Err(SynthesisError::UnbalancedScript("closed before reopening"));
        }
        self.text.push_str("<script>\n");
        self.script_start = Some(self.text.len());
        Ok(())
    }

    /// Close the inline script block
    pub fn close_script(&mut self) -> Result<(), SynthesisError> {
        if self.script_start.is_none() {
            return Err(SynthesisError::UnbalancedScript("opened"));
        }
        if self.script_end.is_some() {
            return Err(SynthesisError::UnbalancedScript("closed only once"));
        }
        self.script_end = Some(self.text.len());
        self.text.push_str("\n</script>\n");
        Ok(())
    }

    /// Text written so far
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    fn finish(self) -> Result<(String, Range<usize>), SynthesisError> {
        match (self.script_start, self.script_end) {
            (Some(start), Some(end)) => Ok((self.text, start..end)),
            (None, _) => Err(SynthesisError::UnbalancedScript("opened")),
            (Some(_), None) => Err(SynthesisError::UnbalancedScript("closed")),
        }
    }
}

struct HeadOpen;

impl FragmentBuilder for HeadOpen {
    fn name(&self) -> &'static str {
        "head-open"
    }

    fn build(&self, _: &SynthesisInput<'_>, out: &mut DocumentWriter) -> Result<(), SynthesisError> {
        out.push("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
        Ok(())
    }
}

struct ResourceRefs;

impl FragmentBuilder for ResourceRefs {
    fn name(&self) -> &'static str {
        "resources"
    }

    fn build(&self, input: &SynthesisInput<'_>, out: &mut DocumentWriter) -> Result<(), SynthesisError> {
        for resource in &input.profile.resources {
            out.push("<script src=\"");
            out.push(&escape_attribute(&resource.url));
            out.push("\"></script>\n");
        }
        Ok(())
    }
}

struct Styling;

impl FragmentBuilder for Styling {
    fn name(&self) -> &'static str {
        "styling"
    }

    fn build(&self, input: &SynthesisInput<'_>, out: &mut DocumentWriter) -> Result<(), SynthesisError> {
        out.push("<style>\n");
        out.push(&input.layout.stylesheet(&input.profile.styling));
        out.push("</style>\n");
        Ok(())
    }
}

struct SurfaceMarkup;

impl FragmentBuilder for SurfaceMarkup {
    fn name(&self) -> &'static str {
        "surfaces"
    }

    fn build(&self, input: &SynthesisInput<'_>, out: &mut DocumentWriter) -> Result<(), SynthesisError> {
        out.push("</head>\n<body>\n");
        out.push(&input.layout.markup());
        Ok(())
    }
}

struct Instrumentation;

impl FragmentBuilder for Instrumentation {
    fn name(&self) -> &'static str {
        "instrumentation"
    }

    fn build(&self, input: &SynthesisInput<'_>, out: &mut DocumentWriter) -> Result<(), SynthesisError> {
        out.open_script()?;
        out.push(&input.fragment.script);
        Ok(())
    }
}

struct ProtectiveOpen;

impl FragmentBuilder for ProtectiveOpen {
    fn name(&self) -> &'static str {
        "protective-open"
    }

    fn build(&self, _: &SynthesisInput<'_>, out: &mut DocumentWriter) -> Result<(), SynthesisError> {
        out.push("try {\n");
        Ok(())
    }
}

struct UserPayload;

impl FragmentBuilder for UserPayload {
    fn name(&self) -> &'static str {
        "user-payload"
    }

    fn build(&self, input: &SynthesisInput<'_>, out: &mut DocumentWriter) -> Result<(), SynthesisError> {
        // Raw and unescaped; the trailing newline keeps a final line comment
        // from swallowing the protective close.
        out.push(input.source.as_str());
        out.push("\n");
        Ok(())
    }
}

struct ProtectiveClose;

impl FragmentBuilder for ProtectiveClose {
    fn name(&self) -> &'static str {
        "protective-close"
    }

    fn build(&self, _: &SynthesisInput<'_>, out: &mut DocumentWriter) -> Result<(), SynthesisError> {
        out.push("} catch (e) {\n");
        out.push(SINK_BINDING);
        out.push(".codeError(e);\nthrow e;\n}");
        out.close_script()?;
        out.push("</body>\n</html>\n");
        Ok(())
    }
}

fn escape_attribute(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
    out
}

/// Assembles [`SynthesizedDocument`]s
///
/// # Example
///
/// ```rust
/// use codecore_document::{DocumentSynthesizer, InstrumentationInjector, SourceText};
/// use codecore_profile::builtin;
///
/// let profile = builtin::vanilla();
/// let fragment = InstrumentationInjector::new().produce(&profile);
/// let synthesizer = DocumentSynthesizer::new();
///
/// let a = synthesizer.synthesize(&profile, &fragment, &SourceText::from("1 + 1")).unwrap();
/// let b = synthesizer.synthesize(&profile, &fragment, &SourceText::from("1 + 1")).unwrap();
/// assert_eq!(a.digest(), b.digest());
/// ```
pub struct DocumentSynthesizer {
    builders: Vec<Box<dyn FragmentBuilder>>,
    layout: SurfaceLayout,
    max_source_bytes: usize,
}

impl std::fmt::Debug for DocumentSynthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentSynthesizer")
            .field("stages", &self.stages())
            .field("layout", &self.layout)
            .field("max_source_bytes", &self.max_source_bytes)
            .finish()
    }
}

impl Default for DocumentSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentSynthesizer {
    /// Create synthesizer with the standard stages and default layout
    #[must_use]
    pub fn new() -> Self {
        Self {
            builders: vec![
                Box::new(HeadOpen),
                Box::new(ResourceRefs),
                Box::new(Styling),
                Box::new(SurfaceMarkup),
                Box::new(Instrumentation),
                Box::new(ProtectiveOpen),
                Box::new(UserPayload),
                Box::new(ProtectiveClose),
            ],
            layout: SurfaceLayout::default(),
            max_source_bytes: DEFAULT_MAX_SOURCE_BYTES,
        }
    }

    /// Set the source size limit
    #[must_use]
    pub fn with_max_source_bytes(mut self, limit: usize) -> Self {
        self.max_source_bytes = limit;
        self
    }

    /// Use a custom surface layout; must match the injector's
    #[must_use]
    pub fn with_layout(mut self, layout: SurfaceLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Stage names in execution order
    #[must_use]
    pub fn stages(&self) -> Vec<&'static str> {
        self.builders.iter().map(|b| b.name()).collect()
    }

    /// Source size limit in bytes
    #[inline]
    #[must_use]
    pub fn max_source_bytes(&self) -> usize {
        self.max_source_bytes
    }

    /// Build the document for one run
    pub fn synthesize(
        &self,
        profile: &ExecutionProfile,
        fragment: &InstrumentationFragment,
        source: &SourceText,
    ) -> Result<SynthesizedDocument, SynthesisError> {
        if source.len() > self.max_source_bytes {
            return Err(SynthesisError::SourceTooLarge {
                size: source.len(),
                limit: self.max_source_bytes,
            });
        }

        let input = SynthesisInput {
            profile,
            fragment,
            source,
            layout: &self.layout,
        };
        let mut writer = DocumentWriter::new();
        for builder in &self.builders {
            builder.build(&input, &mut writer)?;
        }

        let (text, script) = writer.finish()?;
        let document = SynthesizedDocument::new(profile.id.clone(), text, script);
        tracing::debug!(
            profile = %profile.id,
            digest = %document.digest().short(),
            bytes = document.len(),
            "document synthesized"
        );
        Ok(document)
    }
}
