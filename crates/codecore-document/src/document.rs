//! Document values
//!
//! - [`SourceText`]: immutable snapshot of the user's code for one run
//! - [`SynthesizedDocument`]: the generated document plus the span of its
//!   inline script block
//! - [`DocumentDigest`]: Blake3 digest of the document text

use codecore_profile::ProfileId;
use std::fmt::{self, Display, Formatter};
use std::ops::Range;
use std::sync::Arc;

/// Immutable snapshot of user-authored code
///
/// Cheap to clone; the editor keeps mutating its own buffer while a run holds
/// its snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SourceText(Arc<str>);

impl SourceText {
    /// Create snapshot
    #[inline]
    #[must_use]
    pub fn new(text: impl Into<Arc<str>>) -> Self {
        Self(text.into())
    }

    /// Get text
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length in bytes
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for SourceText {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for SourceText {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

impl AsRef<str> for SourceText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for SourceText {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Blake3 digest of a document's text
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocumentDigest([u8; 32]);

impl DocumentDigest {
    /// Compute digest of arbitrary data
    #[inline]
    #[must_use]
    pub fn compute(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Get reference to the underlying bytes
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Short string representation (first 16 hex chars)
    #[must_use]
    pub fn short(&self) -> String {
        self.0[..8].iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl Display for DocumentDigest {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Complete document for one run
///
/// A pure function of profile, instrumentation and source: synthesizing the
/// same inputs twice gives byte-identical text and the same digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedDocument {
    profile: ProfileId,
    text: String,
    script: Range<usize>,
    digest: DocumentDigest,
}

impl SynthesizedDocument {
    pub(crate) fn new(profile: ProfileId, text: String, script: Range<usize>) -> Self {
        let digest = DocumentDigest::compute(text.as_bytes());
        Self {
            profile,
            text,
            script,
            digest,
        }
    }

    /// Profile the document was built for
    #[inline]
    #[must_use]
    pub fn profile(&self) -> &ProfileId {
        &self.profile
    }

    /// Full document text
    #[inline]
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Consume into document text
    #[inline]
    #[must_use]
    pub fn into_text(self) -> String {
        self.text
    }

    /// Inline script block: instrumentation, protective block and user code
    #[inline]
    #[must_use]
    pub fn script(&self) -> &str {
        &self.text[self.script.clone()]
    }

    /// Byte range of the inline script block within [`Self::text`]
    #[inline]
    #[must_use]
    pub fn script_span(&self) -> Range<usize> {
        self.script.clone()
    }

    /// Digest of the document text
    #[inline]
    #[must_use]
    pub fn digest(&self) -> DocumentDigest {
        self.digest
    }

    /// Size of the document in bytes
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.text.len()
    }

    /// Check if the document text is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}
