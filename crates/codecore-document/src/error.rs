//! Error types for document synthesis

/// Errors while building a document
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SynthesisError {
    /// Source text exceeds the configured limit
    #[error("source too large: {size} bytes (max: {limit})")]
    SourceTooLarge {
        /// Source size in bytes
        size: usize,
        /// Configured limit in bytes
        limit: usize,
    },

    /// A builder left the inline script block unbalanced
    #[error("inline script block was not {0}")]
    UnbalancedScript(&'static str),
}
