//! Isolation host seam
//!
//! A host owns exactly one active execution context. `load` replaces it with
//! a fresh context built from the given document; nothing from the previous
//! context survives. User-code success or failure is never reported here,
//! only through the new context's capture sink.

use crate::capture::ContextId;
use crate::error::HostError;
use async_trait::async_trait;
use codecore_document::SynthesizedDocument;
use std::sync::Arc;

/// Loads synthesized documents into an isolated surface
#[async_trait]
pub trait IsolationHost: Send + Sync {
    /// Replace the current context with one running `document`
    async fn load(&self, document: &SynthesizedDocument) -> Result<(), HostError>;

    /// Id of the context currently occupying the surface
    fn current_context(&self) -> Option<ContextId>;
}

#[async_trait]
impl<H: IsolationHost + ?Sized> IsolationHost for Arc<H> {
    async fn load(&self, document: &SynthesizedDocument) -> Result<(), HostError> {
        (**self).load(document).await
    }

    fn current_context(&self) -> Option<ContextId> {
        (**self).current_context()
    }
}
