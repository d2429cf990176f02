//! File-backed isolation host
//!
//! Writes each document to a target path for an external viewer (for
//! example a browser with live reload). The file is written to a temporary
//! sibling and renamed over the target, so a reader sees either the old or
//! the new document, never a mix.

use crate::capture::ContextId;
use crate::error::HostError;
use crate::host::IsolationHost;
use async_trait::async_trait;
use codecore_document::{DocumentDigest, SynthesizedDocument};
use parking_lot::RwLock;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Host writing documents to a file
#[derive(Debug)]
pub struct FileSurface {
    target: PathBuf,
    next_id: AtomicU64,
    current: RwLock<Option<(ContextId, DocumentDigest)>>,
}

impl FileSurface {
    /// Create surface writing to `target`
    #[must_use]
    pub fn new(target: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
            next_id: AtomicU64::new(0),
            current: RwLock::new(None),
        }
    }

    /// Target path
    #[inline]
    #[must_use]
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Digest of the document currently on disk
    #[must_use]
    pub fn current_digest(&self) -> Option<DocumentDigest> {
        self.current.read().map(|(_, digest)| digest)
    }

    /// Number of documents written so far
    #[must_use]
    pub fn contexts_created(&self) -> u64 {
        self.next_id.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IsolationHost for FileSurface {
    async fn load(&self, document: &SynthesizedDocument) -> Result<(), HostError> {
        let id = ContextId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let target = self.target.clone();
        let text = document.text().to_string();

        tokio::task::spawn_blocking(move || write_atomically(&target, text.as_bytes()))
            .await
            .map_err(|e| HostError::Worker(e.to_string()))??;

        *self.current.write() = Some((id, document.digest()));
        tracing::debug!(
            context = %id,
            path = %self.target.display(),
            digest = %document.digest().short(),
            "document written"
        );
        Ok(())
    }

    fn current_context(&self) -> Option<ContextId> {
        self.current.read().map(|(id, _)| id)
    }
}

fn write_atomically(target: &Path, bytes: &[u8]) -> Result<(), HostError> {
    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    file.persist(target).map_err(|e| HostError::Io(e.error))?;
    Ok(())
}
