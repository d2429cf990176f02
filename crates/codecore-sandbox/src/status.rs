//! Transient status indicator
//!
//! Holds the last status message and when it was set. Reading it after the
//! revert interval yields [`READY`] again, unless a newer message replaced
//! it in the meantime.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Idle status text
pub const READY: &str = "Ready";

/// Status text while a run is handed to the host
pub const RUNNING: &str = "Running...";

/// Status text after an explicit save
pub const SAVED: &str = "Saved";

/// Default revert interval
pub const DEFAULT_REVERT: Duration = Duration::from_millis(2_000);

#[derive(Debug, Clone)]
struct Entry {
    message: String,
    set_at: Instant,
}

/// Status message that reverts to [`READY`]
#[derive(Debug)]
pub struct StatusIndicator {
    entry: Mutex<Option<Entry>>,
    revert_after: Duration,
}

impl Default for StatusIndicator {
    fn default() -> Self {
        Self::new(DEFAULT_REVERT)
    }
}

impl StatusIndicator {
    /// Create indicator with a revert interval
    #[must_use]
    pub fn new(revert_after: Duration) -> Self {
        Self {
            entry: Mutex::new(None),
            revert_after,
        }
    }

    /// Show `message` until the revert interval passes
    pub fn set(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::trace!(status = %message, "status changed");
        *self.entry.lock() = Some(Entry {
            message,
            set_at: Instant::now(),
        });
    }

    /// Show a failure message
    pub fn error(&self, message: impl std::fmt::Display) {
        self.set(format!("Error: {message}"));
    }

    /// Message visible at `now`
    #[must_use]
    pub fn current_at(&self, now: Instant) -> String {
        match &*self.entry.lock() {
            Some(entry) if now.saturating_duration_since(entry.set_at) < self.revert_after => {
                entry.message.clone()
            }
            _ => READY.to_string(),
        }
    }

    /// Message visible now
    #[must_use]
    pub fn current(&self) -> String {
        self.current_at(Instant::now())
    }

    /// Revert interval
    #[inline]
    #[must_use]
    pub fn revert_after(&self) -> Duration {
        self.revert_after
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn reverts_after_interval() {
        let status = StatusIndicator::default();
        assert_eq!(status.current(), READY);

        status.set(RUNNING);
        assert_eq!(status.current(), RUNNING);

        tokio::time::advance(Duration::from_millis(1_999)).await;
        assert_eq!(status.current(), RUNNING);

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(status.current(), READY);
    }

    #[tokio::test(start_paused = true)]
    async fn newer_message_restarts_interval() {
        let status = StatusIndicator::new(Duration::from_millis(100));
        status.set(SAVED);
        tokio::time::advance(Duration::from_millis(80)).await;

        status.error("source too large");
        tokio::time::advance(Duration::from_millis(80)).await;
        assert_eq!(status.current(), "Error: source too large");

        tokio::time::advance(Duration::from_millis(20)).await;
        assert_eq!(status.current(), READY);
    }
}
