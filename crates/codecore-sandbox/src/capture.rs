//! Capture sink and channel delegates
//!
//! [`CaptureSink`] is the host-side view of the two panels of one execution
//! context. It is built from the context's final state and never shared with
//! another context. [`ConsoleDelegate`]s receive the calls that reached the
//! context's underlying console channel.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Identity of one execution context, unique per host
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContextId(pub u64);

impl Display for ContextId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

/// Error panel state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPanel {
    /// Panel inner HTML
    pub html: String,
    /// Whether the panel has been revealed
    pub visible: bool,
}

/// Console panel state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsolePanel {
    /// Panel inner HTML
    pub html: String,
}

/// Error and console panels of one context
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureSink {
    /// Error panel, hidden until the first error
    pub error: ErrorPanel,
    /// Console panel, always present
    pub console: ConsolePanel,
}

impl CaptureSink {
    /// Check if nothing was captured
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.error.visible && self.error.html.is_empty() && self.console.html.is_empty()
    }

    /// Check if the error panel is visible
    #[inline]
    #[must_use]
    pub fn error_visible(&self) -> bool {
        self.error.visible
    }

    /// Console lines as plain text
    ///
    /// Lines are split on `<br>`, tags are stripped and entities decoded.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .console
            .html
            .split("<br>")
            .map(plain_text)
            .collect();
        if lines.last().is_some_and(String::is_empty) {
            lines.pop();
        }
        lines
    }

    /// Error panel as plain text, one entry line per `<br>`
    #[must_use]
    pub fn error_text(&self) -> String {
        plain_text(&self.error.html.replace("<br>", "\n"))
            .trim_end()
            .to_string()
    }
}

/// Strip tags and decode the entities the instrumentation produces
fn plain_text(html: &str) -> String {
    let mut stripped = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            c if !in_tag => stripped.push(c),
            _ => {}
        }
    }
    stripped
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Console channel method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelLevel {
    /// `console.log`
    Log,
    /// `console.info`
    Info,
    /// `console.debug`
    Debug,
    /// `console.warn`
    Warn,
    /// `console.error`
    Error,
}

/// One call that reached the underlying console channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelCall {
    /// Method called
    pub level: ChannelLevel,
    /// Arguments, as JSON values
    pub args: Vec<serde_json::Value>,
}

impl ChannelCall {
    /// Arguments joined with a space, strings verbatim
    #[must_use]
    pub fn rendered(&self) -> String {
        self.args
            .iter()
            .map(|arg| match arg {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Receives channel calls of every context
pub trait ConsoleDelegate: Send + Sync {
    /// Handle one call made in `context`
    fn forward(&self, context: ContextId, call: &ChannelCall);
}

/// Delegate that logs calls through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDelegate;

impl ConsoleDelegate for TracingDelegate {
    fn forward(&self, context: ContextId, call: &ChannelCall) {
        let text = call.rendered();
        match call.level {
            ChannelLevel::Log | ChannelLevel::Info => {
                tracing::info!(target: "codecore::context", %context, "{text}");
            }
            ChannelLevel::Debug => tracing::debug!(target: "codecore::context", %context, "{text}"),
            ChannelLevel::Warn => tracing::warn!(target: "codecore::context", %context, "{text}"),
            ChannelLevel::Error => tracing::error!(target: "codecore::context", %context, "{text}"),
        }
    }
}

/// Delegate that keeps calls in memory
#[derive(Debug, Default)]
pub struct RecordingDelegate {
    calls: Mutex<Vec<(ContextId, ChannelCall)>>,
}

impl RecordingDelegate {
    /// Create empty recorder
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded calls, in order
    #[must_use]
    pub fn calls(&self) -> Vec<(ContextId, ChannelCall)> {
        self.calls.lock().clone()
    }

    /// Recorded calls of one context
    #[must_use]
    pub fn calls_for(&self, context: ContextId) -> Vec<ChannelCall> {
        self.calls
            .lock()
            .iter()
            .filter(|(id, _)| *id == context)
            .map(|(_, call)| call.clone())
            .collect()
    }
}

impl ConsoleDelegate for RecordingDelegate {
    fn forward(&self, context: ContextId, call: &ChannelCall) {
        self.calls.lock().push((context, call.clone()));
    }
}
