//! Execution trigger
//!
//! Decides when the sandbox runs. A single task owns the editor state and
//! processes [`TriggerEvent`]s in order:
//!
//! | Event | Effect |
//! |---|---|
//! | `Run` | run now |
//! | `SelectSelection` | store selection, run now |
//! | `Edit` | store text, (re)arm the debounce timer |
//! | `Save` | persist editor state, status `Saved` |
//! | `Load` | restore persisted state if any, then run now |
//! | `Clear` | empty the text, run now |
//! | `Shutdown` | stop, returning the editor state |
//!
//! Immediate runs disarm a pending debounce. The debounce deadline is the
//! task's only suspension point besides waiting for events.

use crate::error::SandboxError;
use crate::host::IsolationHost;
use crate::sandbox::{RunCause, RunReport, Sandbox};
use crate::status::SAVED;
use crate::store::{EditorState, StateStore, StorageKeys};
use codecore_document::SourceText;
use codecore_profile::Selection;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Capacity of the run event channel
const RUN_EVENTS_CAPACITY: usize = 64;

/// Quiet-interval timer restarted by every edit
#[derive(Debug, Clone)]
pub struct Debouncer {
    quiet: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    /// Create disarmed debouncer
    #[must_use]
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            deadline: None,
        }
    }

    /// Restart the quiet interval from `now`
    pub fn arm(&mut self, now: Instant) {
        self.deadline = Some(now + self.quiet);
    }

    /// Cancel the pending fire
    pub fn disarm(&mut self) {
        self.deadline = None;
    }

    /// Pending fire time
    #[inline]
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Check if a fire is pending
    #[inline]
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Fire (and disarm) if the deadline has passed
    pub fn fire_if_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    /// Quiet interval
    #[inline]
    #[must_use]
    pub fn quiet(&self) -> Duration {
        self.quiet
    }
}

/// Input to the trigger task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerEvent {
    /// Explicit run action
    Run,
    /// Profile selection changed
    SelectSelection(Selection),
    /// Editor text changed
    Edit(String),
    /// Persist editor state
    Save,
    /// Restore persisted editor state
    Load,
    /// Empty the editor
    Clear,
    /// Stop the task
    Shutdown,
}

/// Trigger state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerState {
    /// Waiting for a trigger
    Idle,
    /// Building a document and handing it to the host
    Running,
}

/// Outcome of one triggered run
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// Document reached the host
    Completed(RunReport),
    /// Run failed before or during the hand-off
    Failed {
        /// What started the run
        cause: RunCause,
        /// Error message
        message: String,
    },
}

impl RunEvent {
    /// Report of a completed run
    #[must_use]
    pub fn report(&self) -> Option<&RunReport> {
        match self {
            Self::Completed(report) => Some(report),
            Self::Failed { .. } => None,
        }
    }
}

/// Handle to a running trigger task
#[derive(Debug)]
pub struct TriggerHandle {
    events: mpsc::UnboundedSender<TriggerEvent>,
    state: watch::Receiver<TriggerState>,
    runs: broadcast::Sender<RunEvent>,
    task: JoinHandle<EditorState>,
}

impl TriggerHandle {
    /// Send an event; returns `false` once the task has stopped
    pub fn send(&self, event: TriggerEvent) -> bool {
        self.events.send(event).is_ok()
    }

    /// Explicit run
    pub fn run(&self) -> bool {
        self.send(TriggerEvent::Run)
    }

    /// Change selection
    pub fn select(&self, selection: Selection) -> bool {
        self.send(TriggerEvent::SelectSelection(selection))
    }

    /// Replace editor text
    pub fn edit(&self, text: impl Into<String>) -> bool {
        self.send(TriggerEvent::Edit(text.into()))
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> TriggerState {
        *self.state.borrow()
    }

    /// Watch state changes
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<TriggerState> {
        self.state.clone()
    }

    /// Subscribe to run outcomes
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.runs.subscribe()
    }

    /// Stop the task and return the final editor state
    pub async fn shutdown(self) -> Result<EditorState, tokio::task::JoinError> {
        let _ = self.events.send(TriggerEvent::Shutdown);
        self.task.await
    }
}

/// Owns editor state and runs the sandbox on triggers
pub struct ExecutionTrigger<H> {
    sandbox: Arc<Sandbox<H>>,
    store: Arc<dyn StateStore>,
    keys: StorageKeys,
    state: EditorState,
    debouncer: Debouncer,
}

impl<H: IsolationHost + 'static> ExecutionTrigger<H> {
    /// Create trigger over `sandbox`
    #[must_use]
    pub fn new(
        sandbox: Arc<Sandbox<H>>,
        store: Arc<dyn StateStore>,
        keys: StorageKeys,
        debounce: Duration,
    ) -> Self {
        Self {
            sandbox,
            store,
            keys,
            state: EditorState::default(),
            debouncer: Debouncer::new(debounce),
        }
    }

    /// Start from `state` instead of an empty editor
    #[must_use]
    pub fn with_state(mut self, state: EditorState) -> Self {
        self.state = state;
        self
    }

    /// Spawn the trigger task
    #[must_use]
    pub fn spawn(self) -> TriggerHandle {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(TriggerState::Idle);
        let (runs_tx, _) = broadcast::channel(RUN_EVENTS_CAPACITY);
        let runs = runs_tx.clone();

        let task = tokio::spawn(self.event_loop(events_rx, state_tx, runs_tx));

        TriggerHandle {
            events: events_tx,
            state: state_rx,
            runs,
            task,
        }
    }

    async fn event_loop(
        mut self,
        mut events: mpsc::UnboundedReceiver<TriggerEvent>,
        state: watch::Sender<TriggerState>,
        runs: broadcast::Sender<RunEvent>,
    ) -> EditorState {
        loop {
            let deadline = self.debouncer.deadline();
            let event = tokio::select! {
                biased;
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
                () = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    if self.debouncer.fire_if_due(Instant::now()) {
                        tracing::debug!("debounce fired");
                        self.run(RunCause::Edit, &state, &runs).await;
                    }
                    continue;
                }
            };

            match event {
                TriggerEvent::Run => {
                    self.debouncer.disarm();
                    self.run(RunCause::Explicit, &state, &runs).await;
                }
                TriggerEvent::SelectSelection(selection) => {
                    self.state.selection = selection;
                    self.debouncer.disarm();
                    self.run(RunCause::SelectionChange, &state, &runs).await;
                }
                TriggerEvent::Edit(text) => {
                    self.state.source = text;
                    self.debouncer.arm(Instant::now());
                    tracing::trace!(quiet = ?self.debouncer.quiet(), "debounce armed");
                }
                TriggerEvent::Save => self.save().await,
                TriggerEvent::Load => match self.load().await {
                    Ok(restored) => {
                        if !restored {
                            tracing::debug!("nothing restored, rerunning editor state");
                        }
                        self.debouncer.disarm();
                        self.run(RunCause::Load, &state, &runs).await;
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "load failed");
                        self.sandbox.status().error(&err);
                    }
                },
                TriggerEvent::Clear => {
                    self.state.source.clear();
                    self.debouncer.disarm();
                    self.run(RunCause::Clear, &state, &runs).await;
                }
                TriggerEvent::Shutdown => break,
            }
        }
        self.state
    }

    async fn run(
        &self,
        cause: RunCause,
        state: &watch::Sender<TriggerState>,
        runs: &broadcast::Sender<RunEvent>,
    ) {
        state.send_replace(TriggerState::Running);
        let source = SourceText::from(self.state.source.as_str());
        let event = match self.sandbox.run_for(cause, &source, &self.state.selection).await {
            Ok(report) => RunEvent::Completed(report),
            Err(err) => RunEvent::Failed {
                cause,
                message: err.to_string(),
            },
        };
        state.send_replace(TriggerState::Idle);
        // No subscribers is fine
        let _ = runs.send(event);
    }

    async fn save(&self) {
        match self.state.save(self.store.as_ref(), &self.keys).await {
            Ok(()) => self.sandbox.status().set(SAVED),
            Err(err) => {
                let err = SandboxError::from(err);
                tracing::warn!(error = %err, "save failed");
                self.sandbox.status().error(&err);
            }
        }
    }

    /// Restore persisted state; `false` when nothing was saved
    async fn load(&mut self) -> Result<bool, SandboxError> {
        match EditorState::restore(self.store.as_ref(), &self.keys).await? {
            Some(restored) => {
                self.state = restored;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debouncer_restarts_on_arm() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_millis(1_000));
        assert!(!debouncer.is_armed());

        debouncer.arm(start);
        debouncer.arm(start + Duration::from_millis(600));
        assert!(!debouncer.fire_if_due(start + Duration::from_millis(1_000)));
        assert!(debouncer.fire_if_due(start + Duration::from_millis(1_600)));
        assert!(!debouncer.is_armed());
    }

    #[test]
    fn disarmed_debouncer_never_fires() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_millis(10));
        debouncer.arm(start);
        debouncer.disarm();
        assert!(!debouncer.fire_if_due(start + Duration::from_secs(60)));
    }
}
