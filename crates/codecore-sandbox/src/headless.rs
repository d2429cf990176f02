//! Headless isolation host backed by QuickJS
//!
//! Every [`IsolationHost::load`] builds a brand-new QuickJS runtime and
//! context on a blocking worker, so no globals, timers or listeners survive
//! from the previous run. The context gets a minimal page shim:
//!
//! ```text
//! window (= globalThis)
//!   ├── document.getElementById(error | console)   panel elements
//!   ├── console                                     underlying channel (recorded)
//!   ├── setTimeout / setInterval / requestAnimationFrame (+ clear/cancel)
//!   └── onerror                                     set by the instrumentation
//! ```
//!
//! `load` returns as soon as the new context is ready to evaluate; the user
//! code keeps running on the worker. Loading a document interrupts whatever
//! context is still running, and [`HeadlessSurface::settled`] waits for the
//! newest context's final state.
//!
//! The document's inline script is evaluated through an indirect eval.
//! Anything that escapes it, or escapes a timer callback, is handed to
//! `window.onerror` the way a browser reports uncaught exceptions. Promise
//! jobs and timers are then drained on a virtual clock for a bounded number
//! of ticks. A wall-clock deadline interrupts runaway code.
//!
//! External resources are not fetched; code that depends on them fails with
//! a captured runtime error.

use crate::capture::{
    CaptureSink, ChannelCall, ConsoleDelegate, ConsolePanel, ContextId, ErrorPanel,
    TracingDelegate,
};
use crate::error::HostError;
use crate::host::IsolationHost;
use async_trait::async_trait;
use codecore_document::{DocumentDigest, SurfaceLayout, SynthesizedDocument};
use codecore_profile::ProfileId;
use parking_lot::Mutex;
use rquickjs::{Context, Runtime};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, watch};

/// Extra time the blocking worker gets past the script deadline
const WORKER_GRACE: Duration = Duration::from_millis(500);

const DRIVER: &str = "(function () {\n\
  var src = globalThis.__codecoreSource;\n\
  delete globalThis.__codecoreSource;\n\
  try { (0, eval)(src); } catch (e) { __codecoreReport(e); }\n\
})();";

const TICK: &str = "__codecoreTick()";

const SNAPSHOT: &str = "__codecoreSnapshot()";

const SHIM_TEMPLATE: &str = r#"(function (global) {
  'use strict';
  var stringify = JSON.stringify;
  var parse = JSON.parse;
  var ERROR_ID = __ERROR_ID__;
  var CONSOLE_ID = __CONSOLE_ID__;
  var channelCalls = [];
  var uncaught = [];
  var timers = [];
  var nextTimer = 1;
  var nextSeq = 1;
  var running = null;
  var now = 0;

  function element(tag, display) {
    var children = [];
    var el = {
      tagName: String(tag).toUpperCase(),
      innerHTML: '',
      textContent: '',
      style: { display: display },
      scrollTop: 0,
      children: children,
      appendChild: function (child) { children.push(child); return child; },
      removeChild: function (child) {
        var i = children.indexOf(child);
        if (i >= 0) { children.splice(i, 1); }
        return child;
      },
      setAttribute: function () {},
      addEventListener: function () {},
      removeEventListener: function () {},
      getContext: function () { return null; }
    };
    Object.defineProperty(el, 'scrollHeight', {
      get: function () { return String(el.innerHTML).length; }
    });
    return el;
  }

  var panels = {};
  panels[ERROR_ID] = element('div', 'none');
  panels[CONSOLE_ID] = element('div', '');
  var body = element('body', '');
  body.appendChild(panels[ERROR_ID]);
  body.appendChild(panels[CONSOLE_ID]);

  var document = {
    body: body,
    getElementById: function (id) {
      return Object.prototype.hasOwnProperty.call(panels, id) ? panels[id] : null;
    },
    createElement: function (tag) { return element(tag, ''); },
    addEventListener: function () {},
    removeEventListener: function () {}
  };

  function toJson(value) {
    try {
      var text = stringify(value);
      if (text !== undefined) { return parse(text); }
    } catch (ignored) {}
    try {
      return String(value);
    } catch (ignored) {
      return Object.prototype.toString.call(value);
    }
  }

  function record(level) {
    return function () {
      var args = [];
      for (var i = 0; i < arguments.length; i++) { args.push(toJson(arguments[i])); }
      channelCalls.push({ level: level, args: args });
    };
  }

  var console = {
    log: record('log'),
    info: record('info'),
    debug: record('debug'),
    warn: record('warn'),
    error: record('error')
  };

  function describe(e) {
    try {
      if (e !== null && typeof e === 'object' && 'message' in e) {
        return (e.name || 'Error') + ': ' + e.message;
      }
      return String(e);
    } catch (ignored) {
      return 'exception';
    }
  }

  function position(e) {
    var at = { line: 0, col: 0 };
    if (e === null || typeof e !== 'object') { return at; }
    if (typeof e.lineNumber === 'number') {
      at.line = e.lineNumber;
      at.col = typeof e.columnNumber === 'number' ? e.columnNumber : 0;
    } else if (typeof e.stack === 'string') {
      var m = /:(\d+)(?::(\d+))?\)?\s*(?:\n|$)/.exec(e.stack);
      if (m) {
        at.line = Number(m[1]);
        at.col = m[2] ? Number(m[2]) : 0;
      }
    }
    return at;
  }

  function report(e) {
    var message = 'Uncaught ' + describe(e);
    var at = position(e);
    var handled = false;
    if (typeof global.onerror === 'function') {
      try {
        handled = global.onerror(message, 'about:srcdoc', at.line, at.col, e) === true;
      } catch (inner) {
        uncaught.push('Uncaught ' + describe(inner));
      }
    }
    if (!handled) { uncaught.push(message); }
  }

  function schedule(callback, delay, args, repeat) {
    var wait = Math.max(0, Number(delay) || 0);
    var timer = {
      id: nextTimer++,
      seq: nextSeq++,
      due: now + wait,
      callback: callback,
      args: args,
      every: repeat ? Math.max(wait, 1) : 0,
      cleared: false
    };
    timers.push(timer);
    return timer.id;
  }

  function clear(id) {
    for (var i = 0; i < timers.length; i++) {
      if (timers[i].id === id) {
        timers.splice(i, 1);
        break;
      }
    }
    if (running !== null && running.id === id) { running.cleared = true; }
  }

  function tick() {
    if (timers.length === 0) { return false; }
    var pick = 0;
    for (var i = 1; i < timers.length; i++) {
      var t = timers[i];
      var p = timers[pick];
      if (t.due < p.due || (t.due === p.due && t.seq < p.seq)) { pick = i; }
    }
    var timer = timers.splice(pick, 1)[0];
    now = Math.max(now, timer.due);
    running = timer;
    try {
      if (typeof timer.callback === 'function') {
        timer.callback.apply(global, timer.args);
      } else {
        (0, eval)(String(timer.callback));
      }
    } catch (e) {
      report(e);
    }
    running = null;
    if (timer.every > 0 && !timer.cleared) {
      timer.due = now + timer.every;
      timer.seq = nextSeq++;
      timers.push(timer);
    }
    return true;
  }

  function snapshot() {
    var error = panels[ERROR_ID];
    var output = panels[CONSOLE_ID];
    return stringify({
      error: { html: String(error.innerHTML), visible: error.style.display !== 'none' },
      console: { html: String(output.innerHTML) },
      channel: channelCalls,
      uncaught: uncaught,
      pending_timers: timers.length
    });
  }

  function hidden(name, value) {
    Object.defineProperty(global, name, { value: value, writable: false, enumerable: false, configurable: false });
  }

  global.window = global;
  global.self = global;
  global.document = document;
  global.console = console;
  global.onerror = null;
  global.addEventListener = function () {};
  global.removeEventListener = function () {};
  try {
    global.performance = { now: function () { return now; } };
  } catch (ignored) {}
  global.setTimeout = function (callback, delay) {
    return schedule(callback, delay, Array.prototype.slice.call(arguments, 2), false);
  };
  global.setInterval = function (callback, delay) {
    return schedule(callback, delay, Array.prototype.slice.call(arguments, 2), true);
  };
  global.clearTimeout = clear;
  global.clearInterval = clear;
  global.requestAnimationFrame = function (callback) {
    return schedule(function () { callback(now); }, 16, [], false);
  };
  global.cancelAnimationFrame = clear;

  hidden('__codecoreReport', report);
  hidden('__codecoreTick', tick);
  hidden('__codecoreSnapshot', snapshot);
})(globalThis);
"#;

/// Headless engine limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadlessConfig {
    /// Wall-clock budget for one run in milliseconds
    pub timeout_ms: u64,
    /// QuickJS heap limit in bytes
    pub memory_limit: usize,
    /// Maximum timer callbacks run after the script
    pub max_ticks: u32,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            memory_limit: 64 * 1024 * 1024,
            max_ticks: 1_000,
        }
    }
}

impl HeadlessConfig {
    /// With timeout
    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// With memory limit
    #[must_use]
    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = bytes;
        self
    }

    /// With tick limit
    #[must_use]
    pub fn with_max_ticks(mut self, max_ticks: u32) -> Self {
        self.max_ticks = max_ticks;
        self
    }
}

/// How a context's evaluation ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContextOutcome {
    /// Script and drained timers finished within limits
    Settled,
    /// Wall-clock deadline interrupted the code
    TimedOut,
    /// A newer load interrupted the code
    Superseded,
    /// Engine-level failure inside the context
    Faulted(String),
}

/// Final state of one headless execution context
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionContext {
    /// Context id
    pub id: ContextId,
    /// Profile of the loaded document
    pub profile: ProfileId,
    /// Digest of the loaded document
    #[serde(serialize_with = "crate::sandbox::serialize_digest")]
    pub digest: DocumentDigest,
    /// Error and console panels
    pub capture: CaptureSink,
    /// Calls that reached the underlying console channel
    pub channel: Vec<ChannelCall>,
    /// Exceptions no `onerror` handler claimed
    pub uncaught: Vec<String>,
    /// Timers still scheduled when draining stopped
    pub pending_timers: usize,
    /// Timer callbacks run
    pub ticks: u32,
    /// How evaluation ended
    pub outcome: ContextOutcome,
}

#[derive(Debug, Default, Deserialize)]
struct Snapshot {
    error: ErrorPanel,
    console: ConsolePanel,
    channel: Vec<ChannelCall>,
    uncaught: Vec<String>,
    pending_timers: usize,
}

#[derive(Debug)]
struct Evaluation {
    snapshot: Snapshot,
    ticks: u32,
    outcome: ContextOutcome,
}

impl Evaluation {
    fn stopped(outcome: ContextOutcome) -> Self {
        Self {
            snapshot: Snapshot::default(),
            ticks: 0,
            outcome,
        }
    }
}

/// Loaded context whose evaluation may still be running
#[derive(Debug)]
struct ActiveContext {
    id: ContextId,
    superseded: Arc<AtomicBool>,
}

type Latest = watch::Sender<Option<Arc<ExecutionContext>>>;

/// QuickJS-backed [`IsolationHost`]
pub struct HeadlessSurface {
    config: HeadlessConfig,
    layout: SurfaceLayout,
    delegate: Arc<dyn ConsoleDelegate>,
    active: Mutex<Option<ActiveContext>>,
    latest: Arc<Latest>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for HeadlessSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeadlessSurface")
            .field("config", &self.config)
            .field("layout", &self.layout)
            .field("current", &self.current_context())
            .finish_non_exhaustive()
    }
}

impl Default for HeadlessSurface {
    fn default() -> Self {
        Self::new(HeadlessConfig::default())
    }
}

impl HeadlessSurface {
    /// Create surface with the default layout and a tracing delegate
    #[must_use]
    pub fn new(config: HeadlessConfig) -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            config,
            layout: SurfaceLayout::default(),
            delegate: Arc::new(TracingDelegate),
            active: Mutex::new(None),
            latest: Arc::new(latest),
            next_id: AtomicU64::new(0),
        }
    }

    /// Use a custom surface layout; must match the synthesizer's
    #[must_use]
    pub fn with_layout(mut self, layout: SurfaceLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Forward channel calls to `delegate`
    #[must_use]
    pub fn with_delegate(mut self, delegate: Arc<dyn ConsoleDelegate>) -> Self {
        self.delegate = delegate;
        self
    }

    /// Engine limits
    #[inline]
    #[must_use]
    pub fn config(&self) -> &HeadlessConfig {
        &self.config
    }

    /// Newest context that has finished evaluating
    #[must_use]
    pub fn context(&self) -> Option<Arc<ExecutionContext>> {
        self.latest.borrow().clone()
    }

    /// Wait until the most recently loaded context has finished evaluating
    pub async fn settled(&self) -> Option<Arc<ExecutionContext>> {
        let Some(target) = self.current_context() else {
            return self.context();
        };
        let mut latest = self.latest.subscribe();
        let context = latest
            .wait_for(|c| c.as_ref().is_some_and(|c| c.id >= target))
            .await
            .ok()?
            .clone();
        context
    }

    fn shim(&self) -> String {
        SHIM_TEMPLATE
            .replace(
                "__ERROR_ID__",
                &serde_json::Value::String(self.layout.error_id.clone()).to_string(),
            )
            .replace(
                "__CONSOLE_ID__",
                &serde_json::Value::String(self.layout.console_id.clone()).to_string(),
            )
    }

    /// Make `id` the active context, interrupting the one it replaces
    fn activate(&self, id: ContextId) -> Arc<AtomicBool> {
        let superseded = Arc::new(AtomicBool::new(false));
        let next = ActiveContext {
            id,
            superseded: Arc::clone(&superseded),
        };
        if let Some(previous) = self.active.lock().replace(next) {
            previous.superseded.store(true, Ordering::Relaxed);
            tracing::debug!(context = %previous.id, by = %id, "context superseded");
        }
        superseded
    }

    fn deactivate(&self, id: ContextId) {
        let mut active = self.active.lock();
        if active.as_ref().is_some_and(|a| a.id == id) {
            *active = None;
        }
    }
}

#[async_trait]
impl IsolationHost for HeadlessSurface {
    async fn load(&self, document: &SynthesizedDocument) -> Result<(), HostError> {
        let id = ContextId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let superseded = self.activate(id);
        let shim = self.shim();
        let script = document.script().to_string();
        let config = self.config.clone();
        let budget = Duration::from_millis(config.timeout_ms) + WORKER_GRACE;

        let (ready_tx, ready_rx) = oneshot::channel();
        let worker = tokio::task::spawn_blocking(move || {
            match Prepared::new(&shim, script, &config, superseded) {
                Ok(prepared) => {
                    let _ = ready_tx.send(Ok(()));
                    Some(prepared.run())
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                    None
                }
            }
        });

        let ready = match ready_rx.await {
            Ok(ready) => ready,
            Err(_) => Err(HostError::Worker("worker stopped before the context was ready".to_string())),
        };
        if let Err(err) = ready {
            self.deactivate(id);
            return Err(err);
        }

        let settlement = Settlement {
            id,
            profile: document.profile().clone(),
            digest: document.digest(),
            delegate: Arc::clone(&self.delegate),
            latest: Arc::clone(&self.latest),
        };
        tokio::spawn(async move {
            let evaluation = match tokio::time::timeout(budget, worker).await {
                Ok(Ok(Some(evaluation))) => evaluation,
                Ok(Ok(None)) => return,
                Ok(Err(join)) => Evaluation::stopped(ContextOutcome::Faulted(join.to_string())),
                Err(_) => {
                    tracing::warn!(context = %id, "headless worker exceeded its budget");
                    Evaluation::stopped(ContextOutcome::TimedOut)
                }
            };
            settlement.finish(evaluation);
        });

        tracing::debug!(context = %id, profile = %document.profile(), "context loaded");
        Ok(())
    }

    fn current_context(&self) -> Option<ContextId> {
        self.active.lock().as_ref().map(|a| a.id)
    }
}

/// Everything needed to publish a context once its worker returns
struct Settlement {
    id: ContextId,
    profile: ProfileId,
    digest: DocumentDigest,
    delegate: Arc<dyn ConsoleDelegate>,
    latest: Arc<Latest>,
}

impl Settlement {
    fn finish(self, evaluation: Evaluation) {
        let Evaluation {
            snapshot,
            ticks,
            outcome,
        } = evaluation;
        let id = self.id;
        let context = Arc::new(ExecutionContext {
            id,
            profile: self.profile,
            digest: self.digest,
            capture: CaptureSink {
                error: snapshot.error,
                console: snapshot.console,
            },
            channel: snapshot.channel,
            uncaught: snapshot.uncaught,
            pending_timers: snapshot.pending_timers,
            ticks,
            outcome,
        });

        for call in &context.channel {
            self.delegate.forward(id, call);
        }

        tracing::debug!(
            context = %id,
            profile = %context.profile,
            outcome = ?context.outcome,
            ticks = context.ticks,
            error_visible = context.capture.error_visible(),
            "context settled"
        );

        let installed = self.latest.send_if_modified(|current| {
            if current.as_ref().is_some_and(|c| c.id > id) {
                return false;
            }
            *current = Some(context);
            true
        });
        if !installed {
            tracing::debug!(context = %id, "newer context already settled");
        }
    }
}

/// A QuickJS runtime with the shim installed and the source staged
struct Prepared {
    context: Context,
    runtime: Runtime,
    deadline: Instant,
    armed: Arc<AtomicBool>,
    superseded: Arc<AtomicBool>,
    max_ticks: u32,
}

impl Prepared {
    fn new(
        shim: &str,
        script: String,
        config: &HeadlessConfig,
        superseded: Arc<AtomicBool>,
    ) -> Result<Self, HostError> {
        let runtime = Runtime::new().map_err(HostError::engine)?;
        runtime.set_memory_limit(config.memory_limit);

        let deadline = Instant::now() + Duration::from_millis(config.timeout_ms);
        let armed = Arc::new(AtomicBool::new(true));
        {
            let armed = Arc::clone(&armed);
            let superseded = Arc::clone(&superseded);
            runtime.set_interrupt_handler(Some(Box::new(move || {
                armed.load(Ordering::Relaxed)
                    && (superseded.load(Ordering::Relaxed) || Instant::now() >= deadline)
            })));
        }

        let context = Context::full(&runtime).map_err(HostError::engine)?;
        context.with(|ctx| -> Result<(), HostError> {
            ctx.eval::<(), _>(shim).map_err(HostError::engine)?;
            ctx.globals()
                .set("__codecoreSource", script)
                .map_err(HostError::engine)?;
            Ok(())
        })?;

        Ok(Self {
            context,
            runtime,
            deadline,
            armed,
            superseded,
            max_ticks: config.max_ticks,
        })
    }

    fn run(self) -> Evaluation {
        let mut outcome = ContextOutcome::Settled;
        if let Err(err) = self.context.with(|ctx| ctx.eval::<(), _>(DRIVER)) {
            outcome = self.classify(&err);
        }

        let mut ticks = 0;
        while outcome == ContextOutcome::Settled {
            if let Some(stopped) = self.drain_jobs() {
                outcome = stopped;
                break;
            }
            if ticks >= self.max_ticks {
                break;
            }
            match self.context.with(|ctx| ctx.eval::<bool, _>(TICK)) {
                Ok(true) => ticks += 1,
                Ok(false) => break,
                Err(err) => outcome = self.classify(&err),
            }
        }

        self.armed.store(false, Ordering::Relaxed);
        let snapshot = match self.context.with(|ctx| ctx.eval::<String, _>(SNAPSHOT)) {
            Ok(json) => match serde_json::from_str::<Snapshot>(&json) {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    outcome = ContextOutcome::Faulted(format!("unreadable snapshot: {err}"));
                    Snapshot::default()
                }
            },
            Err(err) => {
                outcome = ContextOutcome::Faulted(format!("snapshot failed: {err}"));
                Snapshot::default()
            }
        };

        Evaluation {
            snapshot,
            ticks,
            outcome,
        }
    }

    /// Outcome once the interrupt fired, if it did
    fn interrupted(&self) -> Option<ContextOutcome> {
        if self.superseded.load(Ordering::Relaxed) {
            Some(ContextOutcome::Superseded)
        } else if Instant::now() >= self.deadline {
            Some(ContextOutcome::TimedOut)
        } else {
            None
        }
    }

    /// Run queued promise jobs until none remain or the context is stopped
    fn drain_jobs(&self) -> Option<ContextOutcome> {
        loop {
            if let Some(stopped) = self.interrupted() {
                return Some(stopped);
            }
            match self.runtime.execute_pending_job() {
                Ok(true) => {}
                Ok(false) => return None,
                Err(_) => tracing::debug!("promise job raised an exception"),
            }
        }
    }

    fn classify(&self, err: &rquickjs::Error) -> ContextOutcome {
        self.interrupted()
            .unwrap_or_else(|| ContextOutcome::Faulted(err.to_string()))
    }
}
