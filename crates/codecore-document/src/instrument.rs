//! Instrumentation injection
//!
//! Produces the script fragment that runs at the top of the inline script
//! block, before any user code. It defines one per-context sink value bound
//! to [`SINK_BINDING`]:
//!
//! ```text
//! __codecore_sink
//!   ├── channel      the context's global `console` once installed
//!   │     ├── log / info / debug   → console panel, then forwarded
//!   │     └── warn / error         → error panel + console panel,
//!   │                                forwarded only if the variant says so
//!   ├── codeError(e) → "Code Error" entry, remembered for de-duplication
//!   └── variant      instrumentation variant name
//! ```
//!
//! It also registers `window.onerror`, which writes a "Runtime Error" entry
//! and returns `true` so default top-level reporting is suppressed.
//!
//! The facade replaces `window.console`, so calls made through
//! `window.console`, `globalThis.console`, functions defined anywhere in the
//! page and profile resource scripts are all captured. The console object
//! found at install time stays the forwarding delegate.

use crate::surface::SurfaceLayout;
use codecore_profile::ExecutionProfile;

/// Global binding holding the per-context sink
pub const SINK_BINDING: &str = "__codecore_sink";

const SINK_TEMPLATE: &str = r#"var __codecore_sink = (function (root, original) {
  'use strict';
  var ERROR_ID = __ERROR_ID__;
  var CONSOLE_ID = __CONSOLE_ID__;
  var FORWARD_ERRORS = __FORWARD_ERRORS__;
  var VARIANT = __VARIANT__;
  var reported = typeof WeakSet === 'function' ? new WeakSet() : null;
  var reportedPrimitive = { set: false, value: undefined };

  function panel(id) {
    return root.document ? root.document.getElementById(id) : null;
  }

  function escapeHtml(text) {
    return String(text)
      .replace(/&/g, '&amp;')
      .replace(/</g, '&lt;')
      .replace(/>/g, '&gt;')
      .replace(/"/g, '&quot;')
      .replace(/'/g, '&#39;');
  }

  function render(value) {
    if (typeof value === 'string') {
      return value;
    }
    try {
      var json = JSON.stringify(value);
      if (json !== undefined) {
        return json;
      }
    } catch (ignored) {}
    try {
      return String(value);
    } catch (ignored) {
      return Object.prototype.toString.call(value);
    }
  }

  function renderAll(args) {
    var parts = [];
    for (var i = 0; i < args.length; i++) {
      parts.push(render(args[i]));
    }
    return escapeHtml(parts.join(' '));
  }

  function appendConsole(html) {
    var el = panel(CONSOLE_ID);
    if (!el) {
      return;
    }
    el.innerHTML += html + '<br>';
    el.scrollTop = el.scrollHeight;
  }

  function showError(html) {
    var el = panel(ERROR_ID);
    if (!el) {
      return;
    }
    el.innerHTML += html;
    el.style.display = 'block';
  }

  function remember(error) {
    if (reported && error !== null && (typeof error === 'object' || typeof error === 'function')) {
      reported.add(error);
    } else {
      reportedPrimitive.set = true;
      reportedPrimitive.value = error;
    }
  }

  function alreadyReported(error) {
    if (error === null || error === undefined) {
      return false;
    }
    if (typeof error === 'object' || typeof error === 'function') {
      return reported !== null && reported.has(error);
    }
    if (reportedPrimitive.set && reportedPrimitive.value === error) {
      reportedPrimitive.set = false;
      return true;
    }
    return false;
  }

  function forward(name, args) {
    if (original && typeof original[name] === 'function') {
      original[name].apply(original, args);
    }
  }

  function informational(name) {
    return function () {
      var args = Array.prototype.slice.call(arguments);
      appendConsole(renderAll(args));
      forward(name, args);
    };
  }

  function erroneous(name) {
    return function () {
      var args = Array.prototype.slice.call(arguments);
      var text = renderAll(args);
      showError('<strong>Console Error:</strong><br>' + text + '<br><br>');
      appendConsole('<span style="color:red">' + text + '</span>');
      if (FORWARD_ERRORS) {
        forward(name, args);
      }
    };
  }

  root.onerror = function (message, source, line, col, error) {
    if (alreadyReported(error)) {
      return true;
    }
    showError('<strong>Runtime Error:</strong><br>' + escapeHtml(message) +
      '<br>Line: ' + line + ', Col: ' + col +
      '<br><br><pre>' + escapeHtml(error && error.stack ? error.stack : '') + '</pre>');
    return true;
  };

  var channel = Object.create(original || null);
  channel.log = informational('log');
  channel.info = informational('info');
  channel.debug = informational('debug');
  channel.warn = erroneous('warn');
  channel.error = erroneous('error');
  root.console = channel;

  function codeError(error) {
    remember(error);
    var message = error && error.message !== undefined ? error.message : render(error);
    var stack = error && error.stack ? error.stack : '';
    showError('<strong>Code Error:</strong><br>' + escapeHtml(message) +
      '<br><br><pre>' + escapeHtml(stack) + '</pre>');
  }

  return Object.freeze({ channel: channel, codeError: codeError, variant: VARIANT });
})(window, window.console);
"#;

/// Instrumentation for one profile
///
/// Carries the variant name and the forwarding flag alongside the script so
/// hosts and tests can inspect what was installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentationFragment {
    /// Variant name from the profile
    pub variant: String,
    /// Whether warn/error calls reach the underlying channel
    pub forward_errors: bool,
    /// Script text, placed first in the inline script block
    pub script: String,
}

/// Builds [`InstrumentationFragment`]s for a surface layout
#[derive(Debug, Clone, Default)]
pub struct InstrumentationInjector {
    layout: SurfaceLayout,
}

impl InstrumentationInjector {
    /// Create injector for the default layout
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom surface layout
    #[must_use]
    pub fn with_layout(mut self, layout: SurfaceLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Surface layout the fragments target
    #[inline]
    #[must_use]
    pub fn layout(&self) -> &SurfaceLayout {
        &self.layout
    }

    /// Produce the instrumentation fragment for `profile`
    #[must_use]
    pub fn produce(&self, profile: &ExecutionProfile) -> InstrumentationFragment {
        let variant = &profile.instrumentation;
        let script = SINK_TEMPLATE
            .replace("__ERROR_ID__", &js_string(&self.layout.error_id))
            .replace("__CONSOLE_ID__", &js_string(&self.layout.console_id))
            .replace("__FORWARD_ERRORS__", if variant.forward_errors { "true" } else { "false" })
            .replace("__VARIANT__", &js_string(&variant.name));

        InstrumentationFragment {
            variant: variant.name.clone(),
            forward_errors: variant.forward_errors,
            script,
        }
    }
}

/// Quote `value` as a JavaScript string literal safe inside a script element
fn js_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    let mut prev = '\0';
    for ch in value.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '/' if prev == '<' => out.push_str("\\/"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", u32::from(c))),
            c => out.push(c),
        }
        prev = ch;
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use codecore_profile::builtin;

    #[test]
    fn fragment_follows_variant() {
        let injector = InstrumentationInjector::new();

        let vanilla = injector.produce(&builtin::vanilla());
        assert!(!vanilla.forward_errors);
        assert_eq!(vanilla.variant, "contained");
        assert!(vanilla.script.contains("var FORWARD_ERRORS = false;"));

        let threejs = injector.produce(&builtin::threejs());
        assert!(threejs.forward_errors);
        assert!(threejs.script.contains("var FORWARD_ERRORS = true;"));
    }

    #[test]
    fn fragment_installs_all_interceptors() {
        let fragment = InstrumentationInjector::new().produce(&builtin::vanilla());
        let script = &fragment.script;

        assert!(script.starts_with("var __codecore_sink = "));
        assert!(script.contains("root.onerror = function"));
        assert!(script.contains("return true;"));
        for method in ["log", "info", "debug", "warn", "error"] {
            assert!(script.contains(&format!("channel.{method} = ")), "missing {method}");
        }
        assert!(!script.contains("__ERROR_ID__"));
        assert!(!script.contains("console.log ="));
    }

    #[test]
    fn facade_becomes_global_console() {
        let fragment = InstrumentationInjector::new().produce(&builtin::threejs());
        let script = &fragment.script;

        let built = script.find("channel.error = ").unwrap();
        let installed = script.find("root.console = channel;").unwrap();
        assert!(built < installed);
        assert!(script.ends_with("})(window, window.console);\n"));
    }

    #[test]
    fn fragment_uses_layout_ids() {
        let layout = SurfaceLayout {
            error_id: "errors".to_string(),
            console_id: "out".to_string(),
        };
        let fragment = InstrumentationInjector::new()
            .with_layout(layout)
            .produce(&builtin::vanilla());

        assert!(fragment.script.contains("var ERROR_ID = \"errors\";"));
        assert!(fragment.script.contains("var CONSOLE_ID = \"out\";"));
    }

    #[test]
    fn js_string_escapes() {
        assert_eq!(js_string("plain"), "\"plain\"");
        assert_eq!(js_string("a\"b\\c"), "\"a\\\"b\\\\c\"");
        assert_eq!(js_string("</script>"), "\"<\\/script>\"");
        assert_eq!(js_string("x\ny"), "\"x\\ny\"");
    }
}
