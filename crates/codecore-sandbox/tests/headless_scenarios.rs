//! End-to-end runs through the headless QuickJS surface

use codecore_document::SourceText;
use codecore_profile::builtin::THREEJS_CDN;
use codecore_profile::Selection;
use codecore_sandbox::{
    ChannelLevel, ContextId, ContextOutcome, ExecutionContext, HeadlessConfig, HeadlessSurface,
    IsolationHost, RecordingDelegate, Sandbox, SandboxConfig,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

fn sandbox() -> Sandbox<HeadlessSurface> {
    Sandbox::new(HeadlessSurface::default()).unwrap()
}

async fn run(sandbox: &Sandbox<HeadlessSurface>, code: &str, selection: Selection) -> Arc<ExecutionContext> {
    sandbox.run(&SourceText::from(code), &selection).await.unwrap();
    sandbox.host().settled().await.unwrap()
}

#[tokio::test]
async fn log_call_renders_to_console_panel() {
    let sandbox = sandbox();
    let context = run(&sandbox, "console.log(\"hi\", 42)", Selection::profile("default")).await;

    assert_eq!(context.profile.as_str(), "vanilla");
    assert_eq!(context.capture.lines(), vec!["hi 42"]);
    assert!(!context.capture.error_visible());
    assert_eq!(context.outcome, ContextOutcome::Settled);
}

#[tokio::test]
async fn thrown_error_reveals_error_panel() {
    let sandbox = sandbox();
    let context = run(&sandbox, "throw new Error(\"boom\")", Selection::profile("default")).await;

    assert!(context.capture.error_visible());
    let text = context.capture.error_text();
    assert!(text.contains("Code Error:"), "{text}");
    assert!(text.contains("boom"), "{text}");
    // Reported once by the protective block, not again by the uncaught handler
    assert!(!text.contains("Runtime Error:"), "{text}");
    assert!(context.uncaught.is_empty());
    assert!(context.capture.lines().is_empty());
}

#[tokio::test]
async fn threejs_source_resolves_and_references_cdn_first() {
    let sandbox = sandbox();
    let source = SourceText::from("const scene = new THREE.Scene();");

    let document = sandbox.render(&source, &Selection::Auto).unwrap();
    assert_eq!(document.profile().as_str(), "threejs");
    let cdn = document.text().find(THREEJS_CDN).unwrap();
    let code = document.text().find("new THREE.Scene()").unwrap();
    assert!(cdn < code);

    // The CDN script is not fetched headlessly, so the reference fails inside
    // the context and is captured there
    let report = sandbox.run(&source, &Selection::Auto).await.unwrap();
    assert_eq!(report.profile.as_str(), "threejs");
    let context = sandbox.host().settled().await.unwrap();
    assert!(context.capture.error_visible());
    assert!(context.capture.error_text().contains("THREE"));
}

#[tokio::test]
async fn wrap_forwards_identical_arguments() {
    let delegate = Arc::new(RecordingDelegate::new());
    let host = HeadlessSurface::default().with_delegate(delegate.clone());
    let sandbox = Sandbox::new(host).unwrap();

    let context = run(
        &sandbox,
        "console.log('a', {x: 1}, [1, 2], null, true);",
        Selection::Auto,
    )
    .await;

    assert_eq!(context.capture.lines(), vec!["a {\"x\":1} [1,2] null true"]);
    assert_eq!(context.channel.len(), 1);
    assert_eq!(context.channel[0].level, ChannelLevel::Log);
    assert_eq!(
        context.channel[0].args,
        vec![json!("a"), json!({"x": 1}), json!([1, 2]), json!(null), json!(true)]
    );
    assert_eq!(delegate.calls_for(context.id), context.channel);
}

#[tokio::test]
async fn calls_through_global_console_are_captured() {
    let sandbox = sandbox();
    let context = run(
        &sandbox,
        "window.console.log('via window');\n\
         globalThis.console.error('x');\n\
         setTimeout(function later() { console.warn('from timer'); }, 5);",
        Selection::profile("vanilla"),
    )
    .await;

    assert_eq!(context.capture.lines(), vec!["via window", "x", "from timer"]);
    assert!(context.capture.error_visible());
    let text = context.capture.error_text();
    assert!(text.contains("Console Error:"), "{text}");
    assert!(text.contains("from timer"), "{text}");

    // Only the informational call reaches the underlying channel under vanilla
    let rendered: Vec<String> = context.channel.iter().map(|c| c.rendered()).collect();
    assert_eq!(rendered, vec!["via window"]);
}

#[tokio::test]
async fn facade_is_the_global_console() {
    let sandbox = sandbox();
    let context = run(
        &sandbox,
        "console.log(window.console === console, typeof console.table);",
        Selection::Auto,
    )
    .await;

    assert_eq!(context.capture.lines(), vec!["true undefined"]);
}

#[tokio::test]
async fn error_forwarding_follows_profile() {
    let sandbox = sandbox();

    let contained = run(&sandbox, "console.error('bad');", Selection::profile("vanilla")).await;
    assert!(contained.capture.error_visible());
    assert!(contained.capture.error_text().contains("Console Error:"));
    assert_eq!(contained.capture.lines(), vec!["bad"]);
    assert!(contained.capture.console.html.contains("color:red"));
    assert!(contained.channel.is_empty());

    let forwarding = run(&sandbox, "console.warn('careful');", Selection::profile("threejs")).await;
    assert!(forwarding.capture.error_visible());
    assert_eq!(forwarding.channel.len(), 1);
    assert_eq!(forwarding.channel[0].level, ChannelLevel::Warn);
    assert_eq!(forwarding.channel[0].rendered(), "careful");
}

#[tokio::test]
async fn rendered_text_is_escaped() {
    let sandbox = sandbox();
    let context = run(&sandbox, "console.log('<b>bold</b> & co');", Selection::Auto).await;

    assert!(context.capture.console.html.contains("&lt;b&gt;bold&lt;/b&gt; &amp; co"));
    assert_eq!(context.capture.lines(), vec!["<b>bold</b> & co"]);
}

#[tokio::test]
async fn timers_and_promises_are_drained() {
    let sandbox = sandbox();
    let context = run(
        &sandbox,
        "setTimeout(() => console.log('timeout'), 50);\n\
         Promise.resolve(3).then(v => console.log('resolved', v));\n\
         requestAnimationFrame(t => console.log('frame', t));\n\
         console.log('sync');",
        Selection::Auto,
    )
    .await;

    assert_eq!(
        context.capture.lines(),
        vec!["sync", "resolved 3", "frame 16", "timeout"]
    );
    assert_eq!(context.ticks, 2);
    assert_eq!(context.pending_timers, 0);
}

#[tokio::test]
async fn async_exception_reaches_uncaught_handler() {
    let sandbox = sandbox();
    let context = run(
        &sandbox,
        "setTimeout(function () { throw new Error('later'); }, 10);",
        Selection::Auto,
    )
    .await;

    assert!(context.capture.error_visible());
    let text = context.capture.error_text();
    assert!(text.contains("Runtime Error:"), "{text}");
    assert!(text.contains("Uncaught Error: later"), "{text}");
    assert!(text.contains("Line: "), "{text}");
    assert!(context.uncaught.is_empty());
}

#[tokio::test]
async fn syntax_error_is_kept_as_uncaught() {
    let sandbox = sandbox();
    let context = run(&sandbox, "console.log(", Selection::Auto).await;

    assert_eq!(context.uncaught.len(), 1);
    assert!(context.uncaught[0].starts_with("Uncaught SyntaxError"), "{:?}", context.uncaught);
}

#[tokio::test]
async fn runaway_code_times_out_and_next_run_recovers() {
    let config = SandboxConfig::default().with_headless(HeadlessConfig::default().with_timeout_ms(200));
    let sandbox = Sandbox::from_config(&config, HeadlessSurface::new(config.headless.clone())).unwrap();

    let stuck = run(&sandbox, "console.log('start'); while (true) {}", Selection::Auto).await;
    assert_eq!(stuck.outcome, ContextOutcome::TimedOut);
    assert_eq!(stuck.capture.lines(), vec!["start"]);

    let next = run(&sandbox, "console.log('fine');", Selection::Auto).await;
    assert_eq!(next.outcome, ContextOutcome::Settled);
    assert_eq!(next.capture.lines(), vec!["fine"]);
}

#[tokio::test]
async fn new_run_replaces_context() {
    let sandbox = sandbox();

    let first = run(
        &sandbox,
        "var leaked = 1; console.error('old');",
        Selection::Auto,
    )
    .await;
    assert_eq!(first.id, ContextId(1));
    assert!(first.capture.error_visible());

    let second = run(&sandbox, "console.log(typeof leaked);", Selection::Auto).await;
    assert_eq!(second.id, ContextId(2));
    assert_eq!(sandbox.host().current_context(), Some(ContextId(2)));
    assert_eq!(second.capture.lines(), vec!["undefined"]);
    assert!(!second.capture.error_visible());
}

#[tokio::test]
async fn empty_source_runs_cleanly() {
    let sandbox = sandbox();
    let context = run(&sandbox, "", Selection::Auto).await;

    assert!(context.capture.is_empty());
    assert!(context.uncaught.is_empty());
    assert_eq!(context.outcome, ContextOutcome::Settled);
}

#[tokio::test]
async fn selection_change_reruns_with_new_instrumentation() {
    use codecore_sandbox::{ExecutionTrigger, MemoryStore, RunCause, RunEvent, StorageKeys};


    let sandbox = Arc::new(sandbox());
    let handle = ExecutionTrigger::new(
        Arc::clone(&sandbox),
        Arc::new(MemoryStore::new()),
        StorageKeys::default(),
        std::time::Duration::from_millis(1_000),
    )
    .spawn();
    let mut runs = handle.subscribe();

    handle.edit("console.error('x');");
    handle.select(Selection::profile("vanilla"));
    let RunEvent::Completed(first) = runs.recv().await.unwrap() else {
        panic!("first run failed");
    };
    let before = sandbox.host().settled().await.unwrap();
    assert_eq!(first.profile.as_str(), "vanilla");
    assert!(before.channel.is_empty());

    handle.select(Selection::profile("threejs"));
    let RunEvent::Completed(second) = runs.recv().await.unwrap() else {
        panic!("second run failed");
    };
    let after = sandbox.host().settled().await.unwrap();
    assert_eq!(second.cause, RunCause::SelectionChange);
    assert_eq!(second.profile.as_str(), "threejs");
    assert!(after.id > before.id);
    assert_eq!(after.channel.len(), 1);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn run_supersedes_busy_context() {
    use codecore_sandbox::{
        EditorState, ExecutionTrigger, MemoryStore, RunEvent, StorageKeys, TriggerState,
    };
    use std::time::{Duration, Instant};

    let config =
        SandboxConfig::default().with_headless(HeadlessConfig::default().with_timeout_ms(3_000));
    let sandbox = Arc::new(
        Sandbox::from_config(&config, HeadlessSurface::new(config.headless.clone())).unwrap(),
    );
    let handle = ExecutionTrigger::new(
        Arc::clone(&sandbox),
        Arc::new(MemoryStore::new()),
        StorageKeys::default(),
        config.debounce(),
    )
    .with_state(EditorState::new("while (true) {}", Selection::Auto))
    .spawn();
    let mut runs = handle.subscribe();
    let start = Instant::now();

    handle.run();
    let RunEvent::Completed(busy) = runs.recv().await.unwrap() else {
        panic!("busy run failed");
    };
    // The hand-off is done even though the loop is still spinning
    assert_eq!(handle.state(), TriggerState::Idle);
    assert_eq!(busy.context, Some(ContextId(1)));

    handle.edit("console.log('new')");
    handle.run();
    let RunEvent::Completed(next) = runs.recv().await.unwrap() else {
        panic!("second run failed");
    };
    let context = sandbox.host().settled().await.unwrap();

    assert!(start.elapsed() < Duration::from_millis(1_500), "{:?}", start.elapsed());
    assert_eq!(next.context, Some(context.id));
    assert_eq!(context.outcome, ContextOutcome::Settled);
    assert_eq!(context.capture.lines(), vec!["new"]);

    handle.shutdown().await.unwrap();
}
