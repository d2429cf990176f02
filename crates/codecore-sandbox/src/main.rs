use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use codecore_document::SourceText;
use codecore_profile::Selection;
use codecore_sandbox::{
    logging, ContextOutcome, EditorState, ExecutionTrigger, FileSurface, HeadlessSurface,
    JsonFileStore, LogFormat, RunEvent, Sandbox, SandboxConfig,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

fn file_arg() -> Arg {
    Arg::new("file")
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help("Source file to run")
}

fn profile_arg() -> Arg {
    Arg::new("profile")
        .long("profile")
        .short('p')
        .default_value("auto")
        .help("Profile id, or `auto` to detect from the source")
}

fn state_arg() -> Arg {
    Arg::new("state")
        .long("state")
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help("JSON file holding the saved editor state")
}

fn cli() -> Command {
    Command::new("codecore")
        .version(codecore_sandbox::VERSION)
        .about("Live script sandbox with captured errors and console output")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .global(true)
                .default_value("text")
                .value_parser(["text", "json"])
                .help("Log output format"),
        )
        .subcommand(Command::new("profiles").about("List registered profiles"))
        .subcommand(
            Command::new("detect")
                .about("Print the profile a source file resolves to")
                .arg(file_arg())
                .arg(profile_arg()),
        )
        .subcommand(
            Command::new("render")
                .about("Print or write the synthesized document")
                .arg(file_arg())
                .arg(profile_arg())
                .arg(
                    Arg::new("out")
                        .long("out")
                        .short('o')
                        .value_parser(value_parser!(PathBuf))
                        .help("Write the document here instead of stdout"),
                ),
        )
        .subcommand(
            Command::new("run")
                .about("Run a source file headlessly and print captured output")
                .arg(file_arg())
                .arg(profile_arg())
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print the execution context as JSON"),
                ),
        )
        .subcommand(
            Command::new("watch")
                .about("Rewrite a document file whenever the source changes")
                .arg(file_arg())
                .arg(profile_arg())
                .arg(
                    Arg::new("out")
                        .long("out")
                        .short('o')
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Document file to keep up to date"),
                )
                .arg(
                    Arg::new("poll-ms")
                        .long("poll-ms")
                        .default_value("200")
                        .value_parser(value_parser!(u64))
                        .help("Source polling interval"),
                ),
        )
        .subcommand(
            Command::new("save")
                .about("Save source text and selection")
                .arg(file_arg())
                .arg(profile_arg())
                .arg(state_arg()),
        )
        .subcommand(
            Command::new("restore")
                .about("Print the saved source text and selection")
                .arg(state_arg()),
        )
}

#[tokio::main]
async fn main() -> ExitCode {
    let matches = cli().get_matches();

    let format = matches
        .get_one::<String>("log-format")
        .and_then(|f| f.parse::<LogFormat>().ok())
        .unwrap_or_default();
    logging::init(format);

    match dispatch(&matches).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(matches: &ArgMatches) -> Result<ExitCode> {
    let config = match matches.get_one::<PathBuf>("config") {
        Some(path) => SandboxConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => SandboxConfig::default(),
    };

    match matches.subcommand() {
        Some(("profiles", _)) => profiles(&config),
        Some(("detect", args)) => detect(&config, args),
        Some(("render", args)) => render(&config, args).await,
        Some(("run", args)) => run(&config, args).await,
        Some(("watch", args)) => watch(&config, args).await,
        Some(("save", args)) => save(&config, args).await,
        Some(("restore", args)) => restore(&config, args).await,
        _ => Ok(ExitCode::FAILURE),
    }
}

fn read_source(args: &ArgMatches) -> Result<SourceText> {
    let path = args.get_one::<PathBuf>("file").context("missing source file")?;
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    Ok(SourceText::from(text))
}

fn selection(args: &ArgMatches) -> Selection {
    args.get_one::<String>("profile")
        .map(|s| Selection::from(s.clone()))
        .unwrap_or_default()
}

fn profiles(config: &SandboxConfig) -> Result<ExitCode> {
    let registry = config.registry();
    for profile in registry.iter() {
        let marker = if profile.id == *registry.default_id() { " (default)" } else { "" };
        println!("{}{}  {}", profile.id, marker, profile.label);
        for resource in &profile.resources {
            println!("    {}", resource.url);
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn detect(config: &SandboxConfig, args: &ArgMatches) -> Result<ExitCode> {
    let source = read_source(args)?;
    let sandbox = Sandbox::from_config(config, HeadlessSurface::new(config.headless.clone()))?;
    println!("{}", sandbox.resolve(source.as_str(), &selection(args)).id);
    Ok(ExitCode::SUCCESS)
}

async fn render(config: &SandboxConfig, args: &ArgMatches) -> Result<ExitCode> {
    let source = read_source(args)?;
    let selection = selection(args);

    if let Some(out) = args.get_one::<PathBuf>("out") {
        let sandbox = Sandbox::from_config(config, FileSurface::new(out))?;
        let report = sandbox.run(&source, &selection).await?;
        println!("{} {} {}", report.profile, report.digest.short(), out.display());
    } else {
        let sandbox = Sandbox::from_config(config, HeadlessSurface::new(config.headless.clone()))?;
        print!("{}", sandbox.render(&source, &selection)?.text());
    }
    Ok(ExitCode::SUCCESS)
}

async fn run(config: &SandboxConfig, args: &ArgMatches) -> Result<ExitCode> {
    let source = read_source(args)?;
    let sandbox = Sandbox::from_config(config, HeadlessSurface::new(config.headless.clone()))?;
    sandbox.run(&source, &selection(args)).await?;

    let context = sandbox
        .host()
        .settled()
        .await
        .context("host has no execution context after run")?;

    if args.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(context.as_ref())?);
    } else {
        for line in context.capture.lines() {
            println!("{line}");
        }
        if context.capture.error_visible() {
            eprintln!("{}", context.capture.error_text());
        }
        for message in &context.uncaught {
            eprintln!("{message}");
        }
        match &context.outcome {
            ContextOutcome::Settled => {}
            ContextOutcome::TimedOut => eprintln!("timed out"),
            ContextOutcome::Superseded => eprintln!("superseded"),
            ContextOutcome::Faulted(reason) => eprintln!("faulted: {reason}"),
        }
    }

    let failed = context.capture.error_visible()
        || !context.uncaught.is_empty()
        || context.outcome != ContextOutcome::Settled;
    Ok(if failed { ExitCode::FAILURE } else { ExitCode::SUCCESS })
}

async fn watch(config: &SandboxConfig, args: &ArgMatches) -> Result<ExitCode> {
    let path = args.get_one::<PathBuf>("file").context("missing source file")?.clone();
    let out = args.get_one::<PathBuf>("out").context("missing output file")?;
    let poll = Duration::from_millis(*args.get_one::<u64>("poll-ms").unwrap_or(&200));

    let sandbox = Arc::new(Sandbox::from_config(config, FileSurface::new(out))?);
    let store_path = out.with_extension("state.json");
    let initial = EditorState::new(read_to_string(&path)?, selection(args));
    let mut last = initial.source.clone();

    let handle = ExecutionTrigger::new(
        Arc::clone(&sandbox),
        Arc::new(JsonFileStore::new(store_path)),
        config.storage.clone(),
        config.debounce(),
    )
    .with_state(initial)
    .spawn();
    let mut runs = handle.subscribe();
    handle.run();

    let mut ticker = tokio::time::interval(poll);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                match read_to_string(&path) {
                    Ok(text) if text != last => {
                        last.clone_from(&text);
                        handle.edit(text);
                    }
                    Ok(_) => {}
                    Err(err) => tracing::warn!(error = %err, "source unreadable"),
                }
            }
            event = runs.recv() => match event {
                Ok(RunEvent::Completed(report)) => {
                    println!("{} {} {} {}", report.run_id, report.cause, report.profile, report.digest.short());
                }
                Ok(RunEvent::Failed { cause, message }) => eprintln!("{cause}: {message}"),
                Err(err) => tracing::debug!(error = %err, "run events lagged"),
            }
        }
    }

    handle.shutdown().await.context("trigger task failed")?;
    Ok(ExitCode::SUCCESS)
}

fn read_to_string(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

async fn save(config: &SandboxConfig, args: &ArgMatches) -> Result<ExitCode> {
    let source = read_source(args)?;
    let state_path = args.get_one::<PathBuf>("state").context("missing state file")?;
    let store = JsonFileStore::new(state_path);

    EditorState::new(source.as_str(), selection(args))
        .save(&store, &config.storage)
        .await?;
    println!("Saved");
    Ok(ExitCode::SUCCESS)
}

async fn restore(config: &SandboxConfig, args: &ArgMatches) -> Result<ExitCode> {
    let state_path = args.get_one::<PathBuf>("state").context("missing state file")?;
    let store = JsonFileStore::new(state_path);

    match EditorState::restore(&store, &config.storage).await? {
        Some(state) => {
            println!("selection: {}", state.selection);
            print!("{}", state.source);
            Ok(ExitCode::SUCCESS)
        }
        None => {
            eprintln!("nothing saved");
            Ok(ExitCode::FAILURE)
        }
    }
}
