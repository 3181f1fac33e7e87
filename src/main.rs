mod host_task;
mod host_types;

use std::env;
use std::io::BufRead;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use tokio::sync::mpsc;

use nodedbg_config::{load_session_config, SessionConfig};
use nodedbg_engine::{DebuggedProcess, HostNotifier};

use crate::host_types::HostCommand;

const USAGE: &str = "usage: nodedbg [--project DIR] [SCRIPT]";

/// What to debug, from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    /// A project directory holding a `.nodedbg` file.
    Project(PathBuf),
    /// A single script run under a discovered engine.
    Script(PathBuf),
}

fn parse_args(args: &[String]) -> Result<Target> {
    match args {
        [] => Ok(Target::Project(PathBuf::from("."))),
        [flag, dir] if flag == "--project" => Ok(Target::Project(PathBuf::from(dir))),
        [script] if !script.starts_with('-') => Ok(Target::Script(PathBuf::from(script))),
        _ => bail!("{}", USAGE),
    }
}

fn resolve_config(target: &Target) -> Result<Option<SessionConfig>> {
    match target {
        Target::Project(dir) => {
            load_session_config(dir).with_context(|| format!("failed to load config from {}", dir.display()))
        }
        Target::Script(script) => {
            let script = std::path::absolute(script)
                .with_context(|| format!("bad script path: {}", script.display()))?;
            Ok(Some(SessionConfig::for_script(&script)?))
        }
    }
}

fn init_logging() {
    let filter_str = env::var("NODEDBG_LOG").unwrap_or_else(|_| "info".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_new(filter_str)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_env_filter(env_filter)
        .init();
}

fn run_debugger(target: Target) -> Result<()> {
    init_logging();

    let Some(config) = resolve_config(&target)? else {
        tracing::info!("no .nodedbg found; nothing to debug");
        return Ok(());
    };

    // Start tokio runtime for the debug session
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    let (notifier, evt_rx) = HostNotifier::channel();
    let process = DebuggedProcess::new(config, notifier).context("failed to prepare debug session")?;
    let Some(process) = process else {
        tracing::info!("debugging is disabled for this project");
        return Ok(());
    };

    runtime.spawn(crate::host_task::event_task(evt_rx));
    runtime
        .block_on(process.launch())
        .with_context(|| format!("failed to start debugging on port {}", process.port()))?;
    tracing::info!("attached on port {}", process.port());

    let (cmd_tx, cmd_rx) = mpsc::channel::<HostCommand>(16);
    let task = runtime.spawn(crate::host_task::host_task(process.clone(), cmd_rx));

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("failed to read console input")?;
        let cmd = match HostCommand::parse(&line) {
            Ok(Some(cmd)) => cmd,
            Ok(None) => continue,
            Err(message) => {
                eprintln!("{message}");
                continue;
            }
        };
        let finished = matches!(cmd, HostCommand::Detach | HostCommand::Quit);
        if cmd_tx.blocking_send(cmd).is_err() || finished {
            break;
        }
    }
    drop(cmd_tx);

    if let Err(e) = runtime.block_on(task) {
        tracing::error!("host task failed: {}", e);
    }
    if process.is_attached() {
        // Console closed without an explicit detach.
        let _ = runtime.block_on(process.terminate());
    }
    Ok(())
}

fn main() {
    let args: Vec<String> = env::args().skip(1).collect();

    if let Err(e) = parse_args(&args).and_then(run_debugger) {
        eprintln!("nodedbg: {:#}", e);
        std::process::exit(1);
    }
}
