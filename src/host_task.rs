use tokio::sync::mpsc;

use nodedbg_engine::{
    host_boundary, BindResult, DebuggedProcess, EngineError, HostEvent, HostFailure, Property,
    ENGINE_THREAD_ID,
};

use crate::host_types::{describe_event, HostCommand, HELP};

/// Longest string printed in full by `p`.
const MAX_PRINTED_CHARS: usize = 64 * 1024;

/// Async task that executes console commands against the debuggee.
///
/// Runs until the session is detached or terminated, or the console closes
/// its end of the channel.
pub(crate) async fn host_task(process: DebuggedProcess, mut cmd_rx: mpsc::Receiver<HostCommand>) {
    while let Some(cmd) = cmd_rx.recv().await {
        let finished = matches!(cmd, HostCommand::Detach | HostCommand::Quit);
        let outcome = handle_command(&process, cmd).await;
        match outcome {
            Ok(lines) => {
                for line in lines {
                    println!("{line}");
                }
            }
            Err(failure) => println!("error: 0x{:08x}", failure.code()),
        }
        if finished {
            break;
        }
    }
    tracing::debug!("host task exiting");
}

/// Prints engine notifications until the engine side goes away.
pub(crate) async fn event_task(mut evt_rx: mpsc::UnboundedReceiver<HostEvent>) {
    while let Some(event) = evt_rx.recv().await {
        println!("{}", describe_event(&event));
    }
}

async fn handle_command(process: &DebuggedProcess, cmd: HostCommand) -> Result<Vec<String>, HostFailure> {
    let p = process.clone();
    match cmd {
        HostCommand::Continue => host_boundary("continue", async move { p.continue_execution() }).await?,
        HostCommand::Step(action) => host_boundary("step", async move { p.step(action) }).await?,
        HostCommand::Backtrace => {
            let frames = host_boundary("stack walk", async move { p.stack_walk(ENGINE_THREAD_ID).await }).await?;
            return Ok(frames
                .iter()
                .map(|f| format!("#{:<3} {}", f.index, f.display_name()))
                .collect());
        }
        HostCommand::Print { frame, expression } => {
            let text = host_boundary("evaluate", async move {
                let walked = p
                    .threads()
                    .iter()
                    .find(|t| t.id == ENGINE_THREAD_ID)
                    .and_then(|t| t.frames().get(frame as usize).cloned());
                let mut value = match walked {
                    Some(walked) => p.evaluate_in_frame(&walked, &expression).await?,
                    None => p.evaluate(frame, &expression).await?,
                };
                let shown = value.fetch_full_string(MAX_PRINTED_CHARS).await?;
                Ok(format!("{} = {} ({})", value.full_name(), shown, value.type_name()))
            })
            .await?;
            return Ok(vec![text]);
        }
        HostCommand::Expand { frame, expression } => {
            return host_boundary("expand", async move {
                let value = p.evaluate(frame, &expression).await?;
                let children = value.enumerate_children().await?;
                Ok(children.iter().map(describe_property).collect())
            })
            .await;
        }
        HostCommand::SetValue { frame, target, literal } => {
            let text = host_boundary("set value", async move {
                let mut value = p.evaluate(frame, &target).await?;
                value.set_value(&literal).await?;
                Ok(describe_property(&value))
            })
            .await?;
            return Ok(vec![text]);
        }
        HostCommand::Break { file, line } => {
            let bind = host_boundary("set breakpoint", async move {
                p.set_breakpoint(&file, line - 1, 0).await
            })
            .await?;
            if let BindResult::Unbound = bind {
                return Ok(vec!["breakpoint pending: the engine did not accept it".to_string()]);
            }
        }
        HostCommand::Delete(id) => host_boundary("remove breakpoint", async move { p.remove_breakpoint(id) }).await?,
        HostCommand::Enable { id, enabled } => {
            host_boundary("enable breakpoint", async move { p.enable_breakpoint(id, enabled) }).await?
        }
        HostCommand::Breakpoints => {
            return Ok(process
                .breakpoints()
                .iter()
                .map(|b| {
                    format!(
                        "{:>3} {} {}:{}",
                        b.id,
                        if b.enabled { "on " } else { "off" },
                        b.file.display(),
                        b.line + 1
                    )
                })
                .collect());
        }
        HostCommand::Modules => {
            return Ok(process
                .modules()
                .iter()
                .enumerate()
                .map(|(i, s)| format!("{i:>3} #{} {}", s.id, s.name))
                .collect());
        }
        HostCommand::Source(index) => {
            let script = process.modules().get(index).cloned().ok_or(HostFailure::NotAvailable)?;
            let local = host_boundary("get local file", async move {
                p.get_local_file(&script, true)
                    .await
                    .ok_or_else(|| EngineError::NoResponse(format!("source of {}", script.name)))
            })
            .await?;
            return Ok(vec![local.display().to_string()]);
        }
        HostCommand::Detach => host_boundary("detach", async move { p.detach() }).await?,
        HostCommand::Quit => host_boundary("terminate", async move { p.terminate().await }).await?,
        HostCommand::Help => return Ok(HELP.lines().map(str::to_string).collect()),
    }
    Ok(Vec::new())
}

fn describe_property(p: &Property) -> String {
    let marker = if p.flags().expandable { "+" } else { " " };
    format!("{marker} {} = {} ({})", p.name(), p.display(), p.type_name())
}
