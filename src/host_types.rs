use std::path::PathBuf;

use nodedbg_engine::{HostEvent, StepAction};

/// Commands read from the console and executed by the host task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum HostCommand {
    Continue,
    Step(StepAction),
    Backtrace,
    /// Evaluate in the given frame.
    Print { frame: u32, expression: String },
    /// Expand a value one level.
    Expand { frame: u32, expression: String },
    SetValue { frame: u32, target: String, literal: String },
    Break { file: PathBuf, line: u32 },
    Delete(i64),
    Enable { id: i64, enabled: bool },
    Breakpoints,
    Modules,
    /// Resolve the local source of the nth module.
    Source(usize),
    Detach,
    Quit,
    Help,
}

pub(crate) const HELP: &str = "\
commands:
  c                    continue
  s | n | o            step in / over / out
  bt                   backtrace
  p [#frame] EXPR      evaluate
  x [#frame] EXPR      list the properties of a value
  set [#frame] LHS = VALUE
  b FILE:LINE          set a breakpoint (1-based line)
  d ID | en ID | dis ID
  bl                   list breakpoints
  mods                 list loaded scripts
  src N                local source of script N
  detach | q           detach / terminate the debuggee";

impl HostCommand {
    /// Parse one console line. Blank lines yield `None`.
    pub(crate) fn parse(line: &str) -> Result<Option<Self>, String> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };
        let cmd = match word {
            "c" | "cont" => HostCommand::Continue,
            "s" | "step" => HostCommand::Step(StepAction::In),
            "n" | "next" => HostCommand::Step(StepAction::Next),
            "o" | "out" => HostCommand::Step(StepAction::Out),
            "bt" => HostCommand::Backtrace,
            "p" | "print" => {
                let (frame, expression) = frame_and_rest(rest)?;
                HostCommand::Print { frame, expression }
            }
            "x" => {
                let (frame, expression) = frame_and_rest(rest)?;
                HostCommand::Expand { frame, expression }
            }
            "set" => {
                let (frame, assignment) = frame_and_rest(rest)?;
                let (target, literal) = assignment
                    .split_once('=')
                    .ok_or_else(|| "usage: set [#frame] LHS = VALUE".to_string())?;
                HostCommand::SetValue {
                    frame,
                    target: target.trim().to_string(),
                    literal: literal.trim().to_string(),
                }
            }
            "b" | "break" => {
                let (file, line) = rest
                    .rsplit_once(':')
                    .ok_or_else(|| "usage: b FILE:LINE".to_string())?;
                let line: u32 = line.parse().map_err(|_| format!("bad line number: {line}"))?;
                if line == 0 || file.is_empty() {
                    return Err("usage: b FILE:LINE".to_string());
                }
                HostCommand::Break {
                    file: PathBuf::from(file),
                    line,
                }
            }
            "d" | "delete" => HostCommand::Delete(parse_id(rest)?),
            "en" => HostCommand::Enable {
                id: parse_id(rest)?,
                enabled: true,
            },
            "dis" => HostCommand::Enable {
                id: parse_id(rest)?,
                enabled: false,
            },
            "bl" => HostCommand::Breakpoints,
            "mods" => HostCommand::Modules,
            "src" => HostCommand::Source(rest.parse().map_err(|_| format!("bad module index: {rest}"))?),
            "detach" => HostCommand::Detach,
            "q" | "quit" => HostCommand::Quit,
            "h" | "help" | "?" => HostCommand::Help,
            other => return Err(format!("unknown command: {other} (try 'help')")),
        };
        Ok(Some(cmd))
    }
}

/// One-line console rendering of an engine notification.
pub(crate) fn describe_event(event: &HostEvent) -> String {
    match event {
        HostEvent::ModuleLoaded(script) => format!("[module] {} (#{})", script.name, script.id),
        HostEvent::OutputString(text) => text.trim_end_matches('\n').to_string(),
        HostEvent::ProcessExited(code) => format!("[exited] code {code}"),
        HostEvent::ThreadStarted(thread) => format!("[thread {thread}] started"),
        HostEvent::ThreadExited { thread, code } => format!("[thread {thread}] exited with {code}"),
        HostEvent::BreakpointHit { thread, breakpoints } => {
            let ids: Vec<String> = breakpoints.iter().map(|b| b.id.to_string()).collect();
            format!("[thread {thread}] hit breakpoint {}", ids.join(", "))
        }
        HostEvent::BreakpointBound { bound, .. } => format!(
            "[breakpoint {}] bound at {}:{}",
            bound.id,
            bound.target,
            bound.line + 1
        ),
        HostEvent::AsyncBreakComplete(thread) => format!("[thread {thread}] paused"),
        HostEvent::LoadComplete(thread) => format!("[thread {thread}] paused at entry"),
        HostEvent::ProgramDestroyed(code) => format!("[session] ended ({code})"),
    }
}

fn parse_id(text: &str) -> Result<i64, String> {
    text.parse().map_err(|_| format!("bad breakpoint id: {text}"))
}

/// Split an optional leading `#N` frame selector from the rest.
fn frame_and_rest(text: &str) -> Result<(u32, String), String> {
    let (frame, rest) = match text.strip_prefix('#') {
        Some(tail) => {
            let (n, rest) = tail.split_once(char::is_whitespace).unwrap_or((tail, ""));
            let frame = n.parse().map_err(|_| format!("bad frame index: {n}"))?;
            (frame, rest.trim())
        }
        None => (0, text),
    };
    if rest.is_empty() {
        return Err("missing expression".to_string());
    }
    Ok((frame, rest.to_string()))
}
