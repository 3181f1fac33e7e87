//! The debugged process: launch, attach, run control and teardown.
//!
//! [`DebuggedProcess`] owns everything a debug session accumulates: the
//! protocol session, the script registry, bound breakpoints, the engine
//! thread and the temp source cache. Engine events are consumed by one
//! pump task and turned into [`HostEvent`]s in wire order.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use nodedbg_config::{DebugMode, SessionConfig, DEFAULT_DEBUG_PORT};
use nodedbg_wire::{
    command, event, to_arguments, BacktraceArguments, ChangeBreakpointArguments, ClearBreakpointArguments,
    ContinueArguments, EvaluateArguments, ExceptionBreakType, ResponseCallback, ScriptsArguments, Session,
    SessionEvent, SetBreakpointArguments, SetExceptionBreakArguments, StepAction, Transport, ALL_SCRIPT_TYPES,
};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{timeout, timeout_at, Duration, Instant};

use crate::breakpoint::{BindResult, BoundBreakpoint, BreakpointManager, PendingBreakpoint};
use crate::error::EngineError;
use crate::frame::{DebuggedThread, StackFrame, ThreadId, ENGINE_THREAD_ID};
use crate::host::{HostEvent, HostNotifier};
use crate::mapping::ScriptMapping;
use crate::port::randomize_port;
use crate::script::{NodeScript, ScriptRegistry};
use crate::state::{ProcessLifecycle, ProcessState};
use crate::temp_cache::TempScriptCache;
use crate::value::{evaluate_raw, Property, ValueContext, CHILDREN_LOOKUP_TIMEOUT_MS};

/// How long attach waits for the handshake, in seconds.
pub const ATTACH_TIMEOUT_SECS: u64 = 10;
/// Frames fetched per `backtrace` request.
pub const BACKTRACE_BATCH: u32 = 5;
/// Wait for each `backtrace` batch (milliseconds).
pub const BACKTRACE_TIMEOUT_MS: u64 = 1000;
/// Total time a stack walk may take (milliseconds).
pub const STACK_WALK_BUDGET_MS: u64 = 5000;
/// Wait for the exit call made by terminate (milliseconds).
pub const TERMINATE_TIMEOUT_MS: u64 = 500;
/// Wait for a remote source fetch (milliseconds).
pub const SOURCE_FETCH_TIMEOUT_MS: u64 = 200;
/// Wait for breakpoint registration (milliseconds).
pub const REQUEST_TIMEOUT_MS: u64 = 10_000;

const CONNECT_RETRY_MS: u64 = 100;
const EXIT_EXPRESSION: &str = "process.exit(1);";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

type HandshakeTx = oneshot::Sender<Result<(), String>>;

struct ProcessInner {
    config: SessionConfig,
    port: u16,
    mapping: ScriptMapping,
    notifier: HostNotifier,
    lifecycle: Mutex<ProcessLifecycle>,
    session: Mutex<Option<Session>>,
    scripts: Mutex<ScriptRegistry>,
    breakpoints: Mutex<BreakpointManager>,
    threads: Mutex<Vec<DebuggedThread>>,
    temp_cache: Mutex<TempScriptCache>,
    child: Mutex<Option<Child>>,
    detaching: AtomicBool,
    cleaned_up: AtomicBool,
}

impl ProcessInner {
    fn session(&self) -> Result<Session, EngineError> {
        lock(&self.session).clone().ok_or(EngineError::NotAttached)
    }

    fn resolve_script(&self, descriptor: &serde_json::Value) -> Option<Arc<NodeScript>> {
        let resolved = lock(&self.scripts).resolve(descriptor);
        match resolved {
            Ok((script, added)) => {
                if added {
                    self.notifier.notify(HostEvent::ModuleLoaded(script.clone()));
                }
                Some(script)
            }
            Err(e) => {
                tracing::warn!("ignoring script descriptor: {}", e);
                None
            }
        }
    }

    fn on_connected(&self, session: &Session) {
        if let Err(e) = lock(&self.lifecycle).attached() {
            tracing::warn!("handshake ignored: {}", e);
            return;
        }
        tracing::info!("attached to engine on port {}", self.port);
        let args = SetExceptionBreakArguments {
            break_type: ExceptionBreakType::Uncaught,
            enabled: true,
        };
        session.request_async(command::SET_EXCEPTION_BREAK, to_arguments(&args), None);
        lock(&self.threads).push(DebuggedThread::new(ENGINE_THREAD_ID));
        self.notifier.notify(HostEvent::ThreadStarted(ENGINE_THREAD_ID));
        self.notifier.notify(HostEvent::LoadComplete(ENGINE_THREAD_ID));
    }

    fn on_event(&self, name: &str, body: &serde_json::Value) {
        match name {
            event::BREAK => {
                self.mark_stopped();
                let ids: Vec<i64> = body
                    .get("breakpoints")
                    .and_then(serde_json::Value::as_array)
                    .map(|ids| ids.iter().filter_map(serde_json::Value::as_i64).collect())
                    .unwrap_or_default();
                let hits = lock(&self.breakpoints).hits(&ids);
                if hits.is_empty() {
                    self.notifier.notify(HostEvent::AsyncBreakComplete(ENGINE_THREAD_ID));
                } else {
                    self.notifier.notify(HostEvent::BreakpointHit {
                        thread: ENGINE_THREAD_ID,
                        breakpoints: hits,
                    });
                }
            }
            event::EXCEPTION => {
                self.mark_stopped();
                let text = body
                    .pointer("/exception/text")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("<unknown>");
                let uncaught = body.get("uncaught").and_then(serde_json::Value::as_bool) == Some(true);
                let prefix = if uncaught { "Uncaught exception" } else { "Exception" };
                self.notifier
                    .notify(HostEvent::OutputString(format!("{prefix}: {text}\n")));
                self.notifier.notify(HostEvent::AsyncBreakComplete(ENGINE_THREAD_ID));
            }
            event::AFTER_COMPILE => match body.get("script") {
                Some(script) => {
                    self.resolve_script(script);
                }
                None => tracing::warn!("afterCompile without script"),
            },
            other => tracing::debug!("unhandled event: {}", other),
        }
    }

    fn mark_stopped(&self) {
        if let Err(e) = lock(&self.lifecycle).stopped() {
            tracing::debug!("{}", e);
        }
        self.forget_frames();
    }

    /// Frames from an earlier pause describe a stack that no longer exists.
    fn forget_frames(&self) {
        for thread in lock(&self.threads).iter_mut() {
            thread.set_frames(Vec::new());
        }
    }

    fn on_closed(&self, reason: &str) {
        if !self.detaching.load(Ordering::SeqCst) {
            tracing::info!("debuggee connection lost: {}", reason);
            let had_thread = !lock(&self.threads).is_empty();
            if had_thread {
                self.notifier.notify(HostEvent::ThreadExited {
                    thread: ENGINE_THREAD_ID,
                    code: 0,
                });
            }
            self.notifier.notify(HostEvent::ProcessExited(0));
        }
        self.cleanup();
    }

    /// Release the child process and temp files. Runs once.
    fn cleanup(&self) {
        if self.cleaned_up.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::debug!("cleaning up debug session");
        if let Some(session) = lock(&self.session).as_ref() {
            session.close();
        }
        if let Some(mut child) = lock(&self.child).take() {
            if let Err(e) = child.start_kill() {
                tracing::debug!("cannot kill engine process: {}", e);
            }
        }
        lock(&self.temp_cache).cleanup();
        lock(&self.lifecycle).terminated();
    }
}

/// One debugged engine process.
///
/// Cloning yields another handle to the same process.
#[derive(Clone)]
pub struct DebuggedProcess {
    inner: Arc<ProcessInner>,
}

impl DebuggedProcess {
    /// Prepare a session from a resolved config.
    ///
    /// Returns `None` when the config disables debugging. Nothing is
    /// spawned or connected until [`launch`](Self::launch).
    pub fn new(config: SessionConfig, notifier: HostNotifier) -> Result<Option<Self>, EngineError> {
        let port = match (&config.mode, config.port) {
            (DebugMode::Disabled, _) => return Ok(None),
            (_, Some(port)) => port,
            (DebugMode::Run { .. }, None) => randomize_port()?,
            (DebugMode::Connect { .. }, None) => DEFAULT_DEBUG_PORT,
        };
        let mapping = ScriptMapping::new(&config.mappings);
        let temp_cache = TempScriptCache::new()?;
        Ok(Some(Self {
            inner: Arc::new(ProcessInner {
                config,
                port,
                mapping,
                notifier,
                lifecycle: Mutex::new(ProcessLifecycle::new()),
                session: Mutex::new(None),
                scripts: Mutex::new(ScriptRegistry::new()),
                breakpoints: Mutex::new(BreakpointManager::new()),
                threads: Mutex::new(Vec::new()),
                temp_cache: Mutex::new(temp_cache),
                child: Mutex::new(None),
                detaching: AtomicBool::new(false),
                cleaned_up: AtomicBool::new(false),
            }),
        }))
    }

    /// Debug port in use.
    pub fn port(&self) -> u16 {
        self.inner.port
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn state(&self) -> ProcessState {
        lock(&self.inner.lifecycle).state()
    }

    /// Spawn the engine if the config asks for it, then attach.
    pub async fn launch(&self) -> Result<(), EngineError> {
        if let DebugMode::Run { main, engine } = &self.inner.config.mode {
            lock(&self.inner.lifecycle).start()?;
            if let Err(e) = self.spawn_engine(engine, main) {
                tracing::error!("{}", e);
                self.inner.notifier.notify(HostEvent::OutputString(format!("{e}\n")));
                self.inner.cleanup();
                return Err(e);
            }
        }
        self.attach().await
    }

    fn spawn_engine(&self, engine: &Path, main: &Path) -> Result<(), EngineError> {
        let mut child = Command::new(engine)
            .arg(format!("--debug-brk={}", self.inner.port))
            .arg(main)
            .current_dir(&self.inner.config.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::Spawn(format!("{}: {}", engine.display(), e)))?;
        tracing::info!(
            "started {} on {} (pid {:?})",
            engine.display(),
            main.display(),
            child.id()
        );
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_output(stdout, self.inner.notifier.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_output(stderr, self.inner.notifier.clone()));
        }
        *lock(&self.inner.child) = Some(child);
        Ok(())
    }

    /// Connect to the debug port and wait for the engine handshake.
    ///
    /// The connect is retried until the attach deadline, since a freshly
    /// spawned engine may not be listening yet.
    pub async fn attach(&self) -> Result<(), EngineError> {
        lock(&self.inner.lifecycle).begin_attach()?;
        let deadline = Instant::now() + Duration::from_secs(ATTACH_TIMEOUT_SECS);
        let host = self.inner.config.host().to_string();

        let result = self.connect_and_handshake(&host, deadline).await;
        if let Err(e) = &result {
            tracing::error!("attach failed: {}", e);
            self.inner.notifier.notify(HostEvent::OutputString(format!("{e}\n")));
            self.inner.cleanup();
        }
        result
    }

    async fn connect_and_handshake(&self, host: &str, deadline: Instant) -> Result<(), EngineError> {
        let transport = connect_with_retry(host, self.inner.port, deadline).await?;
        let (session, events) = Session::start(transport).map_err(|e| EngineError::Connect {
            address: format!("{}:{}", host, self.inner.port),
            message: e.to_string(),
        })?;
        *lock(&self.inner.session) = Some(session.clone());

        let (handshake_tx, handshake_rx) = oneshot::channel();
        tokio::spawn(event_pump(
            events,
            session,
            Arc::downgrade(&self.inner),
            Some(handshake_tx),
        ));

        match timeout_at(deadline, handshake_rx).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(reason))) => Err(EngineError::Connect {
                address: format!("{}:{}", host, self.inner.port),
                message: reason,
            }),
            Ok(Err(_)) | Err(_) => Err(EngineError::AttachTimeout(ATTACH_TIMEOUT_SECS)),
        }
    }

    // -- Breakpoints ------------------------------------------------------

    /// Register a breakpoint for a local file.
    ///
    /// A rejected or unanswered request yields [`BindResult::Unbound`].
    pub async fn set_breakpoint(&self, file: &Path, line: u32, column: u32) -> Result<BindResult, EngineError> {
        let session = self.inner.session()?;
        let target = self.map_breakpoint_target(file);
        let args = SetBreakpointArguments::script(target.clone(), line, column);
        let response = session
            .request_sync(
                command::SET_BREAKPOINT,
                to_arguments(&args),
                Duration::from_millis(REQUEST_TIMEOUT_MS),
            )
            .await;
        let id = match response {
            Some(r) if r.success => r.body.get("breakpoint").and_then(serde_json::Value::as_i64),
            Some(r) => {
                tracing::warn!(
                    "breakpoint at {}:{} rejected: {}",
                    target,
                    line,
                    r.message.unwrap_or_default()
                );
                None
            }
            None => {
                tracing::warn!("no answer binding breakpoint at {}:{}", target, line);
                None
            }
        };
        let Some(id) = id else {
            return Ok(BindResult::Unbound);
        };
        let bound = BoundBreakpoint {
            id,
            file: file.to_path_buf(),
            target,
            line,
            column,
            enabled: true,
        };
        lock(&self.inner.breakpoints).add(bound.clone());
        self.inner.notifier.notify(HostEvent::BreakpointBound {
            pending: PendingBreakpoint::new(file, line, column),
            bound: bound.clone(),
        });
        Ok(BindResult::Bound(bound))
    }

    /// Remove a breakpoint. Does not wait for the engine.
    pub fn remove_breakpoint(&self, id: i64) -> Result<(), EngineError> {
        let session = self.inner.session()?;
        let args = ClearBreakpointArguments { breakpoint: id };
        session.request_async(command::CLEAR_BREAKPOINT, to_arguments(&args), None);
        lock(&self.inner.breakpoints).remove(id);
        Ok(())
    }

    /// Enable or disable a breakpoint. Does not wait for the engine.
    pub fn enable_breakpoint(&self, id: i64, enabled: bool) -> Result<(), EngineError> {
        let session = self.inner.session()?;
        let args = ChangeBreakpointArguments { breakpoint: id, enabled };
        session.request_async(command::CHANGE_BREAKPOINT, to_arguments(&args), None);
        if !lock(&self.inner.breakpoints).set_enabled(id, enabled) {
            tracing::debug!("enable_breakpoint: unknown id {}", id);
        }
        Ok(())
    }

    pub fn breakpoints(&self) -> Vec<BoundBreakpoint> {
        lock(&self.inner.breakpoints).all().cloned().collect()
    }

    // -- Run control ------------------------------------------------------

    /// Resume execution.
    pub fn continue_execution(&self) -> Result<(), EngineError> {
        self.resume(None)
    }

    /// Let a debuggee paused at entry start running.
    pub fn resume_from_launch(&self) -> Result<(), EngineError> {
        self.resume(None)
    }

    /// Take one step of the given kind.
    pub fn step(&self, action: StepAction) -> Result<(), EngineError> {
        self.resume(to_arguments(&ContinueArguments::step(action)))
    }

    fn resume(&self, args: Option<serde_json::Value>) -> Result<(), EngineError> {
        let session = self.inner.session()?;
        lock(&self.inner.lifecycle).resumed()?;
        self.inner.forget_frames();
        session.request_async(command::CONTINUE, args, None);
        Ok(())
    }

    // -- Inspection -------------------------------------------------------

    /// Fetch the stack of `thread`, innermost first.
    ///
    /// Frames come in batches until the engine's total is reached or the
    /// walk budget runs out. A batch that gets no answer ends the walk with
    /// the frames collected so far.
    pub async fn stack_walk(&self, thread: ThreadId) -> Result<Vec<StackFrame>, EngineError> {
        let session = self.inner.session()?;
        let known = lock(&self.inner.threads).iter().any(|t| t.id == thread);
        if !known {
            return Err(EngineError::InvalidState(format!("no thread {thread}")));
        }
        let deadline = Instant::now() + Duration::from_millis(STACK_WALK_BUDGET_MS);
        let mut frames = Vec::new();
        let mut from_frame = 0u32;
        let mut total_frames = u32::MAX;

        while from_frame < total_frames && Instant::now() < deadline {
            let args = BacktraceArguments {
                from_frame,
                to_frame: from_frame + BACKTRACE_BATCH,
                inline_refs: true,
            };
            let Some(response) = session
                .request_sync(
                    command::BACKTRACE,
                    to_arguments(&args),
                    Duration::from_millis(BACKTRACE_TIMEOUT_MS),
                )
                .await
            else {
                tracing::debug!("backtrace from {} unanswered; walk truncated", from_frame);
                break;
            };
            total_frames = response
                .body
                .get("totalFrames")
                .and_then(serde_json::Value::as_u64)
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(0);
            let batch = response
                .body
                .get("frames")
                .and_then(serde_json::Value::as_array)
                .cloned()
                .unwrap_or_default();
            for descriptor in &batch {
                match self.build_frame(&session, descriptor).await {
                    Ok(frame) => frames.push(frame),
                    Err(e) => tracing::warn!("skipping frame: {}", e),
                }
            }
            from_frame += BACKTRACE_BATCH;
        }

        if let Some(t) = lock(&self.inner.threads).iter_mut().find(|t| t.id == thread) {
            t.set_frames(frames.clone());
        }
        Ok(frames)
    }

    async fn build_frame(&self, session: &Session, descriptor: &serde_json::Value) -> Result<StackFrame, EngineError> {
        let index = descriptor
            .get("index")
            .and_then(serde_json::Value::as_u64)
            .and_then(|i| u32::try_from(i).ok());
        let ctx = ValueContext::new(session.clone(), index);
        let script = match descriptor.get("script") {
            Some(token) => {
                let resolved = ctx
                    .resolve(token, Duration::from_millis(CHILDREN_LOOKUP_TIMEOUT_MS))
                    .await;
                self.inner.resolve_script(&resolved)
            }
            None => None,
        };
        StackFrame::from_descriptor(ctx, descriptor, script).await
    }

    /// Evaluate `expression` in frame `frame`.
    pub async fn evaluate(&self, frame: u32, expression: &str) -> Result<Property, EngineError> {
        let session = self.inner.session()?;
        let ctx = ValueContext::new(session, Some(frame));
        let body = ctx.evaluate(expression).await?;
        Property::evaluated(ctx, expression, body).await
    }

    /// Evaluate in `frame`, answering a bare argument or local name from
    /// the frame itself.
    pub async fn evaluate_in_frame(&self, frame: &StackFrame, expression: &str) -> Result<Property, EngineError> {
        if let Some(existing) = frame.find_variable(expression) {
            return Ok(existing.clone());
        }
        self.evaluate(frame.index, expression).await
    }

    // -- Scripts ----------------------------------------------------------

    /// All scripts seen so far, in load order.
    pub fn modules(&self) -> Vec<Arc<NodeScript>> {
        lock(&self.inner.scripts).all().to_vec()
    }

    pub fn threads(&self) -> Vec<DebuggedThread> {
        lock(&self.inner.threads).clone()
    }

    /// Local file for `script`.
    ///
    /// Tries the mapping rules, then the remote name as a local path. With
    /// `fetch`, a script that still has no readable local file has its
    /// source downloaded into the temp cache; the wait for that is short
    /// and the result may still be `None`.
    pub async fn get_local_file(&self, script: &Arc<NodeScript>, fetch: bool) -> Option<PathBuf> {
        if script.local_file().is_none() {
            if let Some(local) = self.inner.mapping.to_local(&script.name) {
                script.set_local_file(PathBuf::from(local));
            }
        }
        if script.local_file().is_none() && !script.name.is_empty() && Path::new(&script.name).is_file() {
            script.set_local_file(PathBuf::from(&script.name));
        }
        let readable = script.local_file().is_some_and(|p| p.is_file());
        if fetch && !readable {
            self.fetch_source(script).await;
        }
        script.local_file()
    }

    async fn fetch_source(&self, script: &Arc<NodeScript>) {
        let Ok(session) = self.inner.session() else {
            return;
        };
        let (done_tx, done_rx) = oneshot::channel::<()>();
        let weak = Arc::downgrade(&self.inner);
        let target = script.clone();
        let callback: ResponseCallback = Box::new(move |response| {
            let source = response
                .as_ref()
                .and_then(|r| r.body.pointer("/0/source"))
                .and_then(serde_json::Value::as_str);
            match (source, weak.upgrade()) {
                (Some(source), Some(inner)) => {
                    if let Err(e) = lock(&inner.temp_cache).save(&target, source) {
                        tracing::warn!("cannot cache source of {}: {}", target.name, e);
                    }
                }
                _ => tracing::debug!("no source for script {}", target.id),
            }
            let _ = done_tx.send(());
        });
        let args = ScriptsArguments {
            types: ALL_SCRIPT_TYPES,
            ids: vec![script.id],
            include_source: true,
        };
        session.request_async(command::SCRIPTS, to_arguments(&args), Some(callback));
        if timeout(Duration::from_millis(SOURCE_FETCH_TIMEOUT_MS), done_rx).await.is_err() {
            tracing::debug!("source of {} not fetched in time", script.name);
        }
    }

    /// Remote script name to use for a breakpoint in `local`.
    ///
    /// A loaded script whose local file is exactly `local` wins, then the
    /// mapping rules; otherwise the local name is passed through.
    pub fn map_breakpoint_target(&self, local: &Path) -> String {
        if let Some(script) = lock(&self.inner.scripts).find_by_local_file(local) {
            return script.name.clone();
        }
        let local = local.to_string_lossy();
        self.inner
            .mapping
            .to_remote(&local)
            .unwrap_or_else(|| local.into_owned())
    }

    // -- Teardown ---------------------------------------------------------

    /// End the session, leaving the debuggee running.
    pub fn detach(&self) -> Result<(), EngineError> {
        let session = self.begin_teardown()?;
        self.finish_teardown(&session);
        Ok(())
    }

    /// Ask the debuggee to exit, then detach whether or not it did.
    ///
    /// The engine may drop the connection while running the exit call, so
    /// the session is marked as detaching before the request goes out.
    pub async fn terminate(&self) -> Result<(), EngineError> {
        let session = self.begin_teardown()?;
        let args = EvaluateArguments {
            expression: EXIT_EXPRESSION.to_string(),
            frame: None,
            global: Some(true),
        };
        if let Err(e) = evaluate_raw(&session, &args, Duration::from_millis(TERMINATE_TIMEOUT_MS)).await {
            tracing::debug!("exit request: {}", e);
        }
        self.finish_teardown(&session);
        Ok(())
    }

    fn begin_teardown(&self) -> Result<Session, EngineError> {
        let session = self.inner.session()?;
        lock(&self.inner.lifecycle).begin_detach()?;
        self.inner.detaching.store(true, Ordering::SeqCst);
        tracing::info!("detaching from engine");
        Ok(session)
    }

    /// Tolerates a session the engine already closed.
    fn finish_teardown(&self, session: &Session) {
        if !lock(&self.inner.threads).is_empty() {
            self.inner.notifier.notify(HostEvent::ThreadExited {
                thread: ENGINE_THREAD_ID,
                code: 0,
            });
        }
        self.inner.notifier.notify(HostEvent::ProgramDestroyed(0));
        session.request_async(command::DISCONNECT, None, None);
        session.close();
    }

    /// Whether a frame-less expression can be evaluated right now.
    pub fn is_attached(&self) -> bool {
        lock(&self.inner.lifecycle).is_attached()
    }
}

async fn connect_with_retry(host: &str, port: u16, deadline: Instant) -> Result<Transport, EngineError> {
    let address = format!("{host}:{port}");
    loop {
        let error = match timeout_at(deadline, Transport::connect(host, port)).await {
            Ok(Ok(transport)) => return Ok(transport),
            Ok(Err(e)) => e.to_string(),
            Err(_) => "timed out".to_string(),
        };
        let retry = Duration::from_millis(CONNECT_RETRY_MS);
        if Instant::now() + retry >= deadline {
            return Err(EngineError::Connect {
                address,
                message: error,
            });
        }
        tracing::debug!("connect to {} failed ({}); retrying", address, error);
        tokio::time::sleep(retry).await;
    }
}

async fn event_pump(
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
    session: Session,
    inner: Weak<ProcessInner>,
    mut handshake: Option<HandshakeTx>,
) {
    while let Some(event) = events.recv().await {
        let Some(process) = inner.upgrade() else {
            break;
        };
        match event {
            SessionEvent::Connected(headers) => {
                tracing::debug!(?headers, "handshake");
                process.on_connected(&session);
                if let Some(tx) = handshake.take() {
                    let _ = tx.send(Ok(()));
                }
            }
            SessionEvent::Event { name, body } => process.on_event(&name, &body),
            SessionEvent::UnmatchedResponse(_) => {}
            SessionEvent::Closed { reason } => {
                match handshake.take() {
                    Some(tx) => {
                        let _ = tx.send(Err(reason));
                    }
                    None => process.on_closed(&reason),
                }
                break;
            }
        }
    }
}

async fn forward_output<R>(stream: R, notifier: HostNotifier)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => notifier.notify(HostEvent::OutputString(format!("{line}\n"))),
            Ok(None) => break,
            Err(e) => {
                tracing::debug!("debuggee output stream failed: {}", e);
                break;
            }
        }
    }
}
