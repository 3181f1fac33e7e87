//! Host notification contract.
//!
//! Everything the engine tells the host goes through one [`HostNotifier`]
//! channel, so the host sees notifications strictly one at a time and in the
//! order they were raised. Failures raised inside host-facing calls are
//! converted to a [`HostFailure`] code at [`host_boundary`].

use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::breakpoint::{BoundBreakpoint, PendingBreakpoint};
use crate::error::EngineError;
use crate::frame::ThreadId;
use crate::script::NodeScript;

/// A notification for the host.
#[derive(Debug, Clone)]
pub enum HostEvent {
    /// A script was loaded by the engine.
    ModuleLoaded(Arc<NodeScript>),
    /// Text for the host's output pane.
    OutputString(String),
    /// The debuggee went away without a detach.
    ProcessExited(u32),
    /// The engine thread exists.
    ThreadStarted(ThreadId),
    /// The engine thread is gone.
    ThreadExited {
        /// Thread that exited.
        thread: ThreadId,
        /// Exit code.
        code: u32,
    },
    /// Execution stopped on one or more known breakpoints.
    BreakpointHit {
        /// Stopped thread.
        thread: ThreadId,
        /// Breakpoints that were hit.
        breakpoints: Vec<BoundBreakpoint>,
    },
    /// A pending breakpoint was registered with the engine.
    BreakpointBound {
        /// What the host asked for.
        pending: PendingBreakpoint,
        /// What the engine registered.
        bound: BoundBreakpoint,
    },
    /// Execution stopped for any other reason.
    AsyncBreakComplete(ThreadId),
    /// The engine finished its initial load and is paused at entry.
    LoadComplete(ThreadId),
    /// The debug session ended through a detach or terminate.
    ProgramDestroyed(u32),
}

/// Sender half of the host notification queue.
#[derive(Debug, Clone)]
pub struct HostNotifier {
    tx: mpsc::UnboundedSender<HostEvent>,
}

impl HostNotifier {
    /// Create a notifier and the receiver the host drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<HostEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue a notification. Dropped silently once the host stops listening.
    pub fn notify(&self, event: HostEvent) {
        tracing::debug!(?event, "host notification");
        if self.tx.send(event).is_err() {
            tracing::debug!("host receiver gone; notification dropped");
        }
    }
}

/// `E_FAIL`
pub const E_FAIL: u32 = 0x8000_4005;
/// `RPC_E_SERVERFAULT`
pub const RPC_E_SERVERFAULT: u32 = 0x8001_0105;
/// `S_FALSE`
pub const S_FALSE: u32 = 0x0000_0001;

/// Generic failure code reported to the host instead of an error value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostFailure {
    /// The operation failed.
    Fail,
    /// The operation panicked.
    ServerFault,
    /// Nothing to report: no session, no answer, or nothing bound.
    NotAvailable,
}

impl HostFailure {
    /// Numeric code for the host.
    pub fn code(self) -> u32 {
        match self {
            HostFailure::Fail => E_FAIL,
            HostFailure::ServerFault => RPC_E_SERVERFAULT,
            HostFailure::NotAvailable => S_FALSE,
        }
    }
}

impl From<&EngineError> for HostFailure {
    fn from(err: &EngineError) -> Self {
        match err {
            EngineError::NotAttached | EngineError::NoResponse(_) | EngineError::LookupFailed(_) => {
                HostFailure::NotAvailable
            }
            _ => HostFailure::Fail,
        }
    }
}

/// Run a host-facing operation, converting errors and panics into codes.
///
/// The operation runs on its own task so a panic inside it cannot unwind
/// into the host's dispatch loop. The original error is logged.
pub async fn host_boundary<T, F>(operation: &str, fut: F) -> Result<T, HostFailure>
where
    F: Future<Output = Result<T, EngineError>> + Send + 'static,
    T: Send + 'static,
{
    match tokio::spawn(fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            tracing::error!("{} failed: {}", operation, e);
            Err(HostFailure::from(&e))
        }
        Err(e) => {
            tracing::error!("{} aborted: {}", operation, e);
            Err(HostFailure::ServerFault)
        }
    }
}
