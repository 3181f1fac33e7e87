//! nodedbg-engine — the debugged-process model.
//!
//! This crate launches or attaches to a script engine, tracks its scripts,
//! breakpoints, threads and stack frames, exposes live values as a lazy
//! property tree, and reports everything to the host through one ordered
//! notification channel.

pub mod breakpoint;
pub mod error;
pub mod frame;
pub mod host;
pub mod mapping;
pub mod port;
pub mod process;
pub mod script;
pub mod state;
pub mod temp_cache;
pub mod value;

// Re-export key types for convenience.
pub use breakpoint::{BindResult, BoundBreakpoint, BreakpointManager, PendingBreakpoint};
pub use error::EngineError;
pub use frame::{DebuggedThread, FunctionInfo, StackFrame, ThreadId, ENGINE_THREAD_ID};
pub use host::{host_boundary, HostEvent, HostFailure, HostNotifier};
pub use mapping::ScriptMapping;
pub use nodedbg_wire::StepAction;
pub use port::{is_valid_debug_port, randomize_port};
pub use process::DebuggedProcess;
pub use script::{NodeScript, ScriptRegistry};
pub use state::{ProcessLifecycle, ProcessState};
pub use temp_cache::TempScriptCache;
pub use value::{Property, PropertyFlags, StringLength, ValueContext, ValueKind};
