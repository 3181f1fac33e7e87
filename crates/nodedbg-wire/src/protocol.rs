//! Engine debug protocol message types.
//!
//! Outbound traffic is always a [`Request`]; inbound traffic is a
//! [`Response`] correlated by `request_seq` or an asynchronous [`Event`].
//! Argument structs serialize to the exact field names the engine expects.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Command names understood by the engine.
pub mod command {
    /// Resume, optionally stepping.
    pub const CONTINUE: &str = "continue";
    /// Register a breakpoint.
    pub const SET_BREAKPOINT: &str = "setbreakpoint";
    /// Remove a breakpoint.
    pub const CLEAR_BREAKPOINT: &str = "clearbreakpoint";
    /// Enable or disable a breakpoint.
    pub const CHANGE_BREAKPOINT: &str = "changebreakpoint";
    /// Fetch a range of stack frames.
    pub const BACKTRACE: &str = "backtrace";
    /// Evaluate an expression.
    pub const EVALUATE: &str = "evaluate";
    /// Resolve object handles.
    pub const LOOKUP: &str = "lookup";
    /// Query loaded scripts.
    pub const SCRIPTS: &str = "scripts";
    /// Configure break-on-exception.
    pub const SET_EXCEPTION_BREAK: &str = "setexceptionbreak";
    /// End the debug session without stopping the engine.
    pub const DISCONNECT: &str = "disconnect";
}

/// Event names emitted by the engine.
pub mod event {
    /// Execution stopped at a breakpoint or a debugger statement.
    pub const BREAK: &str = "break";
    /// Execution stopped on a thrown exception.
    pub const EXCEPTION: &str = "exception";
    /// A script finished compiling.
    pub const AFTER_COMPILE: &str = "afterCompile";
}

// ---------------------------------------------------------------------------
// Base protocol messages
// ---------------------------------------------------------------------------

/// An outbound request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Sequence number.
    pub seq: i64,
    /// Always "request".
    #[serde(rename = "type")]
    pub message_type: String,
    /// The command to execute.
    pub command: String,
    /// Command arguments (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<serde_json::Value>,
}

impl Request {
    /// Build a request with the given sequence number.
    pub fn new(seq: i64, command: impl Into<String>, arguments: Option<serde_json::Value>) -> Self {
        Self {
            seq,
            message_type: "request".to_string(),
            command: command.into(),
            arguments,
        }
    }
}

/// A response to an earlier request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Sequence number of this message.
    #[serde(default)]
    pub seq: i64,
    /// Sequence number of the request being answered.
    #[serde(default)]
    pub request_seq: i64,
    /// Whether the request succeeded.
    #[serde(default)]
    pub success: bool,
    /// The command this response is for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Error text when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Whether the engine is running after this request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub running: Option<bool>,
    /// Command-specific payload.
    #[serde(default)]
    pub body: serde_json::Value,
    /// Value descriptors referenced by handle from `body`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refs: Option<Vec<serde_json::Value>>,
}

/// An asynchronous engine event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Sequence number of this message.
    #[serde(default)]
    pub seq: i64,
    /// Event name.
    pub event: String,
    /// Event-specific payload.
    #[serde(default)]
    pub body: serde_json::Value,
    /// Value descriptors referenced by handle from `body`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refs: Option<Vec<serde_json::Value>>,
}

/// Any message the engine sends after the handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InboundMessage {
    /// Answer to a request.
    Response(Response),
    /// Unsolicited notification.
    Event(Event),
}

impl InboundMessage {
    /// Inline value descriptors carried by the message.
    pub fn refs(&self) -> &[serde_json::Value] {
        let refs = match self {
            InboundMessage::Response(r) => &r.refs,
            InboundMessage::Event(e) => &e.refs,
        };
        refs.as_deref().unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Request arguments
// ---------------------------------------------------------------------------

/// Step granularity for `continue`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepAction {
    /// Step into calls.
    In,
    /// Run to the caller.
    Out,
    /// Step over calls.
    Next,
}

/// Arguments for `continue`. Empty means a plain resume.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContinueArguments {
    /// Step action, if stepping.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stepaction: Option<StepAction>,
    /// Number of steps.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stepcount: Option<u32>,
}

impl ContinueArguments {
    /// A single step of the given kind.
    pub fn step(action: StepAction) -> Self {
        Self {
            stepaction: Some(action),
            stepcount: Some(1),
        }
    }
}

/// Arguments for `setbreakpoint`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetBreakpointArguments {
    /// Target kind; always "script".
    #[serde(rename = "type")]
    pub target_type: String,
    /// Remote script name.
    pub target: String,
    /// Zero-based line.
    pub line: u32,
    /// Zero-based column.
    pub column: u32,
    /// Whether the breakpoint starts enabled.
    pub enabled: bool,
}

impl SetBreakpointArguments {
    /// An enabled breakpoint on a named script.
    pub fn script(target: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            target_type: "script".to_string(),
            target: target.into(),
            line,
            column,
            enabled: true,
        }
    }
}

/// Arguments for `clearbreakpoint`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClearBreakpointArguments {
    /// Engine breakpoint id.
    pub breakpoint: i64,
}

/// Arguments for `changebreakpoint`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeBreakpointArguments {
    /// Engine breakpoint id.
    pub breakpoint: i64,
    /// New enabled state.
    pub enabled: bool,
}

/// Arguments for `backtrace`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktraceArguments {
    /// First frame index, inclusive.
    pub from_frame: u32,
    /// Last frame index, exclusive.
    pub to_frame: u32,
    /// Ask the engine to inline referenced values into `refs`.
    pub inline_refs: bool,
}

/// Arguments for `evaluate`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluateArguments {
    /// Expression text.
    pub expression: String,
    /// Frame to evaluate in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame: Option<u32>,
    /// Evaluate in the global scope instead of a frame.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global: Option<bool>,
}

/// Arguments for `lookup`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupArguments {
    /// Handles to resolve.
    pub handles: Vec<i64>,
    /// Preview length cap; `-1` for unbounded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_string_length: Option<i64>,
}

/// Script type mask covering native, extension and normal scripts.
pub const ALL_SCRIPT_TYPES: u32 = 7;

/// Arguments for `scripts`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptsArguments {
    /// Script type mask.
    pub types: u32,
    /// Restrict to these script ids.
    pub ids: Vec<i64>,
    /// Include full source text.
    pub include_source: bool,
}

/// Exception class for `setexceptionbreak`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExceptionBreakType {
    /// Every thrown exception.
    All,
    /// Exceptions nothing catches.
    Uncaught,
}

/// Arguments for `setexceptionbreak`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetExceptionBreakArguments {
    /// Which exceptions break.
    #[serde(rename = "type")]
    pub break_type: ExceptionBreakType,
    /// Whether breaking is on.
    pub enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_serializes_with_type_field() {
        let req = Request::new(1, command::CONTINUE, None);
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value, json!({"seq": 1, "type": "request", "command": "continue"}));
    }

    #[test]
    fn request_with_arguments() {
        let args = serde_json::to_value(ClearBreakpointArguments { breakpoint: 4 }).unwrap();
        let req = Request::new(7, command::CLEAR_BREAKPOINT, Some(args));
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["arguments"]["breakpoint"], 4);
        assert_eq!(value["seq"], 7);
    }

    #[test]
    fn inbound_response_parses() {
        let msg: InboundMessage = serde_json::from_value(json!({
            "seq": 12, "type": "response", "request_seq": 3, "command": "backtrace",
            "success": true, "running": false,
            "body": {"totalFrames": 2}, "refs": [{"handle": 5, "type": "number", "value": 1}]
        }))
        .unwrap();
        match &msg {
            InboundMessage::Response(r) => {
                assert_eq!(r.request_seq, 3);
                assert!(r.success);
                assert_eq!(r.running, Some(false));
                assert_eq!(r.body["totalFrames"], 2);
            }
            other => panic!("expected response, got {other:?}"),
        }
        assert_eq!(msg.refs().len(), 1);
    }

    #[test]
    fn inbound_failed_response_keeps_message() {
        let msg: InboundMessage = serde_json::from_value(json!({
            "type": "response", "request_seq": 9, "success": false, "message": "ReferenceError: x is not defined"
        }))
        .unwrap();
        match msg {
            InboundMessage::Response(r) => {
                assert!(!r.success);
                assert_eq!(r.message.as_deref(), Some("ReferenceError: x is not defined"));
                assert!(r.body.is_null());
            }
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn inbound_event_parses() {
        let msg: InboundMessage = serde_json::from_value(json!({
            "seq": 4, "type": "event", "event": "afterCompile",
            "body": {"script": {"id": 3, "name": "/app/x.js"}}
        }))
        .unwrap();
        match &msg {
            InboundMessage::Event(e) => {
                assert_eq!(e.event, event::AFTER_COMPILE);
                assert_eq!(e.body["script"]["id"], 3);
            }
            other => panic!("expected event, got {other:?}"),
        }
        assert!(msg.refs().is_empty());
    }

    #[test]
    fn inbound_unknown_type_rejected() {
        let result = serde_json::from_value::<InboundMessage>(json!({"type": "request", "seq": 1}));
        assert!(result.is_err());
    }

    #[test]
    fn continue_step_arguments() {
        let value = serde_json::to_value(ContinueArguments::step(StepAction::Next)).unwrap();
        assert_eq!(value, json!({"stepaction": "next", "stepcount": 1}));
        let value = serde_json::to_value(ContinueArguments::default()).unwrap();
        assert_eq!(value, json!({}));
    }

    #[test]
    fn setbreakpoint_arguments() {
        let value = serde_json::to_value(SetBreakpointArguments::script("app/x.js", 10, 0)).unwrap();
        assert_eq!(
            value,
            json!({"type": "script", "target": "app/x.js", "line": 10, "column": 0, "enabled": true})
        );
    }

    #[test]
    fn backtrace_arguments_are_camel_case() {
        let value = serde_json::to_value(BacktraceArguments {
            from_frame: 5,
            to_frame: 10,
            inline_refs: true,
        })
        .unwrap();
        assert_eq!(value, json!({"fromFrame": 5, "toFrame": 10, "inlineRefs": true}));
    }

    #[test]
    fn lookup_and_scripts_arguments() {
        let value = serde_json::to_value(LookupArguments {
            handles: vec![12],
            max_string_length: Some(-1),
        })
        .unwrap();
        assert_eq!(value, json!({"handles": [12], "maxStringLength": -1}));

        let value = serde_json::to_value(ScriptsArguments {
            types: ALL_SCRIPT_TYPES,
            ids: vec![3],
            include_source: true,
        })
        .unwrap();
        assert_eq!(value, json!({"types": 7, "ids": [3], "includeSource": true}));
    }

    #[test]
    fn exception_break_arguments() {
        let value = serde_json::to_value(SetExceptionBreakArguments {
            break_type: ExceptionBreakType::Uncaught,
            enabled: true,
        })
        .unwrap();
        assert_eq!(value, json!({"type": "uncaught", "enabled": true}));
    }

    #[test]
    fn evaluate_arguments_skip_unset_fields() {
        let value = serde_json::to_value(EvaluateArguments {
            expression: "process.exit(1);".into(),
            global: Some(true),
            ..EvaluateArguments::default()
        })
        .unwrap();
        assert_eq!(value, json!({"expression": "process.exit(1);", "global": true}));
    }
}
