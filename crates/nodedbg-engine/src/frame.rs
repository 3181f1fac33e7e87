//! Threads and stack frames of a paused debuggee.
//!
//! Frames are rebuilt from scratch on every stop; nothing carries over
//! between pauses.

use std::sync::Arc;

use tokio::time::Duration;

use crate::error::EngineError;
use crate::script::NodeScript;
use crate::value::{Property, ValueContext, CHILDREN_LOOKUP_TIMEOUT_MS};

/// Host-visible thread identifier.
pub type ThreadId = i64;

/// The engine runs scripts on a single thread, reported with this id.
pub const ENGINE_THREAD_ID: ThreadId = 1;

/// Name information of a function value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionInfo {
    pub name: Option<String>,
    pub inferred_name: Option<String>,
}

impl FunctionInfo {
    pub fn from_descriptor(descriptor: &serde_json::Value) -> Self {
        let field = |key: &str| {
            descriptor
                .get(key)
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
        };
        Self {
            name: field("name"),
            inferred_name: field("inferredName"),
        }
    }

    /// Declared name, else inferred name, else `<no name>`.
    pub fn any_name(&self) -> &str {
        [&self.name, &self.inferred_name]
            .into_iter()
            .flatten()
            .find(|n| !n.is_empty())
            .map_or("<no name>", String::as_str)
    }
}

/// One activation record, innermost first.
#[derive(Debug, Clone)]
pub struct StackFrame {
    /// Zero-based index from the top of the stack.
    pub index: u32,
    /// Script the frame executes in, if it could be resolved.
    pub script: Option<Arc<NodeScript>>,
    pub function: FunctionInfo,
    /// Zero-based line.
    pub line: u32,
    /// Zero-based column.
    pub column: u32,
    pub arguments: Vec<Property>,
    pub locals: Vec<Property>,
}

impl StackFrame {
    /// Build a frame from one `backtrace` frame descriptor.
    ///
    /// `script` is resolved by the caller against its registry. Arguments or
    /// locals that cannot be decoded are logged and left out.
    pub async fn from_descriptor(
        ctx: ValueContext,
        descriptor: &serde_json::Value,
        script: Option<Arc<NodeScript>>,
    ) -> Result<Self, EngineError> {
        let index = descriptor
            .get("index")
            .and_then(serde_json::Value::as_u64)
            .and_then(|i| u32::try_from(i).ok())
            .ok_or_else(|| EngineError::malformed("backtrace", "frame without index"))?;
        let position = |key: &str| {
            descriptor
                .get(key)
                .and_then(serde_json::Value::as_u64)
                .and_then(|v| u32::try_from(v).ok())
                .unwrap_or(0)
        };
        let func = match descriptor.get("func") {
            Some(token) => {
                ctx.resolve(token, Duration::from_millis(CHILDREN_LOOKUP_TIMEOUT_MS))
                    .await
            }
            None => serde_json::Value::Null,
        };

        Ok(Self {
            index,
            script,
            function: FunctionInfo::from_descriptor(&func),
            line: position("line"),
            column: position("column"),
            arguments: variables(&ctx, descriptor.get("arguments")).await,
            locals: variables(&ctx, descriptor.get("locals")).await,
        })
    }

    /// `file.js!name(a, b) Line 12`, with a one-based line.
    pub fn display_name(&self) -> String {
        let mut out = String::new();
        if let Some(script) = &self.script {
            out.push_str(script.file_name());
            out.push('!');
        }
        out.push_str(self.function.any_name());
        let args: Vec<&str> = self
            .arguments
            .iter()
            .map(|a| if a.name().is_empty() { "?" } else { a.name() })
            .collect();
        out.push('(');
        out.push_str(&args.join(", "));
        out.push(')');
        out.push_str(&format!(" Line {}", self.line + 1));
        out
    }

    /// The argument or local named exactly `name`.
    pub fn find_variable(&self, name: &str) -> Option<&Property> {
        self.arguments
            .iter()
            .chain(self.locals.iter())
            .find(|p| p.name() == name)
    }
}

async fn variables(ctx: &ValueContext, list: Option<&serde_json::Value>) -> Vec<Property> {
    let Some(items) = list.and_then(serde_json::Value::as_array) else {
        return Vec::new();
    };
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        match Property::from_descriptor(ctx.clone(), item, None).await {
            Ok(p) => out.push(p),
            Err(e) => tracing::warn!("skipping frame variable: {}", e),
        }
    }
    out
}

/// A debuggee thread and its most recent stack.
#[derive(Debug, Clone)]
pub struct DebuggedThread {
    pub id: ThreadId,
    frames: Vec<StackFrame>,
}

impl DebuggedThread {
    pub fn new(id: ThreadId) -> Self {
        Self {
            id,
            frames: Vec::new(),
        }
    }

    /// Frames from the last stack walk.
    pub fn frames(&self) -> &[StackFrame] {
        &self.frames
    }

    pub fn set_frames(&mut self, frames: Vec<StackFrame>) {
        self.frames = frames;
    }
}
