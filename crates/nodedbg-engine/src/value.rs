//! Typed, lazily-expandable view of remote values.
//!
//! A [`Property`] is built from one engine value descriptor, either inline
//! or resolved through its handle. Children, full string contents and
//! assignments are fetched on demand through the owning [`ValueContext`].

use std::cmp::Ordering;
use std::sync::LazyLock;

use nodedbg_wire::{command, to_arguments, EvaluateArguments, Session};
use regex::Regex;
use tokio::time::Duration;

use crate::error::EngineError;
use crate::frame::FunctionInfo;

/// Wait for resolving a property's value handle (milliseconds).
pub const PROPERTY_LOOKUP_TIMEOUT_MS: u64 = 300;
/// Wait for resolving an object's property list (milliseconds).
pub const CHILDREN_LOOKUP_TIMEOUT_MS: u64 = 600;
/// Wait for frame-scoped evaluations (milliseconds).
pub const EVALUATE_TIMEOUT_MS: u64 = 10_000;

const RESERVED_WORDS: &[&str] = &[
    "arguments", "break", "case", "catch", "class", "const", "continue", "debugger", "default",
    "delete", "do", "else", "enum", "eval", "export", "extends", "false", "finally", "for",
    "function", "if", "implements", "import", "in", "instanceof", "interface", "let", "new", "null",
    "package", "private", "protected", "public", "return", "static", "super", "switch", "this",
    "throw", "true", "try", "typeof", "var", "void", "while", "with", "yield",
];

static LENGTH_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.\.\. \(length: (\d{1,6})\)$").expect("length marker regex is valid"));

// ---------------------------------------------------------------------------
// Descriptor vocabulary
// ---------------------------------------------------------------------------

/// The engine's value type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Object,
    String,
    Number,
    Boolean,
    Function,
    Regexp,
    Null,
    Undefined,
}

impl ValueKind {
    /// Parse a descriptor's `type` tag.
    pub fn from_tag(tag: &str) -> Result<Self, EngineError> {
        Ok(match tag {
            "object" => ValueKind::Object,
            "string" => ValueKind::String,
            "number" => ValueKind::Number,
            "boolean" => ValueKind::Boolean,
            "function" => ValueKind::Function,
            "regexp" => ValueKind::Regexp,
            "null" => ValueKind::Null,
            "undefined" => ValueKind::Undefined,
            other => return Err(EngineError::UnknownValueType(other.to_string())),
        })
    }

    /// The wire tag.
    pub fn tag(self) -> &'static str {
        match self {
            ValueKind::Object => "object",
            ValueKind::String => "string",
            ValueKind::Number => "number",
            ValueKind::Boolean => "boolean",
            ValueKind::Function => "function",
            ValueKind::Regexp => "regexp",
            ValueKind::Null => "null",
            ValueKind::Undefined => "undefined",
        }
    }

    /// Whether values of this kind have properties worth listing.
    pub fn is_expandable(self) -> bool {
        matches!(self, ValueKind::Object | ValueKind::Function | ValueKind::Regexp)
    }
}

/// Property attribute bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PropertyAttributes(pub u32);

impl PropertyAttributes {
    pub const READ_ONLY: u32 = 1;
    pub const DONT_ENUM: u32 = 2;
    pub const DONT_DELETE: u32 = 4;

    pub fn read_only(self) -> bool {
        self.0 & Self::READ_ONLY != 0
    }

    pub fn dont_enum(self) -> bool {
        self.0 & Self::DONT_ENUM != 0
    }

    pub fn dont_delete(self) -> bool {
        self.0 & Self::DONT_DELETE != 0
    }
}

/// How the engine stores a property.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PropertyKind {
    #[default]
    Normal,
    Field,
    ConstantFunction,
    /// Getter/setter pair.
    Callbacks,
    Handler,
    Interceptor,
    Transition,
    Nonexistent,
}

impl PropertyKind {
    /// Decode the `propertyType` code. Unknown codes read as `Normal`.
    pub fn from_code(code: u64) -> Self {
        match code {
            1 => PropertyKind::Field,
            2 => PropertyKind::ConstantFunction,
            3 => PropertyKind::Callbacks,
            4 => PropertyKind::Handler,
            5 => PropertyKind::Interceptor,
            6 => PropertyKind::Transition,
            7 => PropertyKind::Nonexistent,
            _ => PropertyKind::Normal,
        }
    }
}

/// What the host shows next to a value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PropertyFlags {
    pub expandable: bool,
    pub private: bool,
    pub has_accessor: bool,
    pub is_method: bool,
    pub read_only: bool,
}

/// The true length of a string value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringLength {
    /// Reported by the engine, or read from a truncation marker.
    Known(usize),
    /// No usable length; the preview's own character count.
    PreviewOnly(usize),
}

impl StringLength {
    /// Best available length in characters.
    pub fn chars(self) -> usize {
        match self {
            StringLength::Known(n) | StringLength::PreviewOnly(n) => n,
        }
    }

    /// Whether `preview` is shorter than the real string.
    pub fn is_truncated(self, preview: &str) -> bool {
        matches!(self, StringLength::Known(n) if n != preview.chars().count())
    }
}

/// Work out a string's true length from its descriptor.
///
/// An explicit `length` wins. Otherwise a trailing `... (length: N)` marker
/// is accepted when `N` exceeds the marker's position; anything else falls
/// back to the preview itself.
pub fn detect_length(preview: &str, explicit: Option<u64>) -> StringLength {
    if let Some(n) = explicit.and_then(|n| usize::try_from(n).ok()) {
        return StringLength::Known(n);
    }
    let preview_chars = preview.chars().count();
    if let Some(caps) = LENGTH_MARKER.captures(preview) {
        let marker_at = caps.get(0).map_or(0, |m| preview[..m.start()].chars().count());
        if let Some(n) = caps.get(1).and_then(|m| m.as_str().parse::<usize>().ok()) {
            if n > marker_at {
                return StringLength::Known(n);
            }
        }
        tracing::debug!("ambiguous length marker in string preview");
    }
    StringLength::PreviewOnly(preview_chars)
}

/// Whether `name` can follow a `.` in an expression.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if RESERVED_WORDS.contains(&name) {
        return false;
    }
    (first == '$' || first == '_' || first.is_alphabetic())
        && chars.all(|c| c == '$' || c == '_' || c.is_alphanumeric())
}

/// Access path of a child named `name` under `parent`.
pub fn child_path(parent: &str, name: &str) -> String {
    if is_valid_identifier(name) {
        format!("{parent}.{name}")
    } else {
        format!("{parent}[{}]", quote(name))
    }
}

/// JSON string literal for `s`.
fn quote(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

/// Compare names so that embedded numbers order by value.
///
/// Text runs compare case-insensitively; `"2" < "10"` and `"a9" < "a10"`.
pub fn logical_cmp(a: &str, b: &str) -> Ordering {
    let mut left = Runs::new(a);
    let mut right = Runs::new(b);
    loop {
        match (left.next(), right.next()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = match (is_digits(x), is_digits(y)) {
                    (true, true) => cmp_numeric(x, y),
                    (true, false) => Ordering::Less,
                    (false, true) => Ordering::Greater,
                    (false, false) => cmp_ignore_case(x, y),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

fn is_digits(run: &str) -> bool {
    run.starts_with(|c: char| c.is_ascii_digit())
}

fn cmp_numeric(x: &str, y: &str) -> Ordering {
    let x = x.trim_start_matches('0');
    let y = y.trim_start_matches('0');
    x.len().cmp(&y.len()).then_with(|| x.cmp(y))
}

fn cmp_ignore_case(x: &str, y: &str) -> Ordering {
    x.chars()
        .flat_map(char::to_lowercase)
        .cmp(y.chars().flat_map(char::to_lowercase))
}

/// Splits a string into alternating digit and non-digit runs.
struct Runs<'a> {
    rest: &'a str,
}

impl<'a> Runs<'a> {
    fn new(s: &'a str) -> Self {
        Self { rest: s }
    }
}

impl<'a> Iterator for Runs<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let first = self.rest.chars().next()?;
        let digits = first.is_ascii_digit();
        let end = self
            .rest
            .find(|c: char| c.is_ascii_digit() != digits)
            .unwrap_or(self.rest.len());
        let (run, rest) = self.rest.split_at(end);
        self.rest = rest;
        Some(run)
    }
}

// ---------------------------------------------------------------------------
// Evaluation context
// ---------------------------------------------------------------------------

/// The session, pause generation and frame a value was produced in.
#[derive(Clone)]
pub struct ValueContext {
    session: Session,
    generation: u64,
    frame: Option<u32>,
}

impl std::fmt::Debug for ValueContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueContext")
            .field("generation", &self.generation)
            .field("frame", &self.frame)
            .finish_non_exhaustive()
    }
}

impl ValueContext {
    /// A context for the current pause, scoped to `frame`.
    pub fn new(session: Session, frame: Option<u32>) -> Self {
        let generation = session.generation();
        Self {
            session,
            generation,
            frame,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn frame(&self) -> Option<u32> {
        self.frame
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Resolve a `{ref: N}` token to its full descriptor.
    ///
    /// Anything without a `ref`, or whose lookup fails, is returned as is.
    pub async fn resolve(&self, token: &serde_json::Value, wait: Duration) -> serde_json::Value {
        let Some(handle) = token.get("ref").and_then(serde_json::Value::as_i64) else {
            return token.clone();
        };
        self.session
            .lookup_ref_at(handle, self.generation, wait)
            .await
            .unwrap_or_else(|| token.clone())
    }

    async fn lookup(&self, handle: i64, wait: Duration) -> Option<serde_json::Value> {
        self.session.lookup_ref_at(handle, self.generation, wait).await
    }

    /// Evaluate `expression` in this context's frame.
    pub async fn evaluate(&self, expression: &str) -> Result<serde_json::Value, EngineError> {
        let args = EvaluateArguments {
            expression: expression.to_string(),
            frame: self.frame,
            global: None,
        };
        evaluate_raw(&self.session, &args, Duration::from_millis(EVALUATE_TIMEOUT_MS)).await
    }
}

/// Send an `evaluate` request and unwrap its outcome.
pub(crate) async fn evaluate_raw(
    session: &Session,
    args: &EvaluateArguments,
    wait: Duration,
) -> Result<serde_json::Value, EngineError> {
    let response = session
        .request_sync(command::EVALUATE, to_arguments(args), wait)
        .await
        .ok_or_else(|| EngineError::NoResponse(command::EVALUATE.to_string()))?;
    if response.success {
        Ok(response.body)
    } else {
        Err(EngineError::Evaluation(
            response.message.unwrap_or_else(|| "evaluation failed".to_string()),
        ))
    }
}

// ---------------------------------------------------------------------------
// Property
// ---------------------------------------------------------------------------

/// One named value in a property tree.
#[derive(Debug, Clone)]
pub struct Property {
    ctx: ValueContext,
    name: String,
    full_name: String,
    attributes: PropertyAttributes,
    kind: PropertyKind,
    value_kind: Option<ValueKind>,
    handle: Option<i64>,
    class_name: Option<String>,
    display: String,
    string_value: String,
    length: StringLength,
}

impl Property {
    /// Build a property from a descriptor of the form
    /// `{name, attributes?, propertyType?, value? | ref?}`.
    ///
    /// With a `parent` path the full name becomes `parent.name` or
    /// `parent["name"]`. A value that cannot be resolved leaves the property
    /// without a type; an unknown type tag is an error.
    pub async fn from_descriptor(
        ctx: ValueContext,
        descriptor: &serde_json::Value,
        parent: Option<&str>,
    ) -> Result<Self, EngineError> {
        let name = match descriptor.get("name") {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => String::new(),
        };
        let full_name = match parent {
            Some(parent) => child_path(parent, &name),
            None => name.clone(),
        };
        let attributes = descriptor
            .get("attributes")
            .and_then(serde_json::Value::as_u64)
            .and_then(|bits| u32::try_from(bits).ok())
            .unwrap_or(0);
        let kind = descriptor
            .get("propertyType")
            .and_then(serde_json::Value::as_u64)
            .map_or(PropertyKind::Normal, PropertyKind::from_code);

        let mut property = Self {
            ctx,
            name,
            full_name,
            attributes: PropertyAttributes(attributes),
            kind,
            value_kind: None,
            handle: None,
            class_name: None,
            display: String::new(),
            string_value: String::new(),
            length: StringLength::PreviewOnly(0),
        };

        let value = match descriptor.get("value").filter(|v| !v.is_null()) {
            Some(value) => Some(value.clone()),
            None => match descriptor.get("ref").and_then(serde_json::Value::as_i64) {
                Some(handle) => {
                    property
                        .ctx
                        .lookup(handle, Duration::from_millis(PROPERTY_LOOKUP_TIMEOUT_MS))
                        .await
                }
                None => None,
            },
        };
        match value {
            Some(value) => property.fill_value(&value).await?,
            None => tracing::debug!("no value for {}", property.full_name),
        }
        Ok(property)
    }

    /// Wrap an evaluation result as a property named after its expression.
    pub async fn evaluated(
        ctx: ValueContext,
        expression: &str,
        body: serde_json::Value,
    ) -> Result<Self, EngineError> {
        let descriptor = serde_json::json!({ "name": expression, "value": body });
        Self::from_descriptor(ctx, &descriptor, None).await
    }

    async fn fill_value(&mut self, value: &serde_json::Value) -> Result<(), EngineError> {
        let tag = value.get("type").and_then(serde_json::Value::as_str).unwrap_or_default();
        let kind = ValueKind::from_tag(tag)?;
        let text = value.get("text").and_then(serde_json::Value::as_str);
        self.handle = value
            .get("ref")
            .or_else(|| value.get("handle"))
            .and_then(serde_json::Value::as_i64);
        self.class_name = value
            .get("className")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string);

        self.display = match kind {
            ValueKind::Object => match text {
                Some(text) => text.to_string(),
                None => format!("#<{}>", self.class_name.as_deref().unwrap_or("Object")),
            },
            ValueKind::Null | ValueKind::Undefined => kind.tag().to_string(),
            ValueKind::Number | ValueKind::Boolean => match text {
                Some(text) => text.to_string(),
                None => value.get("value").map(|v| v.to_string()).unwrap_or_default(),
            },
            ValueKind::String => {
                let raw = value
                    .get("value")
                    .and_then(serde_json::Value::as_str)
                    .or(text)
                    .unwrap_or_default();
                self.string_value = raw.to_string();
                self.length = detect_length(raw, value.get("length").and_then(serde_json::Value::as_u64));
                quote(text.unwrap_or(raw))
            }
            ValueKind::Function => FunctionInfo::from_descriptor(value).any_name().to_string(),
            ValueKind::Regexp => {
                let mut literal = text.unwrap_or_default().to_string();
                literal.push_str(&self.regexp_flags().await);
                literal
            }
        };
        self.value_kind = Some(kind);
        Ok(())
    }

    /// `g`, `i` and `m` for the flags the regexp's own properties report.
    async fn regexp_flags(&self) -> String {
        let Some(handle) = self.handle else {
            return String::new();
        };
        let Some(object) = self
            .ctx
            .lookup(handle, Duration::from_millis(CHILDREN_LOOKUP_TIMEOUT_MS))
            .await
        else {
            return String::new();
        };
        let mut flags = String::new();
        let properties = object
            .get("properties")
            .and_then(serde_json::Value::as_array)
            .cloned()
            .unwrap_or_default();
        for (flag, letter) in [("global", 'g'), ("ignoreCase", 'i'), ("multiline", 'm')] {
            let Some(prop) = properties.iter().find(|p| p.get("name").and_then(|n| n.as_str()) == Some(flag)) else {
                continue;
            };
            let token = prop.get("value").cloned().unwrap_or_else(|| prop.clone());
            let value = self
                .ctx
                .resolve(&token, Duration::from_millis(PROPERTY_LOOKUP_TIMEOUT_MS))
                .await;
            let set = value.get("value") == Some(&serde_json::Value::Bool(true))
                || value.get("text").and_then(serde_json::Value::as_str) == Some("true");
            if set {
                flags.push(letter);
            }
        }
        flags
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Expression that reaches this value from its root.
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Type, if the value could be resolved.
    pub fn value_kind(&self) -> Option<ValueKind> {
        self.value_kind
    }

    /// Type tag as text; empty when unresolved.
    pub fn type_name(&self) -> &'static str {
        self.value_kind.map_or("", ValueKind::tag)
    }

    pub fn handle(&self) -> Option<i64> {
        self.handle
    }

    pub fn class_name(&self) -> Option<&str> {
        self.class_name.as_deref()
    }

    pub fn is_array(&self) -> bool {
        self.class_name.as_deref() == Some("Array")
    }

    /// Display text.
    pub fn display(&self) -> &str {
        &self.display
    }

    pub fn attributes(&self) -> PropertyAttributes {
        self.attributes
    }

    pub fn kind(&self) -> PropertyKind {
        self.kind
    }

    /// True string length; only meaningful for strings.
    pub fn string_length(&self) -> StringLength {
        self.length
    }

    pub fn context(&self) -> &ValueContext {
        &self.ctx
    }

    pub fn flags(&self) -> PropertyFlags {
        let is_method = self.value_kind == Some(ValueKind::Function);
        PropertyFlags {
            expandable: self.value_kind.is_some_and(ValueKind::is_expandable),
            private: self.attributes.dont_enum(),
            has_accessor: self.kind == PropertyKind::Callbacks && !is_method,
            is_method,
            read_only: self.attributes.read_only(),
        }
    }

    /// List this value's properties, ordered by name.
    ///
    /// Recomputed on every call. Children that cannot be decoded are
    /// logged and skipped.
    pub async fn enumerate_children(&self) -> Result<Vec<Property>, EngineError> {
        if !self.flags().expandable {
            return Ok(Vec::new());
        }
        let Some(handle) = self.handle else {
            return Ok(Vec::new());
        };
        let object = self
            .ctx
            .lookup(handle, Duration::from_millis(CHILDREN_LOOKUP_TIMEOUT_MS))
            .await
            .ok_or(EngineError::LookupFailed(handle))?;
        let descriptors = object
            .get("properties")
            .and_then(serde_json::Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut children = Vec::with_capacity(descriptors.len());
        for descriptor in &descriptors {
            match Property::from_descriptor(self.ctx.clone(), descriptor, Some(&self.full_name)).await {
                Ok(child) => children.push(child),
                Err(e) => tracing::warn!("skipping child of {}: {}", self.full_name, e),
            }
        }
        children.sort_by(|a, b| logical_cmp(&a.name, &b.name));
        Ok(children)
    }

    /// The string's contents, at most `max_chars` characters.
    ///
    /// A truncated preview is replaced by an unbounded lookup first. Values
    /// that are not strings return their display text.
    pub async fn fetch_full_string(&mut self, max_chars: usize) -> Result<String, EngineError> {
        if self.value_kind != Some(ValueKind::String) {
            return Ok(self.display.chars().take(max_chars).collect());
        }
        if self.length.is_truncated(&self.string_value) {
            let handle = self.handle.ok_or_else(|| {
                EngineError::InvalidState(format!("{} has no handle to fetch", self.full_name))
            })?;
            let full = self
                .ctx
                .session
                .lookup_full_string(handle)
                .await
                .ok_or(EngineError::LookupFailed(handle))?;
            self.fill_value(&full).await?;
            self.length = StringLength::Known(self.string_value.chars().count());
        }
        Ok(self.string_value.chars().take(max_chars).collect())
    }

    /// Assign `literal` to this value in its frame.
    ///
    /// On failure the engine's message is returned and the property keeps
    /// its old value.
    pub async fn set_value(&mut self, literal: &str) -> Result<(), EngineError> {
        let expression = format!("{} = {}", self.full_name, literal);
        let body = self.ctx.evaluate(&expression).await?;
        self.fill_value(&body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodedbg_wire::testing::{duplex_pair, failure, response, response_with_refs};
    use nodedbg_wire::Request;
    use serde_json::json;

    #[test]
    fn value_kind_tags_round_trip() {
        for tag in ["object", "string", "number", "boolean", "function", "regexp", "null", "undefined"] {
            assert_eq!(ValueKind::from_tag(tag).unwrap().tag(), tag);
        }
        let err = ValueKind::from_tag("symbol").unwrap_err();
        assert_eq!(err.to_string(), "unknown value type: symbol");
    }

    #[test]
    fn attribute_bits() {
        let attrs = PropertyAttributes(PropertyAttributes::READ_ONLY | PropertyAttributes::DONT_DELETE);
        assert!(attrs.read_only());
        assert!(!attrs.dont_enum());
        assert!(attrs.dont_delete());
    }

    #[test]
    fn property_kind_codes() {
        assert_eq!(PropertyKind::from_code(0), PropertyKind::Normal);
        assert_eq!(PropertyKind::from_code(3), PropertyKind::Callbacks);
        assert_eq!(PropertyKind::from_code(7), PropertyKind::Nonexistent);
        assert_eq!(PropertyKind::from_code(42), PropertyKind::Normal);
    }

    #[test]
    fn length_from_marker() {
        assert_eq!(detect_length("abc... (length: 12)", None), StringLength::Known(12));
    }

    #[test]
    fn length_falls_back_to_preview() {
        assert_eq!(detect_length("plain text", None), StringLength::PreviewOnly(10));
        assert_eq!(detect_length("", None), StringLength::PreviewOnly(0));
    }

    #[test]
    fn explicit_length_wins() {
        assert_eq!(detect_length("abc... (length: 12)", Some(80)), StringLength::Known(80));
        assert_eq!(detect_length("abc", Some(3)), StringLength::Known(3));
    }

    #[test]
    fn marker_not_past_its_position_is_ignored() {
        let preview = "abcdefghijkl... (length: 5)";
        assert_eq!(
            detect_length(preview, None),
            StringLength::PreviewOnly(preview.chars().count())
        );
    }

    #[test]
    fn marker_must_end_the_preview() {
        let preview = "x... (length: 99) trailing";
        assert_eq!(detect_length(preview, None).chars(), preview.chars().count());
        let preview = "x... (length: 1234567)";
        assert!(matches!(detect_length(preview, None), StringLength::PreviewOnly(_)));
    }

    #[test]
    fn truncation_check() {
        assert!(StringLength::Known(12).is_truncated("abc... (length: 12)"));
        assert!(!StringLength::Known(3).is_truncated("abc"));
        assert!(!StringLength::PreviewOnly(3).is_truncated("abc"));
    }

    #[test]
    fn identifiers() {
        assert!(is_valid_identifier("foo"));
        assert!(is_valid_identifier("$el"));
        assert!(is_valid_identifier("_private"));
        assert!(is_valid_identifier("a_b$c1"));
        assert!(is_valid_identifier("ümlaut"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("0"));
        assert!(!is_valid_identifier("1abc"));
        assert!(!is_valid_identifier("with space"));
        assert!(!is_valid_identifier("a-b"));
        assert!(!is_valid_identifier("class"));
        assert!(!is_valid_identifier("this"));
    }

    #[test]
    fn child_paths() {
        assert_eq!(child_path("obj", "field"), "obj.field");
        assert_eq!(child_path("arr", "0"), "arr[\"0\"]");
        assert_eq!(child_path("obj", "my key"), "obj[\"my key\"]");
        assert_eq!(child_path("obj", "say \"hi\""), "obj[\"say \\\"hi\\\"\"]");
        assert_eq!(child_path("obj", "new"), "obj[\"new\"]");
    }

    #[test]
    fn logical_order() {
        let mut names = vec!["10", "2", "1", "b", "A", "a10", "a9", "0", "length"];
        names.sort_by(|a, b| logical_cmp(a, b));
        assert_eq!(names, vec!["0", "1", "2", "10", "A", "a9", "a10", "b", "length"]);
    }

    #[test]
    fn logical_order_leading_zeros_and_case() {
        assert_eq!(logical_cmp("007", "7"), Ordering::Less);
        assert_eq!(logical_cmp("x", "X"), Ordering::Greater);
        assert_eq!(logical_cmp("abc", "ABD"), Ordering::Less);
        assert_eq!(logical_cmp("a", "a1"), Ordering::Less);
    }

    // -- Properties against a fake engine --------------------------------

    async fn context() -> (ValueContext, nodedbg_wire::testing::FakeEngine<tokio::io::DuplexStream>) {
        let (transport, mut engine) = duplex_pair();
        let (session, _events) = Session::start(transport).unwrap();
        engine.handshake().await.unwrap();
        (ValueContext::new(session, Some(0)), engine)
    }

    fn offline_context() -> ValueContext {
        let (transport, _engine) = duplex_pair();
        let (session, _events) = Session::start(transport).unwrap();
        ValueContext::new(session, Some(0))
    }

    async fn inline(descriptor: serde_json::Value) -> Property {
        Property::from_descriptor(offline_context(), &descriptor, None).await.unwrap()
    }

    #[tokio::test]
    async fn primitive_displays() {
        let p = inline(json!({"name": "n", "value": {"ref": 1, "type": "number", "value": 42, "text": "42"}})).await;
        assert_eq!(p.display(), "42");
        assert_eq!(p.type_name(), "number");
        assert_eq!(p.handle(), Some(1));

        let p = inline(json!({"name": "b", "value": {"handle": 2, "type": "boolean", "value": true}})).await;
        assert_eq!(p.display(), "true");
        assert_eq!(p.handle(), Some(2));

        let p = inline(json!({"name": "u", "value": {"type": "undefined"}})).await;
        assert_eq!(p.display(), "undefined");
        let p = inline(json!({"name": "z", "value": {"type": "null"}})).await;
        assert_eq!(p.display(), "null");
        assert!(!p.flags().expandable);
    }

    #[tokio::test]
    async fn object_display() {
        let p = inline(json!({"name": "o", "value": {"ref": 3, "type": "object", "className": "Array"}})).await;
        assert_eq!(p.display(), "#<Array>");
        assert!(p.is_array());
        assert!(p.flags().expandable);

        let p = inline(json!({"name": "o", "value": {"ref": 3, "type": "object"}})).await;
        assert_eq!(p.display(), "#<Object>");

        let p = inline(json!({"name": "d", "value": {"ref": 4, "type": "object", "className": "Date", "text": "Mon Jan 01"}})).await;
        assert_eq!(p.display(), "Mon Jan 01");
    }

    #[tokio::test]
    async fn string_display_is_quoted() {
        let p = inline(json!({"name": "s", "value": {"ref": 5, "type": "string", "value": "say \"hi\"", "length": 8}})).await;
        assert_eq!(p.display(), "\"say \\\"hi\\\"\"");
        assert_eq!(p.string_length(), StringLength::Known(8));
    }

    #[tokio::test]
    async fn function_names() {
        let p = inline(json!({"name": "f", "value": {"ref": 6, "type": "function", "name": "run"}})).await;
        assert_eq!(p.display(), "run");
        assert!(p.flags().is_method);
        assert!(!p.flags().has_accessor);
        let p = inline(json!({"name": "f", "value": {"ref": 6, "type": "function", "name": "", "inferredName": "obj.go"}})).await;
        assert_eq!(p.display(), "obj.go");
        let p = inline(json!({"name": "f", "value": {"ref": 6, "type": "function"}})).await;
        assert_eq!(p.display(), "<no name>");
    }

    #[tokio::test]
    async fn flags_from_descriptor_bits() {
        let p = inline(json!({
            "name": "getter", "attributes": 3, "propertyType": 3,
            "value": {"ref": 7, "type": "number", "value": 1}
        }))
        .await;
        let flags = p.flags();
        assert!(flags.private);
        assert!(flags.read_only);
        assert!(flags.has_accessor);
        assert!(!flags.is_method);
    }

    #[tokio::test]
    async fn numeric_names_and_parent_paths() {
        let ctx = offline_context();
        let p = Property::from_descriptor(ctx.clone(), &json!({"name": 3, "value": {"type": "null"}}), Some("arr"))
            .await
            .unwrap();
        assert_eq!(p.name(), "3");
        assert_eq!(p.full_name(), "arr[\"3\"]");
        let p = Property::from_descriptor(ctx, &json!({"name": "x", "value": {"type": "null"}}), Some("obj"))
            .await
            .unwrap();
        assert_eq!(p.full_name(), "obj.x");
    }

    #[tokio::test]
    async fn unknown_type_is_an_error() {
        let err = Property::from_descriptor(
            offline_context(),
            &json!({"name": "s", "value": {"type": "symbol"}}),
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, EngineError::UnknownValueType(t) if t == "symbol"));
    }

    #[tokio::test]
    async fn unresolvable_ref_leaves_property_untyped() {
        let (ctx, engine) = context().await;
        let server = engine.serve(|req: &Request| vec![failure(req, "no such handle")]);
        let p = Property::from_descriptor(ctx.clone(), &json!({"name": "gone", "ref": 99}), None)
            .await
            .unwrap();
        assert_eq!(p.value_kind(), None);
        assert_eq!(p.type_name(), "");
        assert!(!p.flags().expandable);
        ctx.session().close();
        let seen = server.await.unwrap();
        assert_eq!(seen[0].command, "lookup");
    }

    #[tokio::test]
    async fn children_resolve_refs_and_sort() {
        let (ctx, engine) = context().await;
        let server = engine.serve(|req: &Request| {
            let handles = req.arguments.as_ref().unwrap()["handles"].clone();
            match handles[0].as_i64() {
                Some(10) => vec![response_with_refs(
                    req,
                    json!({"10": {"handle": 10, "type": "object", "className": "Array", "properties": [
                        {"name": "10", "ref": 21},
                        {"name": 2, "ref": 22},
                        {"name": "length", "attributes": 6, "propertyType": 3, "ref": 23},
                        {"name": "bad", "value": {"type": "symbol"}}
                    ]}}),
                    vec![
                        json!({"handle": 21, "type": "number", "value": 100, "text": "100"}),
                        json!({"handle": 22, "type": "string", "value": "two"}),
                        json!({"handle": 23, "type": "number", "value": 11, "text": "11"}),
                    ],
                )],
                _ => vec![failure(req, "unexpected")],
            }
        });

        let parent = Property::from_descriptor(
            ctx.clone(),
            &json!({"name": "list", "value": {"ref": 10, "type": "object", "className": "Array"}}),
            None,
        )
        .await
        .unwrap();
        let children = parent.enumerate_children().await.unwrap();
        let names: Vec<&str> = children.iter().map(Property::name).collect();
        assert_eq!(names, vec!["2", "10", "length"]);
        assert_eq!(children[0].full_name(), "list[\"2\"]");
        assert_eq!(children[0].display(), "\"two\"");
        assert_eq!(children[1].display(), "100");
        assert_eq!(children[2].full_name(), "list.length");
        assert!(children[2].flags().has_accessor);

        ctx.session().close();
        let seen = server.await.unwrap();
        assert_eq!(seen.len(), 1, "refs inlined in the response are served from cache");
    }

    #[tokio::test]
    async fn enumerate_children_of_primitive_is_empty() {
        let p = inline(json!({"name": "n", "value": {"ref": 1, "type": "number", "value": 1}})).await;
        assert!(p.enumerate_children().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn regexp_flags_from_children() {
        let (ctx, engine) = context().await;
        let server = engine.serve(|req: &Request| {
            vec![response_with_refs(
                req,
                json!({"30": {"handle": 30, "type": "regexp", "properties": [
                    {"name": "source", "ref": 31},
                    {"name": "global", "ref": 32},
                    {"name": "ignoreCase", "ref": 33},
                    {"name": "multiline", "ref": 34}
                ]}}),
                vec![
                    json!({"handle": 31, "type": "string", "value": "a+"}),
                    json!({"handle": 32, "type": "boolean", "value": true}),
                    json!({"handle": 33, "type": "boolean", "value": false}),
                    json!({"handle": 34, "type": "boolean", "value": true}),
                ],
            )]
        });
        let p = Property::from_descriptor(
            ctx.clone(),
            &json!({"name": "re", "value": {"ref": 30, "type": "regexp", "text": "/a+/"}}),
            None,
        )
        .await
        .unwrap();
        assert_eq!(p.display(), "/a+/gm");
        assert!(p.flags().expandable);
        ctx.session().close();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn full_string_fetched_when_truncated() {
        let (ctx, engine) = context().await;
        let server = engine.serve(|req: &Request| {
            let args = req.arguments.as_ref().unwrap();
            assert_eq!(args["maxStringLength"], -1);
            vec![response(
                req,
                json!({"40": {"handle": 40, "type": "string", "value": "abcdefghijkl", "length": 12}}),
            )]
        });
        let mut p = Property::from_descriptor(
            ctx.clone(),
            &json!({"name": "s", "value": {"ref": 40, "type": "string", "value": "abc... (length: 12)"}}),
            None,
        )
        .await
        .unwrap();
        assert_eq!(p.string_length(), StringLength::Known(12));

        assert_eq!(p.fetch_full_string(100).await.unwrap(), "abcdefghijkl");
        assert_eq!(p.fetch_full_string(4).await.unwrap(), "abcd");
        assert_eq!(p.string_length(), StringLength::Known(12));

        ctx.session().close();
        let seen = server.await.unwrap();
        assert_eq!(seen.len(), 1, "second fetch is served locally");
    }

    #[tokio::test]
    async fn full_string_of_complete_preview_needs_no_request() {
        let mut p = inline(json!({"name": "s", "value": {"ref": 1, "type": "string", "value": "short"}})).await;
        assert_eq!(p.fetch_full_string(3).await.unwrap(), "sho");
        assert_eq!(p.fetch_full_string(99).await.unwrap(), "short");
    }

    #[tokio::test]
    async fn set_value_success_and_failure() {
        let (ctx, engine) = context().await;
        let server = engine.serve(|req: &Request| {
            let args = req.arguments.as_ref().unwrap();
            match args["expression"].as_str() {
                Some("obj.count = 5") => {
                    assert_eq!(args["frame"], 0);
                    vec![response(req, json!({"handle": 50, "type": "number", "value": 5, "text": "5"}))]
                }
                _ => vec![failure(req, "SyntaxError: Unexpected token")],
            }
        });
        let mut p = Property::from_descriptor(
            ctx.clone(),
            &json!({"name": "count", "value": {"ref": 9, "type": "number", "value": 1, "text": "1"}}),
            Some("obj"),
        )
        .await
        .unwrap();

        p.set_value("5").await.unwrap();
        assert_eq!(p.display(), "5");
        assert_eq!(p.handle(), Some(50));

        let err = p.set_value("}").await.unwrap_err();
        assert_eq!(err.to_string(), "SyntaxError: Unexpected token");
        assert_eq!(p.display(), "5");

        ctx.session().close();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn evaluated_property_is_named_after_expression() {
        let p = Property::evaluated(
            offline_context(),
            "a + b",
            json!({"handle": 3, "type": "number", "value": 7, "text": "7"}),
        )
        .await
        .unwrap();
        assert_eq!(p.name(), "a + b");
        assert_eq!(p.full_name(), "a + b");
        assert_eq!(p.display(), "7");
    }
}
