//! Response parser — pulls a single action request out of free-form oracle text.
//!
//! The envelope is a fenced JSON object:
//!
//! ````text
//! Thought: the user wants a file on the desktop.
//! ```json
//! {"action": "write_file", "args": "~/Desktop/test.txt|Content here"}
//! ```
//! ````
//!
//! A ```` ```json ```` fence is looked for first, then any other fence. Only
//! the first match is considered; surrounding prose is ignored. The object is
//! decoded from the opening fence onwards, so `args` may carry fences of its
//! own (a markdown file for `write_file`, say).

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::capabilities::CapabilityRegistry;

/// Fence patterns in priority order: tagged first, then generic.
const FENCE_PATTERNS: &[&str] = &[
    r"(?is)```json[ \t]*\r?\n?(.*?)```",
    r"(?s)```[A-Za-z0-9_+\-]*[ \t]*\r?\n?(.*?)```",
];

static FENCE_REGEXES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    FENCE_PATTERNS
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
});

/// A validated request to run one registered capability.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionRequest {
    pub action: String,
    pub args: String,
}

/// Every way a parse can end. None of them is an error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParseOutcome {
    /// No fenced block at all: the text is a plain answer.
    NoAction,
    /// A fenced object naming a registered capability.
    Action(ActionRequest),
    /// A fence was found but did not hold a usable request.
    Malformed(String),
}

impl ParseOutcome {
    /// The action request, if any. `Malformed` counts as no action.
    pub fn action(&self) -> Option<&ActionRequest> {
        match self {
            ParseOutcome::Action(req) => Some(req),
            _ => None,
        }
    }
}

/// What was found inside the first fenced block.
enum FenceBody<'a> {
    /// A JSON value decoded straight after the opening fence and followed by
    /// the closing fence. String values may themselves contain fences.
    Decoded(Value),
    /// Text up to the first closing fence.
    Raw(&'a str),
}

/// First fenced block, tagged fences taking precedence.
fn first_fence(text: &str) -> Option<FenceBody<'_>> {
    let body = FENCE_REGEXES
        .iter()
        .find_map(|re| re.captures(text).and_then(|c| c.get(1)))?;

    let rest = &text[body.start()..];
    let mut stream = serde_json::Deserializer::from_str(rest).into_iter::<Value>();
    if let Some(Ok(value)) = stream.next() {
        if rest[stream.byte_offset()..].trim_start().starts_with("```") {
            return Some(FenceBody::Decoded(value));
        }
    }
    Some(FenceBody::Raw(body.as_str().trim()))
}

/// Render `args` as text: strings verbatim, null/missing as empty, anything else as JSON.
fn args_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Parse oracle output against the current registry.
pub fn parse_response(text: &str, registry: &CapabilityRegistry) -> ParseOutcome {
    let value = match first_fence(text) {
        None => return ParseOutcome::NoAction,
        Some(FenceBody::Decoded(value)) => value,
        Some(FenceBody::Raw(body)) => match serde_json::from_str::<Value>(body) {
            Ok(v) => v,
            Err(e) => {
                return ParseOutcome::Malformed(format!("fenced block is not valid JSON: {e}"))
            }
        },
    };
    let Value::Object(map) = value else {
        return ParseOutcome::Malformed("fenced block is not a JSON object".into());
    };

    let action = match map.get("action") {
        Some(Value::String(name)) => name,
        Some(_) => return ParseOutcome::Malformed("\"action\" is not a string".into()),
        None => return ParseOutcome::Malformed("missing \"action\" key".into()),
    };
    if !registry.contains(action) {
        return ParseOutcome::Malformed(format!("unknown capability '{action}'"));
    }

    ParseOutcome::Action(ActionRequest {
        action: action.clone(),
        args: args_text(map.get("args")),
    })
}
