//! Best-effort extraction of tool calls from free-form model output.
//!
//! Models asked to call tools answer in several conventions. The parser
//! tries, in order: OpenAI-style `tool_calls` / `function` objects,
//! Anthropic-style `tool_use` blocks (JSON or `<invoke>` markup), and
//! finally bare `{"name": ..., "arguments": ...}` JSON.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use synthcore::Value;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub name: String,
    pub arguments: Value,
}

impl ToolCall {
    fn new(name: &str, arguments: Option<&Value>) -> Self {
        Self {
            name: name.to_string(),
            arguments: arguments.map(decode_arguments).unwrap_or(Value::Object(Default::default())),
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Parse tool calls out of `text`. `None` when no strategy matches.
pub fn parse_tool_calls(text: &str) -> Option<Vec<ToolCall>> {
    let documents = json_documents(text);

    let calls = openai_style(&documents)
        .or_else(|| anthropic_style(text, &documents))
        .or_else(|| bare_json(&documents));
    if calls.is_none() {
        tracing::debug!("No tool calls recognised in model response");
    }
    calls
}

/// Normalise tool calls returned natively by an OpenAI-compatible API.
pub fn normalize_native(calls: &[Value]) -> Vec<ToolCall> {
    calls.iter().filter_map(openai_call).collect()
}

fn non_empty(calls: Vec<ToolCall>) -> Option<Vec<ToolCall>> {
    (!calls.is_empty()).then_some(calls)
}

/// String arguments are usually JSON-encoded; decode when possible.
fn decode_arguments(value: &Value) -> Value {
    match value {
        Value::String(s) => serde_json::from_str(s).unwrap_or_else(|_| value.clone()),
        other => other.clone(),
    }
}

fn openai_call(item: &Value) -> Option<ToolCall> {
    let function = item.get("function")?;
    let name = function.get("name")?.as_str()?;
    Some(ToolCall::new(name, function.get("arguments")))
}

fn openai_style(documents: &[Value]) -> Option<Vec<ToolCall>> {
    let mut calls = Vec::new();
    for doc in documents {
        if let Some(list) = doc.get("tool_calls").and_then(Value::as_array) {
            calls.extend(list.iter().filter_map(openai_call));
        } else if let Some(call) = doc.get("function_call") {
            if let Some(name) = call.get("name").and_then(Value::as_str) {
                calls.push(ToolCall::new(name, call.get("arguments")));
            }
        } else if let Some(list) = doc.as_array() {
            calls.extend(list.iter().filter_map(openai_call));
        } else if let Some(call) = openai_call(doc) {
            calls.push(call);
        }
    }
    non_empty(calls)
}

fn tool_use_block(item: &Value) -> Option<ToolCall> {
    if item.get("type")?.as_str()? != "tool_use" {
        return None;
    }
    let name = item.get("name")?.as_str()?;
    Some(ToolCall::new(name, item.get("input")))
}

fn invoke_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?s)<invoke\s+name\s*=\s*"([^"]+)"\s*>(.*?)</invoke>"#).expect("invoke pattern is valid")
    })
}

fn parameter_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?s)<parameter\s+name\s*=\s*"([^"]+)"\s*>(.*?)</parameter>"#).expect("parameter pattern is valid")
    })
}

fn anthropic_style(text: &str, documents: &[Value]) -> Option<Vec<ToolCall>> {
    let mut calls = Vec::new();
    for doc in documents {
        let blocks = doc
            .get("content")
            .and_then(Value::as_array)
            .or_else(|| doc.as_array());
        match blocks {
            Some(blocks) => calls.extend(blocks.iter().filter_map(tool_use_block)),
            None => calls.extend(tool_use_block(doc)),
        }
    }
    if !calls.is_empty() {
        return Some(calls);
    }

    for invoke in invoke_pattern().captures_iter(text) {
        let mut arguments = serde_json::Map::new();
        for param in parameter_pattern().captures_iter(&invoke[2]) {
            let raw = param[2].trim();
            let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
            arguments.insert(param[1].to_string(), value);
        }
        calls.push(ToolCall {
            name: invoke[1].to_string(),
            arguments: Value::Object(arguments),
        });
    }
    non_empty(calls)
}

fn bare_call(item: &Value) -> Option<ToolCall> {
    let name = item.get("name")?.as_str()?;
    let arguments = ["arguments", "parameters", "input"].iter().find_map(|key| item.get(*key))?;
    Some(ToolCall::new(name, Some(arguments)))
}

fn bare_json(documents: &[Value]) -> Option<Vec<ToolCall>> {
    let mut calls = Vec::new();
    for doc in documents {
        match doc.as_array() {
            Some(items) => calls.extend(items.iter().filter_map(bare_call)),
            None => calls.extend(bare_call(doc)),
        }
    }
    non_empty(calls)
}

fn fence_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)```").expect("fence pattern is valid"))
}

/// JSON values found in `text`: fenced code blocks, the whole text, or
/// any balanced top-level `{...}` / `[...]` span.
fn json_documents(text: &str) -> Vec<Value> {
    let fenced: Vec<Value> = fence_pattern()
        .captures_iter(text)
        .filter_map(|caps| serde_json::from_str(caps[1].trim()).ok())
        .collect();
    if !fenced.is_empty() {
        return fenced;
    }

    if let Ok(value) = serde_json::from_str::<Value>(text.trim()) {
        if value.is_object() || value.is_array() {
            return vec![value];
        }
    }

    balanced_spans(text)
        .into_iter()
        .filter_map(|span| serde_json::from_str(span).ok())
        .collect()
}

fn balanced_spans(text: &str) -> Vec<&str> {
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' if depth > 0 => in_string = true,
            '{' | '[' => {
                if depth == 0 {
                    start = i;
                }
                depth += 1;
            }
            '}' | ']' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    spans.push(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    spans
}
