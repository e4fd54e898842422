//! Claude-family stream-json dialect.
//!
//! Records are `system`/`assistant`/`user`/`result` envelopes with Anthropic
//! message content blocks, plus `stream_event` deltas when partial messages
//! were requested.

use serde_json::Value;

use crate::entry::{classify_tool, NormalizedEntry, Usage};
use crate::normalizer::NormalizerState;
use crate::StreamRecord;

pub(crate) fn normalize(
    state: &mut NormalizerState,
    emit_thinking: bool,
    record: &StreamRecord,
) -> Vec<NormalizedEntry> {
    let value = record.value();
    match record.record_type() {
        Some("system") => normalize_system(state, value),
        Some("assistant") => normalize_assistant(state, emit_thinking, value),
        Some("user") => normalize_user(value),
        Some("result") => normalize_result(value),
        Some("stream_event") => normalize_stream_event(state, emit_thinking, value),
        _ => Vec::new(),
    }
}

fn normalize_system(state: &mut NormalizerState, value: &Value) -> Vec<NormalizedEntry> {
    if value.get("subtype").and_then(Value::as_str) != Some("init") {
        return Vec::new();
    }
    let session_id = value
        .get("session_id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    state.session_id = Some(session_id.clone());
    vec![NormalizedEntry::System {
        session_id,
        model: string_field(value, "model"),
        tools: value.get("tools").and_then(Value::as_array).map(|tools| {
            tools
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        }),
        cwd: string_field(value, "cwd"),
    }]
}

fn normalize_assistant(
    state: &mut NormalizerState,
    emit_thinking: bool,
    value: &Value,
) -> Vec<NormalizedEntry> {
    let mut entries = Vec::new();
    let mut text = String::new();

    for block in content_blocks(value) {
        match block.get("type").and_then(Value::as_str) {
            Some("text") => {
                if let Some(part) = block.get("text").and_then(Value::as_str) {
                    text.push_str(part);
                }
            }
            Some("thinking") if emit_thinking => {
                if let Some(part) = block.get("thinking").and_then(Value::as_str) {
                    entries.push(NormalizedEntry::Thinking {
                        text: part.to_string(),
                    });
                }
            }
            Some("tool_use") => {
                let name = block
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let call_id = string_field(block, "id");
                let input = block.get("input").cloned().unwrap_or(Value::Null);
                if let Some(id) = &call_id {
                    state.tool_names.insert(id.clone(), name.clone());
                }
                entries.push(NormalizedEntry::ToolUse {
                    action: classify_tool(&name, &input),
                    tool_name: name,
                    call_id,
                });
            }
            _ => {}
        }
    }

    if !text.is_empty() {
        entries.insert(0, NormalizedEntry::Assistant { text });
    }
    entries
}

fn normalize_user(value: &Value) -> Vec<NormalizedEntry> {
    // User content may be a bare string or a block list mixing text with
    // tool results.
    if let Some(text) = value
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
    {
        return vec![NormalizedEntry::User {
            text: text.to_string(),
        }];
    }

    let mut entries = Vec::new();
    let mut text = String::new();
    for block in content_blocks(value) {
        match block.get("type").and_then(Value::as_str) {
            Some("text") => {
                if let Some(part) = block.get("text").and_then(Value::as_str) {
                    text.push_str(part);
                }
            }
            Some("tool_result") => {
                let ok = !block
                    .get("is_error")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                entries.push(NormalizedEntry::ToolResult {
                    call_id: string_field(block, "tool_use_id"),
                    ok,
                    summary: result_summary(block.get("content")),
                });
            }
            _ => {}
        }
    }
    if !text.is_empty() {
        entries.insert(0, NormalizedEntry::User { text });
    }
    entries
}

fn normalize_result(value: &Value) -> Vec<NormalizedEntry> {
    let ok = value
        .get("ok")
        .and_then(Value::as_bool)
        .unwrap_or_else(|| !value.get("is_error").and_then(Value::as_bool).unwrap_or(false));
    vec![NormalizedEntry::Result {
        ok,
        exit_code: value
            .get("exit_code")
            .and_then(Value::as_i64)
            .map(|code| code as i32),
        duration_ms: value.get("duration_ms").and_then(Value::as_u64),
        usage: parse_usage(value.get("usage")),
    }]
}

/// Partial-message mode: text arrives as `content_block_delta` events and is
/// flushed into one entry when the block stops.
fn normalize_stream_event(
    state: &mut NormalizerState,
    emit_thinking: bool,
    value: &Value,
) -> Vec<NormalizedEntry> {
    let Some(event) = value.get("event") else {
        return Vec::new();
    };

    match event.get("type").and_then(Value::as_str) {
        Some("content_block_start") => {
            state.delta_text.clear();
            state.delta_block = event
                .get("content_block")
                .and_then(|b| b.get("type"))
                .and_then(Value::as_str)
                .map(str::to_string);
            Vec::new()
        }
        Some("content_block_delta") => {
            let delta = event.get("delta");
            if let Some(part) = delta
                .and_then(|d| d.get("text").or_else(|| d.get("thinking")))
                .and_then(Value::as_str)
            {
                state.delta_text.push_str(part);
            }
            Vec::new()
        }
        Some("content_block_stop") => {
            let text = std::mem::take(&mut state.delta_text);
            let block = state.delta_block.take();
            if text.is_empty() {
                return Vec::new();
            }
            match block.as_deref() {
                Some("thinking") if emit_thinking => vec![NormalizedEntry::Thinking { text }],
                Some("thinking") => Vec::new(),
                _ => vec![NormalizedEntry::Assistant { text }],
            }
        }
        _ => Vec::new(),
    }
}

fn content_blocks(value: &Value) -> impl Iterator<Item = &Value> {
    value
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(Value::as_array)
        .map(|blocks| blocks.iter())
        .into_iter()
        .flatten()
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

pub(crate) fn parse_usage(usage: Option<&Value>) -> Option<Usage> {
    let usage = usage?;
    let parsed = Usage {
        input_tokens: usage.get("input_tokens").and_then(Value::as_u64),
        output_tokens: usage.get("output_tokens").and_then(Value::as_u64),
    };
    (parsed != Usage::default()).then_some(parsed)
}

fn result_summary(content: Option<&Value>) -> Option<String> {
    let content = content?;
    if let Some(text) = content.as_str() {
        return Some(text.to_string());
    }
    content.as_array()?.iter().find_map(|item| {
        item.get("text")
            .and_then(Value::as_str)
            .map(str::to_string)
    })
}
