//! Copilot CLI JSON-log dialect.
//!
//! The loosest of the four vocabularies: flat `session_start` / `message` /
//! `tool_execution` / `session_end` records, with Claude-shaped envelopes
//! accepted as a fallback since the CLI's library mode emits those for some
//! event classes. Everything unrecognized is classified best-effort and never
//! aborts the stream.

use serde_json::Value;

use crate::entry::{classify_tool, NormalizedEntry};
use crate::normalizer::NormalizerState;
use crate::StreamRecord;

pub(crate) fn normalize(
    state: &mut NormalizerState,
    emit_thinking: bool,
    record: &StreamRecord,
) -> Vec<NormalizedEntry> {
    let value = record.value();
    match record.record_type() {
        Some("session_start") => {
            let session_id = value
                .get("session_id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            state.session_id = Some(session_id.clone());
            vec![NormalizedEntry::System {
                session_id,
                model: value.get("model").and_then(Value::as_str).map(str::to_string),
                tools: None,
                cwd: value.get("cwd").and_then(Value::as_str).map(str::to_string),
            }]
        }
        Some("message") => normalize_message(value),
        Some("reasoning") if emit_thinking => text_field(value)
            .map(|text| NormalizedEntry::Thinking { text })
            .into_iter()
            .collect(),
        Some("reasoning") => Vec::new(),
        Some("tool_execution") => normalize_tool_execution(state, value),
        Some("session_end") | Some("result") => vec![NormalizedEntry::Result {
            ok: !value
                .get("is_error")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            exit_code: value
                .get("exit_code")
                .and_then(Value::as_i64)
                .map(|code| code as i32),
            duration_ms: value.get("duration_ms").and_then(Value::as_u64),
            usage: crate::claude::parse_usage(value.get("usage")),
        }],
        // Library mode re-emits Claude-shaped envelopes for chat turns.
        Some("system") | Some("assistant") | Some("user") => {
            crate::claude::normalize(state, emit_thinking, record)
        }
        _ => Vec::new(),
    }
}

fn normalize_message(value: &Value) -> Vec<NormalizedEntry> {
    let Some(text) = text_field(value) else {
        return Vec::new();
    };
    let entry = match value.get("role").and_then(Value::as_str) {
        Some("user") => NormalizedEntry::User { text },
        _ => NormalizedEntry::Assistant { text },
    };
    vec![entry]
}

/// One record per tool execution, tagged with a lifecycle `status`. `started`
/// carries the invocation; any other status reports its outcome.
fn normalize_tool_execution(state: &mut NormalizerState, value: &Value) -> Vec<NormalizedEntry> {
    let name = value
        .get("tool")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let call_id = value
        .get("call_id")
        .and_then(Value::as_str)
        .map(str::to_string);
    let args = value.get("arguments").cloned().unwrap_or(Value::Null);

    match value.get("status").and_then(Value::as_str) {
        Some("started") | None => {
            if let Some(id) = &call_id {
                state.tool_names.insert(id.clone(), name.clone());
            }
            vec![NormalizedEntry::ToolUse {
                action: classify_tool(&name, &args),
                tool_name: name,
                call_id,
            }]
        }
        Some(status) => vec![NormalizedEntry::ToolResult {
            call_id,
            ok: status == "completed" || status == "success",
            summary: value
                .get("output")
                .and_then(Value::as_str)
                .map(str::to_string),
        }],
    }
}

fn text_field(value: &Value) -> Option<String> {
    value
        .get("content")
        .or_else(|| value.get("text"))
        .and_then(Value::as_str)
        .map(str::to_string)
}
