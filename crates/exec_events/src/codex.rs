//! Codex `exec --json` dialect.
//!
//! Thread/turn/item envelopes: `thread.started`, `turn.started`,
//! `item.started`/`item.updated`/`item.completed` with an `item_type` such as
//! `agent_message`, `reasoning`, `command_execution`, `file_change`,
//! `mcp_tool_call`, `web_search`, or `todo_list`, then `turn.completed` or
//! `turn.failed`.

use serde_json::Value;

use crate::entry::{NormalizedEntry, ToolAction};
use crate::normalizer::NormalizerState;
use crate::StreamRecord;

pub(crate) fn normalize(
    state: &mut NormalizerState,
    emit_thinking: bool,
    record: &StreamRecord,
) -> Vec<NormalizedEntry> {
    let value = record.value();
    match record.record_type() {
        Some("thread.started") | Some("thread.resumed") => {
            let session_id = value
                .get("thread_id")
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
        Some("item.started") => item_started(state, value),
        Some("item.completed") => item_completed(state, emit_thinking, value),
        Some("turn.completed") => vec![NormalizedEntry::Result {
            ok: true,
            exit_code: None,
            duration_ms: value.get("duration_ms").and_then(Value::as_u64),
            usage: crate::claude::parse_usage(value.get("usage")),
        }],
        Some("turn.failed") | Some("error") => vec![NormalizedEntry::Result {
            ok: false,
            exit_code: None,
            duration_ms: None,
            usage: None,
        }],
        _ => Vec::new(),
    }
}

/// Long-running items announce themselves up front; only command execution is
/// interesting at start time, so the shell entry streams before its result.
fn item_started(state: &mut NormalizerState, value: &Value) -> Vec<NormalizedEntry> {
    let Some(item) = value.get("item") else {
        return Vec::new();
    };
    if item_type(item) != Some("command_execution") {
        return Vec::new();
    }

    let call_id = item_id(item);
    if let Some(id) = &call_id {
        state.tool_names.insert(id.clone(), "command_execution".into());
    }
    vec![NormalizedEntry::ToolUse {
        tool_name: "command_execution".into(),
        call_id,
        action: ToolAction::Shell {
            cmd: item
                .get("command")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        },
    }]
}

fn item_completed(
    state: &mut NormalizerState,
    emit_thinking: bool,
    value: &Value,
) -> Vec<NormalizedEntry> {
    let Some(item) = value.get("item") else {
        return Vec::new();
    };
    let call_id = item_id(item);

    match item_type(item) {
        Some("agent_message") => item_text(item)
            .map(|text| NormalizedEntry::Assistant { text })
            .into_iter()
            .collect(),
        Some("reasoning") if emit_thinking => item_text(item)
            .map(|text| NormalizedEntry::Thinking { text })
            .into_iter()
            .collect(),
        Some("reasoning") => Vec::new(),
        Some("command_execution") => {
            // The start record already emitted the tool use; completion only
            // reports the outcome. A completion with no prior start (replayed
            // sessions) emits both.
            let exit_code = item.get("exit_code").and_then(Value::as_i64);
            let mut entries = Vec::new();
            let seen = call_id
                .as_deref()
                .is_some_and(|id| state.tool_names.contains_key(id));
            if !seen {
                entries.extend(item_started(state, value));
            }
            entries.push(NormalizedEntry::ToolResult {
                call_id,
                ok: exit_code.unwrap_or(0) == 0,
                summary: item
                    .get("aggregated_output")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            });
            entries
        }
        Some("file_change") => file_changes(item),
        Some("mcp_tool_call") => {
            let server = item
                .get("server_name")
                .or_else(|| item.get("server"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let tool = item
                .get("tool_name")
                .or_else(|| item.get("tool"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let ok = item.get("status").and_then(Value::as_str) != Some("failed");
            vec![
                NormalizedEntry::ToolUse {
                    tool_name: format!("mcp__{server}__{tool}"),
                    call_id: call_id.clone(),
                    action: ToolAction::Mcp { server, tool },
                },
                NormalizedEntry::ToolResult {
                    call_id,
                    ok,
                    summary: None,
                },
            ]
        }
        Some("web_search") => vec![NormalizedEntry::ToolUse {
            tool_name: "web_search".into(),
            call_id,
            action: ToolAction::Search {
                query: item
                    .get("query")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            },
        }],
        Some("todo_list") => vec![NormalizedEntry::ToolUse {
            tool_name: "todo_list".into(),
            call_id,
            action: ToolAction::Todo {
                items: item
                    .get("items")
                    .and_then(Value::as_array)
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(|entry| {
                                entry
                                    .as_str()
                                    .or_else(|| entry.get("text").and_then(Value::as_str))
                                    .map(str::to_string)
                            })
                            .collect()
                    })
                    .unwrap_or_default(),
            },
        }],
        Some(other) => vec![NormalizedEntry::ToolUse {
            tool_name: other.to_string(),
            call_id,
            action: ToolAction::Unknown { raw: item.clone() },
        }],
        None => Vec::new(),
    }
}

fn file_changes(item: &Value) -> Vec<NormalizedEntry> {
    let Some(changes) = item.get("changes").and_then(Value::as_array) else {
        return Vec::new();
    };
    changes
        .iter()
        .filter_map(|change| {
            let path = change
                .get("path")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let action = match change.get("kind").and_then(Value::as_str) {
                Some("add") => ToolAction::FileWrite { path },
                Some("update") => ToolAction::FileEdit { path },
                Some("delete") => ToolAction::FileDelete { path },
                _ => return None,
            };
            Some(NormalizedEntry::ToolUse {
                tool_name: "file_change".into(),
                call_id: None,
                action,
            })
        })
        .collect()
}

fn item_type(item: &Value) -> Option<&str> {
    item.get("item_type")
        .or_else(|| item.get("type"))
        .and_then(Value::as_str)
}

fn item_id(item: &Value) -> Option<String> {
    item.get("id")
        .or_else(|| item.get("item_id"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn item_text(item: &Value) -> Option<String> {
    item.get("text")
        .or_else(|| item.get("content"))
        .and_then(Value::as_str)
        .map(str::to_string)
}
