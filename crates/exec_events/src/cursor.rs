//! Cursor `cursor-agent --output-format stream-json` dialect.
//!
//! Claude-shaped `system`/`user`/`assistant`/`result` envelopes, but tool
//! activity arrives as `tool_call` records whose body nests one camelCase
//! call object per tool family (`readToolCall`, `shellToolCall`, ...).

use serde_json::Value;

use crate::entry::{NormalizedEntry, ToolAction};
use crate::normalizer::NormalizerState;
use crate::StreamRecord;

pub(crate) fn normalize(state: &mut NormalizerState, record: &StreamRecord) -> Vec<NormalizedEntry> {
    let value = record.value();
    match record.record_type() {
        Some("system") => {
            let session_id = string_key(value, &["session_id", "sessionId"]).unwrap_or_default();
            state.session_id = Some(session_id.clone());
            vec![NormalizedEntry::System {
                session_id,
                model: string_key(value, &["model"]),
                tools: None,
                cwd: string_key(value, &["cwd"]),
            }]
        }
        Some("user") => message_text(value)
            .map(|text| NormalizedEntry::User { text })
            .into_iter()
            .collect(),
        Some("assistant") => message_text(value)
            .map(|text| NormalizedEntry::Assistant { text })
            .into_iter()
            .collect(),
        Some("tool_call") => normalize_tool_call(state, value),
        Some("result") => vec![NormalizedEntry::Result {
            ok: !value
                .get("is_error")
                .or_else(|| value.get("isError"))
                .and_then(Value::as_bool)
                .unwrap_or(false),
            exit_code: None,
            duration_ms: value
                .get("duration_ms")
                .or_else(|| value.get("durationMs"))
                .and_then(Value::as_u64),
            usage: None,
        }],
        _ => Vec::new(),
    }
}

fn normalize_tool_call(state: &mut NormalizerState, value: &Value) -> Vec<NormalizedEntry> {
    let call_id = string_key(value, &["call_id", "callId"]);
    let subtype = value.get("subtype").and_then(Value::as_str);

    match subtype {
        Some("started") => {
            let Some((name, action)) = classify_call(value.get("tool_call")) else {
                return Vec::new();
            };
            if let Some(id) = &call_id {
                state.tool_names.insert(id.clone(), name.clone());
            }
            vec![NormalizedEntry::ToolUse {
                tool_name: name,
                call_id,
                action,
            }]
        }
        Some("completed") => vec![NormalizedEntry::ToolResult {
            call_id,
            ok: !value
                .get("tool_call")
                .and_then(|call| call.get("error"))
                .is_some_and(|err| !err.is_null()),
            summary: None,
        }],
        _ => Vec::new(),
    }
}

/// Picks the single nested call object out of the `tool_call` body and maps
/// its camelCase key to an action.
fn classify_call(call: Option<&Value>) -> Option<(String, ToolAction)> {
    let call = call?.as_object()?;
    let (key, body) = call.iter().find(|(key, _)| key.ends_with("ToolCall"))?;
    let args = body.get("args").unwrap_or(body);

    let action = match key.as_str() {
        "readToolCall" => ToolAction::FileRead {
            path: path_arg(args),
        },
        "writeToolCall" => ToolAction::FileWrite {
            path: path_arg(args),
        },
        "editToolCall" => ToolAction::FileEdit {
            path: path_arg(args),
        },
        "deleteToolCall" => ToolAction::FileDelete {
            path: path_arg(args),
        },
        "shellToolCall" => ToolAction::Shell {
            cmd: string_key(args, &["command", "cmd"]).unwrap_or_default(),
        },
        "grepToolCall" | "globToolCall" | "searchToolCall" => ToolAction::Search {
            query: string_key(args, &["pattern", "query", "globPattern"]).unwrap_or_default(),
        },
        "todoToolCall" => ToolAction::Todo {
            items: args
                .get("todos")
                .and_then(Value::as_array)
                .map(|todos| {
                    todos
                        .iter()
                        .filter_map(|todo| {
                            todo.as_str()
                                .or_else(|| todo.get("content").and_then(Value::as_str))
                                .map(str::to_string)
                        })
                        .collect()
                })
                .unwrap_or_default(),
        },
        "mcpToolCall" => ToolAction::Mcp {
            server: string_key(args, &["server", "serverName"]).unwrap_or_default(),
            tool: string_key(args, &["tool", "toolName"]).unwrap_or_default(),
        },
        _ => ToolAction::Unknown {
            raw: Value::Object(call.clone()),
        },
    };

    Some((key.trim_end_matches("ToolCall").to_string(), action))
}

fn path_arg(args: &Value) -> String {
    string_key(args, &["path", "file_path", "filePath"]).unwrap_or_default()
}

fn message_text(value: &Value) -> Option<String> {
    let content = value.get("message")?.get("content")?;
    if let Some(text) = content.as_str() {
        return Some(text.to_string());
    }
    let blocks = content.as_array()?;
    let text: String = blocks
        .iter()
        .filter_map(|block| block.get("text").and_then(Value::as_str))
        .collect();
    (!text.is_empty()).then_some(text)
}

fn string_key(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| value.get(key).and_then(Value::as_str))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(records: &[Value]) -> Vec<NormalizedEntry> {
        let mut state = NormalizerState::default();
        records
            .iter()
            .flat_map(|value| normalize(&mut state, &StreamRecord::new(value.clone())))
            .collect()
    }

    #[test]
    fn camel_case_session_keys_are_accepted() {
        let entries = run(&[json!({"type": "system", "sessionId": "cur-1", "model": "gpt"})]);
        assert_eq!(
            entries,
            vec![NormalizedEntry::System {
                session_id: "cur-1".into(),
                model: Some("gpt".into()),
                tools: None,
                cwd: None,
            }]
        );
    }

    #[test]
    fn started_tool_call_classifies_from_nested_key() {
        let entries = run(&[json!({
            "type": "tool_call", "subtype": "started", "callId": "c7",
            "tool_call": {"shellToolCall": {"args": {"command": "pwd"}}},
        })]);
        assert_eq!(
            entries,
            vec![NormalizedEntry::ToolUse {
                tool_name: "shell".into(),
                call_id: Some("c7".into()),
                action: ToolAction::Shell { cmd: "pwd".into() },
            }]
        );
    }

    #[test]
    fn completed_tool_call_reports_the_outcome() {
        let entries = run(&[json!({
            "type": "tool_call", "subtype": "completed", "callId": "c7",
            "tool_call": {"shellToolCall": {"result": {"exitCode": 0}}},
        })]);
        assert_eq!(
            entries,
            vec![NormalizedEntry::ToolResult {
                call_id: Some("c7".into()),
                ok: true,
                summary: None,
            }]
        );
    }

    #[test]
    fn read_tool_call_extracts_the_path() {
        let entries = run(&[json!({
            "type": "tool_call", "subtype": "started", "callId": "c8",
            "tool_call": {"readToolCall": {"args": {"path": "/src/lib.rs"}}},
        })]);
        assert!(matches!(
            &entries[0],
            NormalizedEntry::ToolUse {
                action: ToolAction::FileRead { path },
                ..
            } if path == "/src/lib.rs"
        ));
    }

    #[test]
    fn result_record_accepts_both_key_styles() {
        let entries = run(&[json!({"type": "result", "durationMs": 99, "isError": false})]);
        assert_eq!(
            entries,
            vec![NormalizedEntry::Result {
                ok: true,
                exit_code: None,
                duration_ms: Some(99),
                usage: None,
            }]
        );
    }
}
