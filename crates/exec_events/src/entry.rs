use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Token accounting reported by a vendor's terminal record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,
}

/// Classified effect of a tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolAction {
    Shell { cmd: String },
    FileRead { path: String },
    FileWrite { path: String },
    FileEdit { path: String },
    FileDelete { path: String },
    Search { query: String },
    Todo { items: Vec<String> },
    Mcp { server: String, tool: String },
    Unknown { raw: Value },
}

/// The canonical, vendor-independent event exposed to callers.
///
/// Per session: at most one `System` (always first) and exactly one `Result`
/// (always last) unless the transport fails mid-stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NormalizedEntry {
    System {
        session_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tools: Option<Vec<String>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cwd: Option<String>,
    },
    User {
        text: String,
    },
    Assistant {
        text: String,
    },
    Thinking {
        text: String,
    },
    ToolUse {
        tool_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        call_id: Option<String>,
        action: ToolAction,
    },
    ToolResult {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        call_id: Option<String>,
        ok: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        summary: Option<String>,
    },
    Result {
        ok: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_ms: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },
}

impl NormalizedEntry {
    /// Terminal entries end the session stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, NormalizedEntry::Result { .. })
    }

    /// Path touched by a mutating file action, if any.
    pub fn changed_path(&self) -> Option<&str> {
        match self {
            NormalizedEntry::ToolUse {
                action: ToolAction::FileWrite { path } | ToolAction::FileEdit { path },
                ..
            } => Some(path),
            _ => None,
        }
    }
}

/// Classifies a vendor tool by name, extracting the argument the action needs.
///
/// Matching is case-insensitive on the tool name. Anything unrecognized lands
/// in `Unknown { raw }` with the original arguments preserved, so callers can
/// still inspect what the vendor tried to do.
pub fn classify_tool(tool_name: &str, args: &Value) -> ToolAction {
    if let Some(rest) = tool_name.strip_prefix("mcp__") {
        let (server, tool) = match rest.split_once("__") {
            Some((server, tool)) => (server.to_string(), tool.to_string()),
            None => (rest.to_string(), String::new()),
        };
        return ToolAction::Mcp { server, tool };
    }

    match tool_name.to_ascii_lowercase().as_str() {
        "bash" | "shell" | "exec" | "run" => ToolAction::Shell {
            cmd: first_string(args, &["command", "cmd", "script"]).unwrap_or_default(),
        },
        "read" | "open_file" | "cat" => ToolAction::FileRead {
            path: first_string(args, &["file_path", "path", "file"]).unwrap_or_default(),
        },
        "write" | "create_file" => ToolAction::FileWrite {
            path: first_string(args, &["file_path", "path", "file"]).unwrap_or_default(),
        },
        "edit" | "str_replace" | "apply_patch" | "multiedit" | "notebookedit" => {
            ToolAction::FileEdit {
                path: first_string(args, &["file_path", "path", "file"]).unwrap_or_default(),
            }
        }
        "delete" | "rm" => ToolAction::FileDelete {
            path: first_string(args, &["file_path", "path", "file"]).unwrap_or_default(),
        },
        "grep" | "glob" | "search" | "codebase_search" | "web_search" | "websearch" => {
            ToolAction::Search {
                query: first_string(args, &["pattern", "query", "search"]).unwrap_or_default(),
            }
        }
        "todo_write" | "todo_read" | "todowrite" | "todoread" => ToolAction::Todo {
            items: todo_items(args),
        },
        _ => ToolAction::Unknown { raw: args.clone() },
    }
}

fn first_string(args: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| args.get(key).and_then(Value::as_str))
        .map(str::to_string)
}

fn todo_items(args: &Value) -> Vec<String> {
    let Some(todos) = args.get("todos").or_else(|| args.get("items")) else {
        return Vec::new();
    };
    let Some(todos) = todos.as_array() else {
        return Vec::new();
    };
    todos
        .iter()
        .filter_map(|item| {
            item.as_str()
                .or_else(|| item.get("content").and_then(Value::as_str))
                .map(str::to_string)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn shell_tools_take_the_first_string_argument() {
        let action = classify_tool("Bash", &json!({"command": "ls -la"}));
        assert_eq!(
            action,
            ToolAction::Shell {
                cmd: "ls -la".into()
            }
        );

        let action = classify_tool("exec", &json!({"cmd": "make test"}));
        assert_eq!(
            action,
            ToolAction::Shell {
                cmd: "make test".into()
            }
        );
    }

    #[test]
    fn file_tools_classify_by_name_family() {
        assert!(matches!(
            classify_tool("Read", &json!({"file_path": "/a"})),
            ToolAction::FileRead { path } if path == "/a"
        ));
        assert!(matches!(
            classify_tool("create_file", &json!({"path": "/b"})),
            ToolAction::FileWrite { path } if path == "/b"
        ));
        assert!(matches!(
            classify_tool("str_replace", &json!({"file_path": "/c"})),
            ToolAction::FileEdit { path } if path == "/c"
        ));
        assert!(matches!(
            classify_tool("rm", &json!({"path": "/d"})),
            ToolAction::FileDelete { path } if path == "/d"
        ));
    }

    #[test]
    fn mcp_prefix_splits_server_and_tool() {
        let action = classify_tool("mcp__files__list_dir", &json!({}));
        assert_eq!(
            action,
            ToolAction::Mcp {
                server: "files".into(),
                tool: "list_dir".into()
            }
        );
    }

    #[test]
    fn todo_items_accept_strings_and_content_objects() {
        let action = classify_tool(
            "TodoWrite",
            &json!({"todos": [{"content": "first", "status": "pending"}, "second"]}),
        );
        assert_eq!(
            action,
            ToolAction::Todo {
                items: vec!["first".into(), "second".into()]
            }
        );
    }

    #[test]
    fn unknown_tools_keep_their_raw_arguments() {
        let args = json!({"anything": [1, 2, 3]});
        let action = classify_tool("DoSomethingNovel", &args);
        assert_eq!(action, ToolAction::Unknown { raw: args });
    }

    #[test]
    fn entry_serialization_is_tagged_snake_case() {
        let entry = NormalizedEntry::ToolUse {
            tool_name: "Bash".into(),
            call_id: Some("c1".into()),
            action: ToolAction::Shell { cmd: "ls".into() },
        };
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["type"], "tool_use");
        assert_eq!(value["action"]["kind"], "shell");
        assert_eq!(value["action"]["cmd"], "ls");

        let back: NormalizedEntry = serde_json::from_value(value).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn changed_path_covers_writes_and_edits_only() {
        let write = NormalizedEntry::ToolUse {
            tool_name: "Write".into(),
            call_id: None,
            action: ToolAction::FileWrite { path: "/a".into() },
        };
        let read = NormalizedEntry::ToolUse {
            tool_name: "Read".into(),
            call_id: None,
            action: ToolAction::FileRead { path: "/a".into() },
        };
        assert_eq!(write.changed_path(), Some("/a"));
        assert_eq!(read.changed_path(), None);
    }
}
