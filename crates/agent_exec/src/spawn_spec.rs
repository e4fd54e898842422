//! Per-vendor translation of [`ExecutorConfig`] into a concrete spawn plan.
//!
//! Each vendor maps config options declaratively: model becomes a flag,
//! auto-approve becomes that vendor's permission bypass, MCP servers become
//! repeated flags or config overrides, resume becomes the vendor's resume
//! form. Options a vendor has no flag for are ignored, not errored.

use std::path::PathBuf;

use exec_events::AgentKind;
use serde_json::json;

use crate::{config::ExecutorConfig, process::SpawnSpec, ExecError};

/// How the task prompt reaches the child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptDelivery {
    /// Written to stdin after spawn (stream-json or raw line).
    Stdin,
    /// Passed as the final positional argument.
    Argv,
}

pub fn prompt_delivery(kind: AgentKind) -> PromptDelivery {
    match kind {
        AgentKind::Claude | AgentKind::Codex => PromptDelivery::Stdin,
        AgentKind::Cursor | AgentKind::Copilot => PromptDelivery::Argv,
    }
}

/// Whether the dialect understands the `interrupt` control request; everyone
/// else gets the SIGINT fallback.
pub fn supports_control_interrupt(kind: AgentKind) -> bool {
    matches!(kind, AgentKind::Claude)
}

pub fn default_binary(kind: AgentKind) -> &'static str {
    match kind {
        AgentKind::Claude => "claude",
        AgentKind::Cursor => "cursor-agent",
        AgentKind::Codex => "codex",
        AgentKind::Copilot => "copilot",
    }
}

/// Builds the spawn plan for one task. The prompt is included in argv only
/// for vendors with positional prompt delivery.
pub fn build_spawn_spec(
    kind: AgentKind,
    config: &ExecutorConfig,
    prompt: &str,
) -> Result<SpawnSpec, ExecError> {
    let executable = config
        .executable
        .clone()
        .unwrap_or_else(|| PathBuf::from(default_binary(kind)));

    let work_dir = match &config.work_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().map_err(ExecError::Io)?,
    };

    let mut argv = match kind {
        AgentKind::Claude => claude_argv(config),
        AgentKind::Cursor => cursor_argv(config),
        AgentKind::Codex => codex_argv(config),
        AgentKind::Copilot => copilot_argv(config),
    };
    if prompt_delivery(kind) == PromptDelivery::Argv {
        argv.push(config.effective_prompt(prompt));
    }

    // Parent environment plus per-agent extension plus MCP server variables.
    let mut env = config.env.clone();
    for server in config.mcp_servers.values() {
        for (key, value) in &server.env {
            env.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }

    Ok(SpawnSpec {
        executable,
        argv,
        env,
        work_dir,
        mode: config.mode,
        pty_cols: config.pty_cols,
        pty_rows: config.pty_rows,
    })
}

fn claude_argv(config: &ExecutorConfig) -> Vec<String> {
    let mut out = vec![
        "--print".to_string(),
        "--verbose".to_string(),
        "--output-format".to_string(),
        "stream-json".to_string(),
        "--input-format".to_string(),
        "stream-json".to_string(),
    ];

    if let Some(model) = &config.model {
        out.push("--model".to_string());
        out.push(model.clone());
    }

    if config.auto_approve {
        out.push("--dangerously-skip-permissions".to_string());
    }

    if !config.mcp_servers.is_empty() {
        let servers: serde_json::Map<String, serde_json::Value> = config
            .mcp_servers
            .iter()
            .map(|(name, server)| {
                (
                    name.clone(),
                    json!({
                        "command": server.command,
                        "args": server.args,
                        "env": server.env,
                    }),
                )
            })
            .collect();
        out.push("--mcp-config".to_string());
        out.push(json!({ "mcpServers": servers }).to_string());
    }

    if let Some(session_id) = &config.resume_session_id {
        out.push("--resume".to_string());
        out.push(session_id.clone());
    }

    out
}

fn codex_argv(config: &ExecutorConfig) -> Vec<String> {
    let mut out = vec![
        "exec".to_string(),
        "--json".to_string(),
        "--skip-git-repo-check".to_string(),
    ];

    if let Some(model) = &config.model {
        out.push("--model".to_string());
        out.push(model.clone());
    }

    if config.auto_approve {
        out.push("--full-auto".to_string());
    }

    for (name, server) in &config.mcp_servers {
        out.push("-c".to_string());
        out.push(format!("mcp_servers.{name}.command={}", server.command));
        if !server.args.is_empty() {
            out.push("-c".to_string());
            out.push(format!(
                "mcp_servers.{name}.args={}",
                serde_json::Value::from(server.args.clone())
            ));
        }
    }

    if let Some(session_id) = &config.resume_session_id {
        out.push("resume".to_string());
        out.push(session_id.clone());
    }

    out
}

fn cursor_argv(config: &ExecutorConfig) -> Vec<String> {
    let mut out = vec![
        "agent".to_string(),
        "--print".to_string(),
        "--output-format".to_string(),
        "stream-json".to_string(),
    ];

    if let Some(model) = &config.model {
        out.push("--model".to_string());
        out.push(model.clone());
    }

    if config.auto_approve {
        out.push("--force".to_string());
    }

    if let Some(session_id) = &config.resume_session_id {
        out.push("--resume".to_string());
        out.push(session_id.clone());
    }

    out
}

fn copilot_argv(config: &ExecutorConfig) -> Vec<String> {
    let mut out = vec!["--log-format".to_string(), "json".to_string()];

    if let Some(model) = &config.model {
        out.push("--model".to_string());
        out.push(model.clone());
    }

    if config.auto_approve {
        out.push("--allow-all-tools".to_string());
    }

    if let Some(session_id) = &config.resume_session_id {
        out.push("--resume".to_string());
        out.push(session_id.clone());
    }

    out
}
