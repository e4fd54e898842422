//! Per-agent execution configuration.
//!
//! Builder-style setters; every vendor consumes only the keys it recognizes
//! and ignores the rest.

use std::{collections::BTreeMap, path::PathBuf};

use crate::process::ProcessMode;

/// Out-of-process tool provider the vendor connects to, configured through
/// vendor-specific flags at spawn time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct McpServerConfig {
    pub command: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

impl McpServerConfig {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub work_dir: Option<PathBuf>,
    /// Overrides the vendor's default binary name.
    pub executable: Option<PathBuf>,
    pub model: Option<String>,
    /// When set, `can_use_tool` requests are answered with allow and the
    /// vendor's own permission prompts are disabled where a flag exists.
    pub auto_approve: bool,
    pub mcp_servers: BTreeMap<String, McpServerConfig>,
    /// Concatenated after the task prompt, separated by a blank line.
    pub append_prompt: Option<String>,
    /// Restores vendor-side session state; the vendor owns persistence.
    pub resume_session_id: Option<String>,
    pub mode: ProcessMode,
    /// Extends the parent environment for the child.
    pub env: BTreeMap<String, String>,
    /// Surface `thinking` entries to the caller.
    pub emit_thinking: bool,
    pub pty_cols: u16,
    pub pty_rows: u16,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            work_dir: None,
            executable: None,
            model: None,
            auto_approve: false,
            mcp_servers: BTreeMap::new(),
            append_prompt: None,
            resume_session_id: None,
            mode: ProcessMode::Structured,
            env: BTreeMap::new(),
            emit_thinking: false,
            pty_cols: 80,
            pty_rows: 24,
        }
    }
}

impl ExecutorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(dir.into());
        self
    }

    pub fn executable(mut self, binary: impl Into<PathBuf>) -> Self {
        self.executable = Some(binary.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn auto_approve(mut self, enabled: bool) -> Self {
        self.auto_approve = enabled;
        self
    }

    pub fn mcp_server(mut self, name: impl Into<String>, server: McpServerConfig) -> Self {
        self.mcp_servers.insert(name.into(), server);
        self
    }

    pub fn append_prompt(mut self, text: impl Into<String>) -> Self {
        self.append_prompt = Some(text.into());
        self
    }

    pub fn resume_session(mut self, session_id: impl Into<String>) -> Self {
        self.resume_session_id = Some(session_id.into());
        self
    }

    pub fn mode(mut self, mode: ProcessMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn emit_thinking(mut self, enabled: bool) -> Self {
        self.emit_thinking = enabled;
        self
    }

    pub fn pty_size(mut self, cols: u16, rows: u16) -> Self {
        self.pty_cols = cols;
        self.pty_rows = rows;
        self
    }

    /// Task prompt with the configured append-prompt folded in.
    pub fn effective_prompt(&self, prompt: &str) -> String {
        match self.append_prompt.as_deref() {
            Some(append) if !append.trim().is_empty() => format!("{prompt}\n\n{append}"),
            _ => prompt.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_prompt_concatenates_with_a_blank_line() {
        let config = ExecutorConfig::new().append_prompt("follow house style");
        assert_eq!(
            config.effective_prompt("fix the bug"),
            "fix the bug\n\nfollow house style"
        );

        let plain = ExecutorConfig::new();
        assert_eq!(plain.effective_prompt("fix the bug"), "fix the bug");
    }

    #[test]
    fn defaults_keep_the_standard_terminal_size() {
        let config = ExecutorConfig::new();
        assert_eq!((config.pty_cols, config.pty_rows), (80, 24));
        assert_eq!(config.mode, ProcessMode::Structured);
    }
}
