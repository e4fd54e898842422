//! Compile-time agent registry and executor factory.

use exec_events::AgentKind;

use crate::{config::ExecutorConfig, executor::AgentExecutor, ExecError};

/// Static description of one supported agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentDescriptor {
    pub name: &'static str,
    pub display_name: &'static str,
    pub description: &'static str,
    /// Static per build; a listed agent may still fail to spawn if its
    /// binary is not installed.
    pub available: bool,
}

pub const AVAILABLE_AGENTS: &[AgentDescriptor] = &[
    AgentDescriptor {
        name: "claude",
        display_name: "Claude Code",
        description: "Anthropic's Claude Code CLI (stream-json, control channel)",
        available: true,
    },
    AgentDescriptor {
        name: "cursor",
        display_name: "Cursor Agent",
        description: "Cursor's cursor-agent CLI (stream-json)",
        available: true,
    },
    AgentDescriptor {
        name: "codex",
        display_name: "Codex CLI",
        description: "OpenAI's codex exec (JSONL thread/turn/item events)",
        available: true,
    },
    AgentDescriptor {
        name: "copilot",
        display_name: "Copilot CLI",
        description: "GitHub Copilot CLI (JSON log stream, best-effort dialect)",
        available: true,
    },
];

pub fn descriptor(name: &str) -> Option<&'static AgentDescriptor> {
    AVAILABLE_AGENTS.iter().find(|agent| agent.name == name)
}

/// Builds the executor for a named agent. Unknown names fail without creating
/// a session.
pub fn create_executor(name: &str, config: ExecutorConfig) -> Result<AgentExecutor, ExecError> {
    let kind = AgentKind::from_name(name).ok_or_else(|| ExecError::UnsupportedAgent {
        name: name.to_string(),
    })?;
    Ok(AgentExecutor::new(kind, config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_descriptor_resolves_to_an_executor() {
        for agent in AVAILABLE_AGENTS {
            let executor = create_executor(agent.name, ExecutorConfig::new()).unwrap();
            assert_eq!(executor.agent_kind().as_str(), agent.name);
        }
    }

    #[test]
    fn unknown_agents_are_rejected() {
        let err = create_executor("aider", ExecutorConfig::new()).unwrap_err();
        assert!(matches!(err, ExecError::UnsupportedAgent { name } if name == "aider"));
    }

    #[test]
    fn descriptor_lookup_matches_the_table() {
        assert_eq!(descriptor("claude").unwrap().display_name, "Claude Code");
        assert!(descriptor("nope").is_none());
    }
}
