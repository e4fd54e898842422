use std::collections::HashMap;

use crate::{NormalizedEntry, StreamRecord};

/// Supported vendor dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentKind {
    Claude,
    Cursor,
    Codex,
    Copilot,
}

impl AgentKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "claude" => Some(AgentKind::Claude),
            "cursor" => Some(AgentKind::Cursor),
            "codex" => Some(AgentKind::Codex),
            "copilot" => Some(AgentKind::Copilot),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Claude => "claude",
            AgentKind::Cursor => "cursor",
            AgentKind::Codex => "codex",
            AgentKind::Copilot => "copilot",
        }
    }
}

/// Accumulated dialect state carried across records within one session.
#[derive(Debug, Default)]
pub(crate) struct NormalizerState {
    /// Session id from the first system-ish record; later records may omit it.
    pub(crate) session_id: Option<String>,
    /// `call_id -> tool name`, used to pair tool results with their call.
    pub(crate) tool_names: HashMap<String, String>,
    /// Text assembled from streamed deltas, flushed on the block-stop record.
    pub(crate) delta_text: String,
    /// Kind of the content block currently being streamed (`text`, `thinking`).
    pub(crate) delta_block: Option<String>,
    pub(crate) emitted_system: bool,
    pub(crate) emitted_result: bool,
    pub(crate) emitted_any: bool,
}

/// Folds one vendor's raw stream records into [`NormalizedEntry`] values.
///
/// Pure and stateful: each record may yield zero, one, or many entries, and
/// the output depends only on the record plus previously accumulated state.
/// Dispatch is by [`AgentKind`] tag, one normalization function per dialect.
#[derive(Debug)]
pub struct Normalizer {
    kind: AgentKind,
    emit_thinking: bool,
    state: NormalizerState,
}

impl Normalizer {
    pub fn for_agent(kind: AgentKind) -> Self {
        Self {
            kind,
            emit_thinking: false,
            state: NormalizerState::default(),
        }
    }

    /// Opt in to surfacing intermediate reasoning as `thinking` entries.
    pub fn emit_thinking(mut self, enabled: bool) -> Self {
        self.emit_thinking = enabled;
        self
    }

    pub fn agent_kind(&self) -> AgentKind {
        self.kind
    }

    pub fn normalize(&mut self, record: &StreamRecord) -> Vec<NormalizedEntry> {
        let entries = match self.kind {
            AgentKind::Claude => {
                crate::claude::normalize(&mut self.state, self.emit_thinking, record)
            }
            AgentKind::Cursor => crate::cursor::normalize(&mut self.state, record),
            AgentKind::Codex => {
                crate::codex::normalize(&mut self.state, self.emit_thinking, record)
            }
            AgentKind::Copilot => {
                crate::copilot::normalize(&mut self.state, self.emit_thinking, record)
            }
        };
        self.enforce_lifecycle(entries)
    }

    /// Keeps the per-session lifecycle invariant: at most one `system` and
    /// only as the first entry, at most one `result` and nothing after it,
    /// regardless of what the vendor repeats.
    fn enforce_lifecycle(&mut self, entries: Vec<NormalizedEntry>) -> Vec<NormalizedEntry> {
        entries
            .into_iter()
            .filter(|entry| {
                let keep = match entry {
                    NormalizedEntry::System { .. } => {
                        !self.state.emitted_system && !self.state.emitted_any
                    }
                    NormalizedEntry::Result { .. } => !self.state.emitted_result,
                    _ => !self.state.emitted_result,
                };
                if keep {
                    self.state.emitted_any = true;
                    match entry {
                        NormalizedEntry::System { .. } => self.state.emitted_system = true,
                        NormalizedEntry::Result { .. } => self.state.emitted_result = true,
                        _ => {}
                    }
                }
                keep
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn agent_names_round_trip() {
        for kind in [
            AgentKind::Claude,
            AgentKind::Cursor,
            AgentKind::Codex,
            AgentKind::Copilot,
        ] {
            assert_eq!(AgentKind::from_name(kind.as_str()), Some(kind));
        }
        assert_eq!(AgentKind::from_name("aider"), None);
    }

    #[test]
    fn duplicate_terminal_records_collapse_to_one_result() {
        let mut normalizer = Normalizer::for_agent(AgentKind::Claude);
        let result = StreamRecord::new(json!({"type": "result", "is_error": false}));

        let first = normalizer.normalize(&result);
        assert_eq!(first.len(), 1);
        assert!(first[0].is_terminal());

        let second = normalizer.normalize(&result);
        assert!(second.is_empty());
    }

    #[test]
    fn repeated_system_records_collapse_to_one() {
        let mut normalizer = Normalizer::for_agent(AgentKind::Claude);
        let init = StreamRecord::new(json!({
            "type": "system", "subtype": "init", "session_id": "s1",
        }));
        assert_eq!(normalizer.normalize(&init).len(), 1);
        assert!(normalizer.normalize(&init).is_empty());
    }

    #[test]
    fn late_system_records_are_suppressed() {
        let mut normalizer = Normalizer::for_agent(AgentKind::Claude);
        let text = StreamRecord::new(json!({
            "type": "assistant",
            "message": {"content": [{"type": "text", "text": "early"}]},
        }));
        assert_eq!(normalizer.normalize(&text).len(), 1);

        let init = StreamRecord::new(json!({
            "type": "system", "subtype": "init", "session_id": "s1",
        }));
        assert!(normalizer.normalize(&init).is_empty());
    }
}
