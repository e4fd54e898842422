//! State-tracked view of one executor invocation.
//!
//! The executor's pump loop is the only writer; everyone else reads
//! snapshots through the shared handle, so there is no mutual reference
//! between session and executor.

use std::{
    collections::BTreeSet,
    path::PathBuf,
    sync::{Arc, Mutex},
    time::{Duration, Instant, SystemTime},
};

use exec_events::NormalizedEntry;

struct SessionInner {
    task_id: String,
    process_id: u32,
    agent_name: String,
    work_dir: PathBuf,
    started_wall: SystemTime,
    started: Instant,
    entries: Vec<NormalizedEntry>,
}

/// Shared, cheaply clonable handle over one session's accumulated state.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Mutex<SessionInner>>,
}

impl Session {
    pub(crate) fn new(
        task_id: impl Into<String>,
        process_id: u32,
        agent_name: impl Into<String>,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SessionInner {
                task_id: task_id.into(),
                process_id,
                agent_name: agent_name.into(),
                work_dir: work_dir.into(),
                started_wall: SystemTime::now(),
                started: Instant::now(),
                entries: Vec::new(),
            })),
        }
    }

    pub(crate) fn push_entry(&self, entry: NormalizedEntry) {
        self.lock().entries.push(entry);
    }

    pub fn task_id(&self) -> String {
        self.lock().task_id.clone()
    }

    pub fn process_id(&self) -> u32 {
        self.lock().process_id
    }

    pub fn agent_name(&self) -> String {
        self.lock().agent_name.clone()
    }

    pub fn work_dir(&self) -> PathBuf {
        self.lock().work_dir.clone()
    }

    pub fn started_at(&self) -> SystemTime {
        self.lock().started_wall
    }

    /// Time since spawn.
    pub fn duration(&self) -> Duration {
        self.lock().started.elapsed()
    }

    /// Snapshot of all entries recorded so far, in arrival order.
    pub fn entries(&self) -> Vec<NormalizedEntry> {
        self.lock().entries.clone()
    }

    pub fn entry_count(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn tool_use_count(&self) -> usize {
        self.lock()
            .entries
            .iter()
            .filter(|entry| matches!(entry, NormalizedEntry::ToolUse { .. }))
            .count()
    }

    /// Distinct paths across `file_write` and `file_edit` actions.
    pub fn files_changed_count(&self) -> usize {
        let inner = self.lock();
        let unique: BTreeSet<&str> = inner
            .entries
            .iter()
            .filter_map(NormalizedEntry::changed_path)
            .collect();
        unique.len()
    }

    pub fn final_result(&self) -> Option<NormalizedEntry> {
        self.lock()
            .entries
            .iter()
            .rev()
            .find(|entry| entry.is_terminal())
            .cloned()
    }

    /// Clears accumulated entries; identity fields stay readable.
    pub fn release(&self) {
        self.lock().entries.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionInner> {
        self.inner.lock().expect("session state poisoned")
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("Session")
            .field("task_id", &inner.task_id)
            .field("process_id", &inner.process_id)
            .field("agent_name", &inner.agent_name)
            .field("work_dir", &inner.work_dir)
            .field("entries", &inner.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exec_events::ToolAction;

    fn tool_use(action: ToolAction) -> NormalizedEntry {
        NormalizedEntry::ToolUse {
            tool_name: "t".into(),
            call_id: None,
            action,
        }
    }

    #[test]
    fn files_changed_counts_unique_paths_across_writes_and_edits() {
        let session = Session::new("task-1", 42, "claude", "/tmp");
        session.push_entry(tool_use(ToolAction::FileWrite { path: "/a".into() }));
        session.push_entry(tool_use(ToolAction::FileEdit { path: "/a".into() }));
        session.push_entry(tool_use(ToolAction::FileWrite { path: "/b".into() }));
        session.push_entry(tool_use(ToolAction::FileRead { path: "/c".into() }));

        assert_eq!(session.files_changed_count(), 2);
        assert_eq!(session.tool_use_count(), 4);
    }

    #[test]
    fn release_clears_entries_but_keeps_identity() {
        let session = Session::new("task-2", 7, "codex", "/work");
        session.push_entry(NormalizedEntry::Assistant { text: "hi".into() });
        assert_eq!(session.entry_count(), 1);

        session.release();
        assert_eq!(session.entry_count(), 0);
        assert_eq!(session.task_id(), "task-2");
        assert_eq!(session.process_id(), 7);
    }

    #[test]
    fn final_result_finds_the_terminal_entry() {
        let session = Session::new("task-3", 1, "claude", "/tmp");
        assert!(session.final_result().is_none());

        session.push_entry(NormalizedEntry::Assistant { text: "working".into() });
        session.push_entry(NormalizedEntry::Result {
            ok: true,
            exit_code: Some(0),
            duration_ms: Some(5),
            usage: None,
        });
        assert!(session.final_result().unwrap().is_terminal());
    }
}
