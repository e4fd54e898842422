//! One session end-to-end: spawn the vendor child, pump its stream through
//! the codec, peer, and normalizer into the entry queue, and expose
//! interrupt/wait/follow-up on a cloneable handle.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use exec_events::{AgentKind, HookOutput, NormalizedEntry, Normalizer, PermissionResponse};
use serde_json::{json, Value};
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::{
    config::ExecutorConfig,
    process::{ChildProcess, ProcessSignal, ProcessSignaller},
    protocol::{ControlHandler, ControlOutcome, ProtocolPeer},
    queue::{entry_queue, EntryReceiver, EntrySender},
    session::Session,
    spawn_spec::{build_spawn_spec, prompt_delivery, supports_control_interrupt, PromptDelivery},
    stderr_tail::StderrTail,
    ExecError,
};

/// SIGTERM-to-SIGKILL grace period during teardown.
const TEARDOWN_GRACE: Duration = Duration::from_secs(5);
const INTERRUPT_ACK_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle of one executor invocation. Terminal states are `Done` and
/// `Failed`; nothing re-enters `New`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    New,
    Running,
    Draining,
    Failing,
    Done,
    Failed,
}

/// Final report from [`ExecutionHandle::wait`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExecOutcome {
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub duration_ms: u64,
    /// The normalized terminal entry, when the vendor emitted one.
    pub final_result: Option<NormalizedEntry>,
}

/// Factory-produced driver for one agent. Cheap to construct; each
/// [`execute_task`](AgentExecutor::execute_task) call owns its session.
pub struct AgentExecutor {
    kind: AgentKind,
    config: ExecutorConfig,
    control_handler: Option<ControlHandler>,
}

impl std::fmt::Debug for AgentExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentExecutor")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl AgentExecutor {
    pub fn new(kind: AgentKind, config: ExecutorConfig) -> Self {
        Self {
            kind,
            config,
            control_handler: None,
        }
    }

    pub fn agent_kind(&self) -> AgentKind {
        self.kind
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Replaces the default control-request handler (which answers
    /// `can_use_tool` from the auto-approve policy and acks `interrupt`).
    pub fn with_control_handler(mut self, handler: ControlHandler) -> Self {
        self.control_handler = Some(handler);
        self
    }

    /// Spawns the child and wires codec, peer, normalizer, and queue into a
    /// running session.
    pub async fn execute_task(&self, prompt: &str) -> Result<Execution, ExecError> {
        let spec = build_spawn_spec(self.kind, &self.config, prompt)?;
        let mut child = ChildProcess::spawn(&spec)?;
        let process_id = child.pid();
        let task_id = new_task_id(self.kind, process_id);

        let stderr_tail = StderrTail::new();
        let stderr_task = child.take_stderr().map(|stderr| stderr_tail.spawn_drain(stderr));

        let stdin = child
            .take_stdin()
            .ok_or_else(|| ExecError::transport("child stdin unavailable", String::new()))?;
        let stdout = child
            .take_stdout()
            .ok_or_else(|| ExecError::transport("child stdout unavailable", String::new()))?;

        let handler = self
            .control_handler
            .clone()
            .unwrap_or_else(|| default_control_handler(self.config.auto_approve));
        let (peer, event_rx) = ProtocolPeer::start(stdin, stdout, handler, stderr_tail.clone());

        match prompt_delivery(self.kind) {
            PromptDelivery::Stdin => {
                let text = self.config.effective_prompt(prompt);
                match self.kind {
                    AgentKind::Claude => peer.send_record(&user_message_record(&text))?,
                    _ => peer.send_raw_line(&text)?,
                }
            }
            PromptDelivery::Argv => {}
        }

        let session = Session::new(&task_id, process_id, self.kind.as_str(), &spec.work_dir);
        let (entry_tx, entry_rx) = entry_queue();
        let (outcome_tx, outcome_rx) = watch::channel(None);
        let state = Arc::new(Mutex::new(ExecutorState::Running));

        let signaller = child.signaller();
        let interrupted = Arc::new(AtomicBool::new(false));
        let normalizer = Normalizer::for_agent(self.kind).emit_thinking(self.config.emit_thinking);
        tokio::spawn(pump_session(PumpContext {
            child,
            event_rx,
            normalizer,
            session: session.clone(),
            entry_tx,
            stderr_tail,
            state: state.clone(),
            outcome_tx,
            started: Instant::now(),
            interrupted: interrupted.clone(),
            stderr_task,
        }));

        let handle = ExecutionHandle {
            shared: Arc::new(HandleShared {
                kind: self.kind,
                peer,
                signaller,
                state,
                interrupted,
                outcome_rx,
            }),
        };

        Ok(Execution {
            task_id,
            process_id,
            entries: entry_rx,
            handle,
            session,
        })
    }
}

/// A running session: the entry stream plus its control handle.
pub struct Execution {
    pub task_id: String,
    pub process_id: u32,
    pub entries: EntryReceiver<NormalizedEntry>,
    pub handle: ExecutionHandle,
    pub session: Session,
}

impl std::fmt::Debug for Execution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Execution")
            .field("task_id", &self.task_id)
            .field("process_id", &self.process_id)
            .finish_non_exhaustive()
    }
}

struct HandleShared {
    kind: AgentKind,
    peer: ProtocolPeer,
    signaller: ProcessSignaller,
    state: Arc<Mutex<ExecutorState>>,
    interrupted: Arc<AtomicBool>,
    outcome_rx: watch::Receiver<Option<ExecOutcome>>,
}

/// Cloneable control surface for one running session.
#[derive(Clone)]
pub struct ExecutionHandle {
    shared: Arc<HandleShared>,
}

impl ExecutionHandle {
    pub fn state(&self) -> ExecutorState {
        *self.shared.state.lock().expect("executor state poisoned")
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self.state(), ExecutorState::Done | ExecutorState::Failed)
    }

    /// Sends a follow-up user turn. Fails once the session has terminated.
    pub fn send_message(&self, text: &str) -> Result<(), ExecError> {
        if self.is_terminated() || self.shared.peer.is_closed() {
            return Err(ExecError::SessionTerminated);
        }
        match self.shared.kind {
            AgentKind::Claude => self.shared.peer.send_record(&user_message_record(text)),
            _ => self.shared.peer.send_raw_line(text),
        }
    }

    /// Cooperative stop: the `interrupt` control request where the dialect
    /// supports it, SIGINT otherwise. Idempotent; repeated calls are no-ops.
    pub async fn interrupt(&self) {
        if self.shared.interrupted.swap(true, Ordering::SeqCst) {
            return;
        }

        if supports_control_interrupt(self.shared.kind) && !self.shared.peer.is_closed() {
            match self
                .shared
                .peer
                .send_request("interrupt", Value::Null, Some(INTERRUPT_ACK_TIMEOUT))
                .await
            {
                Ok(_) => return,
                Err(e) => debug!("interrupt control request failed, falling back to SIGINT: {e}"),
            }
        }
        self.shared.signaller.signal(ProcessSignal::Interrupt);
    }

    /// Resolves after the child exited and the stream drained.
    pub async fn wait(&self) -> Result<ExecOutcome, ExecError> {
        let mut rx = self.shared.outcome_rx.clone();
        let outcome = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| ExecError::transport("executor pump ended unexpectedly", String::new()))?;
        Ok(outcome.clone().expect("checked by wait_for"))
    }
}

struct PumpContext {
    child: ChildProcess,
    event_rx: mpsc::UnboundedReceiver<exec_events::StreamRecord>,
    normalizer: Normalizer,
    session: Session,
    entry_tx: EntrySender<NormalizedEntry>,
    stderr_tail: StderrTail,
    state: Arc<Mutex<ExecutorState>>,
    outcome_tx: watch::Sender<Option<ExecOutcome>>,
    started: Instant,
    interrupted: Arc<AtomicBool>,
    stderr_task: Option<tokio::task::JoinHandle<()>>,
}

/// Producer loop: the only context that touches the session entry list.
async fn pump_session(ctx: PumpContext) {
    let PumpContext {
        mut child,
        mut event_rx,
        mut normalizer,
        session,
        entry_tx,
        stderr_tail,
        state,
        outcome_tx,
        started,
        interrupted,
        stderr_task,
    } = ctx;

    let signaller = child.signaller();
    let mut final_result: Option<NormalizedEntry> = None;
    let mut abandoned = false;

    'stream: while let Some(record) = event_rx.recv().await {
        for entry in normalizer.normalize(&record) {
            session.push_entry(entry.clone());
            if entry.is_terminal() {
                final_result = Some(entry.clone());
            }
            if entry_tx.push(entry).is_err() {
                // Consumer walked away: tear the child down and stop pumping.
                debug!("entry queue closed by consumer, terminating child");
                abandoned = true;
                signaller.terminate_graceful(TEARDOWN_GRACE);
                break 'stream;
            }
        }
    }

    set_state(&state, ExecutorState::Draining);

    // After abandonment the reader may still be flushing; keep its channel
    // drained so the child cannot block on a full pipe while dying.
    let summary = loop {
        tokio::select! {
            summary = child.wait() => break summary,
            record = event_rx.recv() => {
                if record.is_none() {
                    break child.wait().await;
                }
            }
        }
    };

    // Let the stderr drain finish so error reports carry the full tail.
    if let Some(task) = stderr_task {
        let _ = tokio::time::timeout(Duration::from_secs(1), task).await;
    }

    let outcome = match summary {
        Ok(summary) => {
            let clean = final_result.is_some()
                || abandoned
                || interrupted.load(Ordering::SeqCst)
                || summary.exit_code == Some(0);
            if clean {
                set_state(&state, ExecutorState::Done);
                entry_tx.close();
            } else {
                set_state(&state, ExecutorState::Failing);
                warn!(
                    exit_code = ?summary.exit_code,
                    signal = ?summary.signal,
                    "stream ended without a terminal record"
                );
                entry_tx.close_with_error(ExecError::transport(
                    "stream ended without a terminal record",
                    stderr_tail.snapshot(),
                ));
                set_state(&state, ExecutorState::Failed);
            }
            ExecOutcome {
                exit_code: summary.exit_code,
                signal: summary.signal,
                duration_ms: started.elapsed().as_millis() as u64,
                final_result,
            }
        }
        Err(e) => {
            set_state(&state, ExecutorState::Failing);
            entry_tx.close_with_error(ExecError::transport(
                format!("failed waiting for child: {e}"),
                stderr_tail.snapshot(),
            ));
            set_state(&state, ExecutorState::Failed);
            ExecOutcome {
                exit_code: None,
                signal: None,
                duration_ms: started.elapsed().as_millis() as u64,
                final_result,
            }
        }
    };

    let _ = outcome_tx.send(Some(outcome));
}

fn set_state(state: &Arc<Mutex<ExecutorState>>, next: ExecutorState) {
    let mut guard = state.lock().expect("executor state poisoned");
    // Terminal states stick.
    if !matches!(*guard, ExecutorState::Done | ExecutorState::Failed) {
        *guard = next;
    }
}

/// Default policy: `can_use_tool` follows auto-approve, `interrupt` is
/// acked, hooks allow.
fn default_control_handler(auto_approve: bool) -> ControlHandler {
    Arc::new(move |request| match request.subtype.as_str() {
        "can_use_tool" => {
            let response = if auto_approve {
                PermissionResponse::allow()
            } else {
                PermissionResponse::deny("auto-approve is disabled")
            };
            match serde_json::to_value(response) {
                Ok(value) => ControlOutcome::Ok(value),
                Err(e) => ControlOutcome::Err(e.to_string()),
            }
        }
        "hook_callback" => match serde_json::to_value(HookOutput::allow()) {
            Ok(value) => ControlOutcome::Ok(value),
            Err(e) => ControlOutcome::Err(e.to_string()),
        },
        "interrupt" => ControlOutcome::Ok(json!({})),
        other => ControlOutcome::Err(format!("unsupported control subtype: {other}")),
    })
}

fn user_message_record(text: &str) -> Value {
    json!({
        "type": "user",
        "message": {
            "role": "user",
            "content": [{"type": "text", "text": text}],
        },
    })
}

fn new_task_id(kind: AgentKind, process_id: u32) -> String {
    static SEQUENCE: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis();
    format!("{}-{process_id}-{timestamp}-{seq}", kind.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_ids_are_unique_per_call() {
        let a = new_task_id(AgentKind::Claude, 1);
        let b = new_task_id(AgentKind::Claude, 1);
        assert_ne!(a, b);
        assert!(a.starts_with("claude-1-"));
    }

    #[test]
    fn default_handler_follows_auto_approve() {
        let request = exec_events::ControlRequest::new(1u64, "can_use_tool", json!({"tool": "x"}));

        match default_control_handler(true)(&request) {
            ControlOutcome::Ok(value) => assert_eq!(value["allow"], true),
            other => panic!("unexpected outcome: {other:?}"),
        }
        match default_control_handler(false)(&request) {
            ControlOutcome::Ok(value) => {
                assert_eq!(value["allow"], false);
                assert!(value["reason"].is_string());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
