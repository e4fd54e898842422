#![forbid(unsafe_code)]
//! Streaming process supervisor for heterogeneous coding-agent CLIs.
//!
//! One programmatic interface over several vendor assistants: the factory
//! picks an executor, the executor spawns the vendor binary, frames its
//! NDJSON stdout, correlates the control channel riding on the same stream,
//! normalizes the dialect into [`exec_events::NormalizedEntry`] values, and
//! hands the caller an async entry stream plus interrupt/wait/follow-up
//! controls.
//!
//! ```rust,no_run
//! use agent_exec::{create_executor, ExecutorConfig};
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let executor = create_executor("claude", ExecutorConfig::new().auto_approve(true))?;
//! let mut execution = executor.execute_task("list the repo layout").await?;
//! while let Some(entry) = execution.entries.next().await {
//!     println!("{:?}", entry?);
//! }
//! let outcome = execution.handle.wait().await?;
//! println!("exit: {:?}", outcome.exit_code);
//! # Ok(()) }
//! ```

mod config;
mod error;
mod executor;
mod process;
mod protocol;
mod queue;
mod registry;
mod session;
mod spawn_spec;
mod stderr_tail;

pub use config::{ExecutorConfig, McpServerConfig};
pub use error::ExecError;
pub use executor::{AgentExecutor, ExecOutcome, Execution, ExecutionHandle, ExecutorState};
pub use process::{
    ByteSink, ByteSource, ChildProcess, ExitSummary, ProcessMode, ProcessSignal, ProcessSignaller,
    SpawnSpec,
};
pub use protocol::{ControlHandler, ControlOutcome, ProtocolPeer};
pub use queue::{entry_queue, EntryReceiver, EntrySender};
pub use registry::{create_executor, descriptor, AgentDescriptor, AVAILABLE_AGENTS};
pub use session::Session;
pub use spawn_spec::{
    build_spawn_spec, default_binary, prompt_delivery, supports_control_interrupt, PromptDelivery,
};
pub use stderr_tail::StderrTail;

pub use exec_events::{AgentKind, NormalizedEntry, ToolAction, Usage};
