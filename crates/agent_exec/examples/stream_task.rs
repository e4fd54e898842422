//! Streams a task through a locally installed agent CLI.
//!
//! Usage:
//! - `cargo run -p agent_exec --example stream_task -- claude "Summarize this repo"`
//! - The agent binary must be on `PATH` (or set `AGENT_EXEC_BINARY`).

use std::{env, error::Error};

use agent_exec::{create_executor, ExecutorConfig, NormalizedEntry};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let mut args = env::args().skip(1);
    let agent = args.next().ok_or("usage: stream_task <agent> <prompt>")?;
    let prompt: Vec<String> = args.collect();
    if prompt.is_empty() {
        return Err("usage: stream_task <agent> <prompt>".into());
    }

    let mut config = ExecutorConfig::new().auto_approve(true);
    if let Ok(binary) = env::var("AGENT_EXEC_BINARY") {
        config = config.executable(binary);
    }

    let executor = create_executor(&agent, config)?;
    let mut execution = executor.execute_task(&prompt.join(" ")).await?;
    println!(
        "task {} running as pid {}",
        execution.task_id, execution.process_id
    );

    while let Some(entry) = execution.entries.next().await {
        match entry? {
            NormalizedEntry::Assistant { text } => println!("assistant: {text}"),
            NormalizedEntry::ToolUse { tool_name, action, .. } => {
                println!("tool {tool_name}: {action:?}")
            }
            other => println!("{other:?}"),
        }
    }

    let outcome = execution.handle.wait().await?;
    println!(
        "done in {} ms (exit {:?}, {} files changed)",
        outcome.duration_ms,
        outcome.exit_code,
        execution.session.files_changed_count()
    );
    Ok(())
}
