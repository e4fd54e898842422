use std::{path::PathBuf, time::Duration};

use thiserror::Error;

/// Errors surfaced by the supervisor.
///
/// Per-line decode failures are not represented here: the NDJSON framer drops
/// them silently. A child exiting non-zero is data (`result` entry and
/// [`crate::ExecOutcome`]), not an error.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to spawn agent process (binary={binary:?}): {source}")]
    Spawn {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("transport failed: {message}")]
    Transport {
        message: String,
        /// Tail of the child's stderr (last 64 KiB) for the error report.
        stderr_tail: String,
    },
    #[error(transparent)]
    Encode(#[from] exec_events::EncodeError),
    #[error("control request timed out after {elapsed:?}")]
    Timeout { elapsed: Duration },
    #[error("agent rejected control request: {message}")]
    ControlRejected { message: String },
    #[error("unsupported agent: {name:?}")]
    UnsupportedAgent { name: String },
    #[error("session has terminated")]
    SessionTerminated,
    #[error("entry queue is closed")]
    QueueClosed,
    #[error("pseudo-terminal failure: {0}")]
    Pty(String),
    #[error("working directory is invalid: {0:?}")]
    WorkDir(PathBuf),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ExecError {
    pub(crate) fn transport(message: impl Into<String>, stderr_tail: impl Into<String>) -> Self {
        ExecError::Transport {
            message: message.into(),
            stderr_tail: stderr_tail.into(),
        }
    }
}
