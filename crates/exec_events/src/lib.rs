#![forbid(unsafe_code)]
//! Canonical event model and dialect normalizers for coding-agent NDJSON streams.
//!
//! Vendor CLIs (`claude`, `cursor-agent`, `codex`, `copilot`) each speak their own
//! newline-delimited JSON vocabulary on stdout. This crate frames those streams
//! ([`NdjsonDecoder`]), models the control channel riding on them
//! ([`ControlRequest`] / [`ControlResponse`]), and folds every dialect into one
//! [`NormalizedEntry`] shape via a per-vendor [`Normalizer`].
//!
//! Everything here is pure: no I/O, no async, no blocking. The supervisor crate
//! owns processes and streams; this crate only turns bytes into entries.

mod claude;
mod codex;
mod copilot;
mod cursor;
mod entry;
mod ndjson;
mod normalizer;
mod record;

pub use entry::{classify_tool, NormalizedEntry, ToolAction, Usage};
pub use ndjson::{encode_line, EncodeError, NdjsonDecoder};
pub use normalizer::{AgentKind, Normalizer};
pub use record::{
    ControlRequest, ControlResponse, HookDecision, HookOutput, PermissionResponse, StreamRecord,
};
