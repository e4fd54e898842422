//! Bidirectional control channel riding on the child's NDJSON stream.
//!
//! Three logical channels share one transport: unsolicited events (forwarded
//! to the executor), inbound control requests (answered by the registered
//! handler), and control responses (correlated against the pending table by
//! id). The peer never reorders; it only correlates.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use exec_events::{encode_line, ControlRequest, NdjsonDecoder, StreamRecord};
use serde_json::Value;
use tokio::{
    sync::{mpsc, oneshot},
    time,
};
use tracing::{debug, warn};

use crate::{
    process::{ByteSink, ByteSource},
    stderr_tail::StderrTail,
    ExecError,
};

/// Outcome produced by the control-request handler; the peer wraps it into
/// the response envelope echoing the request id.
#[derive(Debug, Clone)]
pub enum ControlOutcome {
    Ok(Value),
    Err(String),
}

/// Handler for vendor-initiated control requests (`can_use_tool`,
/// `hook_callback`, `interrupt` acks). Runs on the reader task; must not
/// block.
pub type ControlHandler = Arc<dyn Fn(&ControlRequest) -> ControlOutcome + Send + Sync>;

type PendingRequests = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, ExecError>>>>>;

pub struct ProtocolPeer {
    writer: mpsc::UnboundedSender<String>,
    pending: PendingRequests,
    next_id: AtomicU64,
    stderr_tail: StderrTail,
}

impl ProtocolPeer {
    /// Wires the peer onto a child's streams. Returns the peer plus the
    /// channel of non-control records, delivered in arrival order.
    pub fn start(
        stdin: ByteSink,
        stdout: ByteSource,
        handler: ControlHandler,
        stderr_tail: StderrTail,
    ) -> (Self, mpsc::UnboundedReceiver<StreamRecord>) {
        let pending: PendingRequests = Arc::new(Mutex::new(HashMap::new()));
        let (writer_tx, writer_rx) = mpsc::unbounded_channel::<String>();
        let (event_tx, event_rx) = mpsc::unbounded_channel::<StreamRecord>();

        tokio::spawn(writer_task(stdin, writer_rx));
        tokio::spawn(reader_task(
            stdout,
            pending.clone(),
            event_tx,
            handler,
            writer_tx.clone(),
        ));

        (
            Self {
                writer: writer_tx,
                pending,
                next_id: AtomicU64::new(1),
                stderr_tail,
            },
            event_rx,
        )
    }

    /// Sends a control request and awaits the matched response.
    ///
    /// Ids are strictly increasing and never reused, even after settlement.
    /// Settles on the matched response, transport close, or the optional
    /// timeout; on timeout the pending entry is removed so a late response is
    /// logged and dropped by the reader.
    pub async fn send_request(
        &self,
        subtype: &str,
        payload: Value,
        timeout: Option<Duration>,
    ) -> Result<Value, ExecError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = ControlRequest::new(id, subtype, payload);
        let line = encode_line(&request.to_wire())?;

        let (tx, rx) = oneshot::channel();
        {
            let mut guard = self.pending.lock().expect("pending table poisoned");
            guard.insert(id, tx);
        }

        if self.writer.send(line).is_err() {
            self.pending
                .lock()
                .expect("pending table poisoned")
                .remove(&id);
            return Err(self.transport_error("stdin closed"));
        }

        let settled = match timeout {
            Some(deadline) => match time::timeout(deadline, rx).await {
                Ok(settled) => settled,
                Err(_) => {
                    self.pending
                        .lock()
                        .expect("pending table poisoned")
                        .remove(&id);
                    return Err(ExecError::Timeout { elapsed: deadline });
                }
            },
            None => rx.await,
        };

        match settled {
            Ok(outcome) => outcome,
            Err(_) => Err(self.transport_error("transport closed before response")),
        }
    }

    /// Writes a raw record line (prompts, follow-up user turns).
    pub fn send_record(&self, record: &Value) -> Result<(), ExecError> {
        let line = encode_line(record)?;
        self.writer
            .send(line)
            .map_err(|_| self.transport_error("stdin closed"))
    }

    /// Writes a plain text line for dialects that take line input directly.
    pub fn send_raw_line(&self, text: &str) -> Result<(), ExecError> {
        let mut line = text.to_string();
        if !line.ends_with('\n') {
            line.push('\n');
        }
        self.writer
            .send(line)
            .map_err(|_| self.transport_error("stdin closed"))
    }

    pub fn is_closed(&self) -> bool {
        self.writer.is_closed()
    }

    fn transport_error(&self, message: &str) -> ExecError {
        ExecError::transport(message, self.stderr_tail.snapshot())
    }
}

async fn writer_task(mut stdin: ByteSink, mut rx: mpsc::UnboundedReceiver<String>) {
    while let Some(line) = rx.recv().await {
        if stdin.write_all(line.as_bytes()).await.is_err() {
            break;
        }
    }
    let _ = stdin.shutdown().await;
}

async fn reader_task(
    mut stdout: ByteSource,
    pending: PendingRequests,
    event_tx: mpsc::UnboundedSender<StreamRecord>,
    handler: ControlHandler,
    writer: mpsc::UnboundedSender<String>,
) {
    let mut decoder = NdjsonDecoder::new();

    loop {
        match stdout.next_chunk().await {
            Ok(Some(chunk)) => {
                for record in decoder.feed(&chunk) {
                    dispatch(record, &pending, &event_tx, &handler, &writer);
                }
            }
            Ok(None) => {
                if let Some(record) = decoder.finish() {
                    dispatch(record, &pending, &event_tx, &handler, &writer);
                }
                break;
            }
            Err(e) => {
                debug!("stdout read failed: {e}");
                break;
            }
        }
    }

    // Transport is gone: every outstanding request settles with an error and
    // no further reads happen.
    let drained: Vec<_> = {
        let mut guard = pending.lock().expect("pending table poisoned");
        guard.drain().collect()
    };
    for (id, tx) in drained {
        debug!(id, "failing pending request on transport close");
        let _ = tx.send(Err(ExecError::transport("transport closed", String::new())));
    }
}

fn dispatch(
    record: StreamRecord,
    pending: &PendingRequests,
    event_tx: &mpsc::UnboundedSender<StreamRecord>,
    handler: &ControlHandler,
    writer: &mpsc::UnboundedSender<String>,
) {
    match record.record_type() {
        Some("control_response") => dispatch_response(&record, pending),
        Some("control_request") => dispatch_request(&record, handler, writer),
        _ => {
            let _ = event_tx.send(record);
        }
    }
}

fn dispatch_response(record: &StreamRecord, pending: &PendingRequests) {
    let Some(response) = record.as_control_response() else {
        warn!("malformed control response dropped");
        return;
    };
    let Some(id) = parse_request_id(&response.id) else {
        warn!("control response with unparseable id dropped");
        return;
    };
    let sender = {
        let mut guard = pending.lock().expect("pending table poisoned");
        guard.remove(&id)
    };
    let Some(tx) = sender else {
        debug!(id, "late or unknown control response dropped");
        return;
    };
    let outcome = if response.ok {
        Ok(response.result.unwrap_or(Value::Null))
    } else {
        Err(ExecError::ControlRejected {
            message: response.error.unwrap_or_else(|| "unspecified".into()),
        })
    };
    let _ = tx.send(outcome);
}

fn dispatch_request(
    record: &StreamRecord,
    handler: &ControlHandler,
    writer: &mpsc::UnboundedSender<String>,
) {
    let Some(request) = record.as_control_request() else {
        warn!("malformed control request dropped");
        return;
    };
    let envelope = match handler(&request) {
        ControlOutcome::Ok(result) => request.response_ok(result),
        ControlOutcome::Err(message) => request.response_err(message),
    };
    match encode_line(&envelope) {
        Ok(line) => {
            let _ = writer.send(line);
        }
        Err(e) => warn!("failed to encode control response: {e}"),
    }
}

fn parse_request_id(value: &Value) -> Option<u64> {
    if let Some(id) = value.as_u64() {
        return Some(id);
    }
    value.as_str().and_then(|s| s.parse::<u64>().ok())
}
