//! Bounded capture of the child's stderr for error reports.
//!
//! Stderr is never parsed as protocol data; only the most recent 64 KiB is
//! retained so a chatty child cannot grow the buffer without bound.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use crate::process::ByteSource;

const MAX_STDERR_BYTES: usize = 64 * 1024;

#[derive(Clone, Default)]
pub struct StderrTail {
    inner: Arc<Mutex<VecDeque<u8>>>,
}

impl StderrTail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_chunk(&self, chunk: &[u8]) {
        let mut buf = self.inner.lock().expect("stderr tail poisoned");
        buf.extend(chunk.iter().copied());
        while buf.len() > MAX_STDERR_BYTES {
            buf.pop_front();
        }
    }

    /// Current tail, lossily decoded.
    pub fn snapshot(&self) -> String {
        let buf = self.inner.lock().expect("stderr tail poisoned");
        String::from_utf8_lossy(&buf.iter().copied().collect::<Vec<u8>>()).into_owned()
    }

    /// Drains a stderr source into this tail until end-of-stream.
    pub fn spawn_drain(&self, mut source: ByteSource) -> tokio::task::JoinHandle<()> {
        let tail = self.clone();
        tokio::spawn(async move {
            while let Ok(Some(chunk)) = source.next_chunk().await {
                tail.push_chunk(&chunk);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_keeps_only_the_most_recent_bytes() {
        let tail = StderrTail::new();
        tail.push_chunk(&vec![b'a'; MAX_STDERR_BYTES]);
        tail.push_chunk(b"zzz");

        let snapshot = tail.snapshot();
        assert_eq!(snapshot.len(), MAX_STDERR_BYTES);
        assert!(snapshot.ends_with("zzz"));
        assert!(snapshot.starts_with('a'));
    }

    #[test]
    fn snapshot_of_empty_tail_is_empty() {
        assert_eq!(StderrTail::new().snapshot(), "");
    }
}
