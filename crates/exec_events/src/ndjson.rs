use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::StreamRecord;

/// Failed to serialize an outbound record to a JSON line.
#[derive(Debug, Error)]
#[error("failed to encode NDJSON line: {0}")]
pub struct EncodeError(#[from] serde_json::Error);

/// Serializes a record to a single compact JSON line terminated by `\n`.
pub fn encode_line<T: Serialize>(record: &T) -> Result<String, EncodeError> {
    let mut line = serde_json::to_string(record)?;
    line.push('\n');
    Ok(line)
}

/// Incremental NDJSON framer with partial-line reassembly.
///
/// Chunks may split a line at any byte boundary; the trailing fragment is kept
/// until its terminator arrives. Lines that are blank or fail to parse as JSON
/// are dropped without aborting the stream, since vendors occasionally emit
/// diagnostic text on stdout.
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    buf: Vec<u8>,
    dropped: u64,
}

impl NdjsonDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk and returns every record completed by it, in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamRecord> {
        self.buf.extend_from_slice(chunk);

        let mut records = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buf[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            if let Some(record) = decode_line(&self.buf[start..end], &mut self.dropped) {
                records.push(record);
            }
            start = end + 1;
        }
        self.buf.drain(..start);
        records
    }

    /// Flushes the residual fragment at end-of-stream, if it parses.
    pub fn finish(&mut self) -> Option<StreamRecord> {
        let rest = std::mem::take(&mut self.buf);
        decode_line(&rest, &mut self.dropped)
    }

    /// Number of lines dropped so far (blank lines excluded).
    pub fn dropped_lines(&self) -> u64 {
        self.dropped
    }
}

fn decode_line(raw: &[u8], dropped: &mut u64) -> Option<StreamRecord> {
    let line = std::str::from_utf8(raw).ok()?;
    let line = line.strip_suffix('\r').unwrap_or(line);
    if line.chars().all(|ch| ch.is_whitespace()) {
        return None;
    }
    match serde_json::from_str::<Value>(line) {
        Ok(value) => Some(StreamRecord::new(value)),
        Err(_) => {
            *dropped += 1;
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode_all(input: &[u8], chunk_size: usize) -> Vec<StreamRecord> {
        let mut decoder = NdjsonDecoder::new();
        let mut out = Vec::new();
        for chunk in input.chunks(chunk_size.max(1)) {
            out.extend(decoder.feed(chunk));
        }
        out.extend(decoder.finish());
        out
    }

    #[test]
    fn encode_then_decode_round_trips() {
        let record = json!({"type": "assistant", "n": 3, "nested": {"k": [1, 2]}});
        let line = encode_line(&record).unwrap();
        assert!(line.ends_with('\n'));

        let mut decoder = NdjsonDecoder::new();
        let records = decoder.feed(line.as_bytes());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].value(), &record);
    }

    #[test]
    fn arbitrary_chunk_boundaries_yield_the_same_records() {
        let mut stream = Vec::new();
        for i in 0..5 {
            stream.extend(encode_line(&json!({"type": "event", "seq": i})).unwrap().into_bytes());
        }

        let whole = decode_all(&stream, stream.len());
        for size in [1, 2, 3, 7, 16] {
            assert_eq!(decode_all(&stream, size), whole, "chunk size {size}");
        }
    }

    #[test]
    fn garbage_lines_are_dropped_silently() {
        let input = b"hello\n{\"type\":\"a\"}\n{\nnot json at all\n{\"type\":\"b\"}\n";
        let mut decoder = NdjsonDecoder::new();
        let records = decoder.feed(input);
        let types: Vec<_> = records.iter().filter_map(|r| r.record_type().map(String::from)).collect();
        assert_eq!(types, vec!["a", "b"]);
        assert_eq!(decoder.dropped_lines(), 3);
    }

    #[test]
    fn blank_and_crlf_lines_are_skipped_without_counting() {
        let input = b"\n   \n{\"type\":\"a\"}\r\n";
        let mut decoder = NdjsonDecoder::new();
        let records = decoder.feed(input);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].record_type(), Some("a"));
        assert_eq!(decoder.dropped_lines(), 0);
    }

    #[test]
    fn unterminated_final_line_flushes_on_finish() {
        let mut decoder = NdjsonDecoder::new();
        assert!(decoder.feed(b"{\"type\":\"tail\"").is_empty());
        assert!(decoder.feed(b",\"n\":1}").is_empty());
        let tail = decoder.finish().unwrap();
        assert_eq!(tail.record_type(), Some("tail"));
        assert!(decoder.finish().is_none());
    }
}
