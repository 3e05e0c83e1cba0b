//! Event stream demultiplexing
//!
//! Turns a raw byte channel, delivered in arbitrarily-sized chunks with no
//! framing guarantee, into an ordered sequence of named JSON events. This
//! layer knows nothing about chat semantics; the terminal event is a
//! concept owned by the reducers above it.
//!
//! Wire format: UTF-8 text records separated by a blank line, each with one
//! `event: <name>` line and one or more `data: <json-fragment>` lines.
//! Multi-line data is newline-joined in line order before JSON parsing.

use serde_json::Value;

/// Record separator on the wire
const RECORD_SEPARATOR: &[u8] = b"\n\n";

/// One demultiplexed wire event, not yet interpreted
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    pub name: String,
    pub data: Value,
}

/// Incremental decoder for the event-stream wire format.
///
/// Feed it chunks as they arrive; complete records are returned in arrival
/// order and the trailing partial record is buffered for the next chunk.
/// The buffer is bytes, not text, so a multi-byte UTF-8 sequence split
/// across chunks reassembles correctly (records are only decoded once the
/// blank-line separator has been seen).
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and drain every record it completes
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<RawEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = find_separator(&self.buffer) {
            let record: Vec<u8> = self.buffer.drain(..pos + RECORD_SEPARATOR.len()).collect();
            let text = String::from_utf8_lossy(&record[..pos]);
            if let Some(event) = parse_record(&text) {
                events.push(event);
            }
        }
        events
    }
}

fn find_separator(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(RECORD_SEPARATOR.len())
        .position(|w| w == RECORD_SEPARATOR)
}

/// Parse one complete record.
///
/// Returns `None` for keep-alive/blank records, records missing an event
/// name or payload, and records whose payload is not valid JSON. A single
/// malformed record must never sink an otherwise-healthy stream.
fn parse_record(record: &str) -> Option<RawEvent> {
    let mut name: Option<&str> = None;
    let mut data_lines: Vec<&str> = Vec::new();

    for line in record.lines() {
        let line = line.trim_end_matches('\r');
        if let Some(rest) = line.strip_prefix("event:") {
            name = Some(rest.trim());
        } else if let Some(rest) = line.strip_prefix("data:") {
            // The space after the colon is optional on the wire
            data_lines.push(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }

    let name = name.filter(|n| !n.is_empty())?;
    if data_lines.is_empty() {
        return None;
    }
    let payload = data_lines.join("\n");
    if payload.trim().is_empty() {
        return None;
    }

    match serde_json::from_str(&payload) {
        Ok(data) => Some(RawEvent {
            name: name.to_string(),
            data,
        }),
        Err(err) => {
            tracing::debug!(event = name, %err, "skipping record with malformed payload");
            None
        }
    }
}
