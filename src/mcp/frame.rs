// Reassembles JSON messages from arbitrarily split body chunks

use crate::error::{BridgeError, Result};
use serde_json::Value;
use tracing::debug;

/// Turns raw inbound fragments into complete JSON values.
///
/// A fragment may carry several concatenated messages or only part of one.
/// Incomplete trailing input is kept until the next fragment arrives. Syntax
/// errors are reported once and the broken input is discarded. A buffered
/// prefix that never completes is dropped as soon as later input stands on
/// its own, so it cannot hold back the messages after it.
#[derive(Debug)]
pub(crate) struct FrameDecoder {
    pending: Vec<u8>,
    max_pending: usize,
}

impl FrameDecoder {
    pub(crate) fn new(max_pending: usize) -> Self {
        Self {
            pending: Vec::new(),
            max_pending,
        }
    }

    /// Feed one fragment, returning every message it completed (or broke).
    pub(crate) fn push(&mut self, fragment: &[u8]) -> Vec<Result<Value>> {
        if self.pending.is_empty() {
            let decoded = decode(fragment, self.max_pending);
            return self.accept(decoded);
        }

        let alone = decode(fragment, self.max_pending);
        if alone.is_fresh_start() {
            let stale = std::mem::take(&mut self.pending);
            return self.discard_stale(stale.len(), alone);
        }

        let mut joined = std::mem::take(&mut self.pending);
        let stale_len = joined.len();
        joined.extend_from_slice(fragment);
        let joined = decode(&joined, self.max_pending);

        if joined.has_error() && !alone.has_error() {
            return self.discard_stale(stale_len, alone);
        }
        self.accept(joined)
    }

    /// Report input still buffered when the inbound stream ends.
    pub(crate) fn finish(&mut self) -> Option<BridgeError> {
        if self.pending.is_empty() {
            return None;
        }
        let len = self.pending.len();
        self.pending.clear();
        Some(BridgeError::MalformedMessage(format!(
            "stream ended inside a message ({} bytes)",
            len
        )))
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn accept(&mut self, decoded: Decoded) -> Vec<Result<Value>> {
        self.pending = decoded.rest;
        decoded.frames
    }

    fn discard_stale(&mut self, stale_len: usize, decoded: Decoded) -> Vec<Result<Value>> {
        debug!(
            "Discarding {} buffered byte(s) that did not form a message",
            stale_len
        );
        let mut frames = vec![Err(BridgeError::MalformedMessage(format!(
            "incomplete message discarded ({} bytes)",
            stale_len
        )))];
        frames.extend(self.accept(decoded));
        frames
    }
}

/// Frames decoded from one buffer plus its incomplete tail, if any.
struct Decoded {
    frames: Vec<Result<Value>>,
    rest: Vec<u8>,
}

impl Decoded {
    fn has_error(&self) -> bool {
        self.frames.iter().any(Result::is_err)
    }

    /// Whole typed messages and nothing else. A continuation of a buffered
    /// prefix always carries an unmatched closing delimiter, so this input
    /// starts afresh.
    fn is_fresh_start(&self) -> bool {
        self.rest.is_empty()
            && !self.frames.is_empty()
            && self
                .frames
                .iter()
                .all(|frame| matches!(frame, Ok(Value::Object(map)) if map.contains_key("type")))
    }
}

fn decode(buf: &[u8], max_pending: usize) -> Decoded {
    let mut frames = Vec::new();
    let mut rest = Vec::new();
    let mut values = serde_json::Deserializer::from_slice(buf).into_iter::<Value>();

    loop {
        match values.next() {
            Some(Ok(value)) => frames.push(Ok(value)),
            Some(Err(e)) if e.is_eof() => {
                let tail = &buf[values.byte_offset()..];
                if tail.len() > max_pending {
                    frames.push(Err(BridgeError::MalformedMessage(format!(
                        "message exceeds {} bytes",
                        max_pending
                    ))));
                } else {
                    rest = tail.to_vec();
                }
                break;
            }
            Some(Err(e)) => {
                frames.push(Err(BridgeError::malformed(e)));
                break;
            }
            None => break,
        }
    }

    Decoded { frames, rest }
}
