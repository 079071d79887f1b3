//! Frame Demultiplexer
//!
//! Turns the assistant's event stream into payload objects.
//!
//! # Frame Format
//!
//! ```text
//! data: {"session_id":"s1","question_id":"q1","chunk":"Hel"}\n
//! \n
//! data: {"chunk":"lo"}\n
//! \n
//! : keep-alive\n
//! \n
//! ```
//!
//! Frames are separated by a blank line. Within a frame the first line that
//! starts with `data: ` carries a JSON object; frames without one are
//! keep-alives or comments and are dropped silently. The transport may cut the
//! byte stream anywhere, including inside a separator or a multi-byte UTF-8
//! sequence, so everything after the last separator stays buffered until more
//! bytes arrive. An unterminated frame at end-of-stream is discarded.

use std::collections::VecDeque;

use futures::stream::{self, BoxStream, StreamExt};
use serde_json::{Map, Value};
use tracing::{debug, trace, warn};

use crate::backend::ByteStream;
use crate::error::{FrameParseError, TransportError};
use crate::messages::{SessionId, TurnId};

/// Separator between frames
pub const FRAME_SEPARATOR: &str = "\n\n";

/// Prefix of the payload line inside a frame
pub const DATA_MARKER: &str = "data: ";

/// Fields recognized in a frame payload
///
/// All fields are optional. Unknown fields, fields of the wrong JSON type and
/// empty strings are treated as absent.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FramePayload {
    /// `session_id`: conversation id assigned by the backend
    pub session_id: Option<SessionId>,
    /// `question_id`: id of the current turn
    pub turn_id: Option<TurnId>,
    /// `chunk`: text to append to the reply
    pub text_delta: Option<String>,
    /// `tts_pending`: audio for this turn id is being generated in the background
    pub tts_pending: Option<TurnId>,
}

impl FramePayload {
    /// Decode the JSON text that follows the data marker
    ///
    /// # Errors
    ///
    /// Returns [`FrameParseError`] if the text is not a JSON object.
    pub fn parse(json: &str) -> Result<Self, FrameParseError> {
        let value: Value =
            serde_json::from_str(json).map_err(|e| FrameParseError::InvalidJson(e.to_string()))?;
        let object = value.as_object().ok_or(FrameParseError::NotAnObject)?;

        Ok(Self {
            session_id: non_empty_str(object, "session_id").map(SessionId::new),
            turn_id: non_empty_str(object, "question_id").map(TurnId::new),
            text_delta: non_empty_str(object, "chunk").map(str::to_string),
            tts_pending: non_empty_str(object, "tts_pending").map(TurnId::new),
        })
    }

    /// True if none of the recognized fields were present
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.session_id.is_none()
            && self.turn_id.is_none()
            && self.text_delta.is_none()
            && self.tts_pending.is_none()
    }
}

fn non_empty_str<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    object
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Find the JSON text of the first non-empty `data: ` line in a frame
#[must_use]
pub fn extract_payload_line(frame: &str) -> Option<&str> {
    frame.lines().find_map(|line| {
        line.strip_prefix(DATA_MARKER)
            .filter(|rest| !rest.is_empty())
    })
}

/// Counters for one demultiplexed stream
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DemuxStats {
    /// Non-blank frames seen
    pub frames: u64,
    /// Frames that produced a payload
    pub payloads: u64,
    /// Frames without a payload line (keep-alives, comments)
    pub ignored: u64,
    /// Frames whose payload failed to parse
    pub malformed: u64,
}

/// Incremental frame parser with a single pending buffer
#[derive(Debug, Default)]
pub struct FrameDemuxer {
    /// Text after the last separator seen so far
    buffer: String,
    /// Trailing bytes of an incomplete UTF-8 sequence
    utf8_carry: Vec<u8>,
    stats: DemuxStats,
}

impl FrameDemuxer {
    /// Create an empty demultiplexer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw transport bytes, returning the payloads completed by them
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Vec<FramePayload> {
        let text = self.decode_utf8(bytes);
        self.push_str(&text)
    }

    /// Feed already-decoded text, returning the payloads completed by it
    pub fn push_str(&mut self, fragment: &str) -> Vec<FramePayload> {
        if fragment.is_empty() {
            return Vec::new();
        }
        // Only the new text, plus one byte that may open a split separator,
        // can complete a frame.
        let scan_from = self.buffer.len().saturating_sub(FRAME_SEPARATOR.len() - 1);
        self.buffer.push_str(fragment);
        let tail = &self.buffer.as_bytes()[scan_from..];
        if !tail
            .windows(FRAME_SEPARATOR.len())
            .any(|w| w == FRAME_SEPARATOR.as_bytes())
        {
            return Vec::new();
        }

        let buffer = std::mem::take(&mut self.buffer);
        let mut frames: Vec<&str> = buffer.split(FRAME_SEPARATOR).collect();
        self.buffer = frames.pop().unwrap_or_default().to_string();

        frames
            .into_iter()
            .filter_map(|frame| self.decode_frame(frame))
            .collect()
    }

    /// Text still waiting for a separator
    #[must_use]
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    /// Counters so far
    #[must_use]
    pub fn stats(&self) -> DemuxStats {
        self.stats
    }

    /// End of stream: drop any unterminated frame
    ///
    /// Returns the number of bytes discarded.
    pub fn finish(&mut self) -> usize {
        let dropped = self.buffer.len() + self.utf8_carry.len();
        if dropped > 0 {
            debug!(bytes = dropped, "Discarding unterminated trailing frame");
        }
        self.buffer.clear();
        self.utf8_carry.clear();
        dropped
    }

    fn decode_frame(&mut self, frame: &str) -> Option<FramePayload> {
        if frame.trim().is_empty() {
            return None;
        }
        self.stats.frames += 1;

        let Some(json) = extract_payload_line(frame) else {
            self.stats.ignored += 1;
            trace!(frame = %frame, "Frame without payload line");
            return None;
        };

        match FramePayload::parse(json) {
            Ok(payload) => {
                self.stats.payloads += 1;
                trace!(?payload, "Frame payload");
                Some(payload)
            }
            Err(e) => {
                self.stats.malformed += 1;
                warn!(error = %e, payload = %json, "Skipping malformed frame");
                None
            }
        }
    }

    /// Streaming UTF-8 decode: an incomplete sequence at the end is held back
    /// for the next call, invalid bytes become U+FFFD.
    fn decode_utf8(&mut self, bytes: &[u8]) -> String {
        let mut input = std::mem::take(&mut self.utf8_carry);
        input.extend_from_slice(bytes);

        let mut out = String::with_capacity(input.len());
        let mut rest: &[u8] = &input;
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            self.utf8_carry = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        out
    }
}

/// Ordered stream of payloads; a transport error ends it
pub type PayloadStream = BoxStream<'static, Result<FramePayload, TransportError>>;

struct PayloadState {
    bytes: ByteStream,
    demuxer: FrameDemuxer,
    ready: VecDeque<FramePayload>,
    done: bool,
}

/// Adapt a transport byte stream into a stream of frame payloads
///
/// Payloads are yielded in arrival order. A transport error is yielded once
/// and ends the stream; normal end-of-stream discards any dangling partial
/// frame.
#[must_use]
pub fn payload_stream(bytes: ByteStream) -> PayloadStream {
    let state = PayloadState {
        bytes,
        demuxer: FrameDemuxer::new(),
        ready: VecDeque::new(),
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(payload) = state.ready.pop_front() {
                return Some((Ok(payload), state));
            }
            if state.done {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    let payloads = state.demuxer.push_bytes(&chunk);
                    state.ready.extend(payloads);
                }
                Some(Err(e)) => {
                    state.done = true;
                    return Some((Err(e), state));
                }
                None => {
                    state.done = true;
                    state.demuxer.finish();
                    debug!(stats = ?state.demuxer.stats(), "Event stream ended");
                }
            }
        }
    })
    .boxed()
}
