//! Turn Accumulator
//!
//! Folds frame payloads into the state of one in-flight turn. The reply text
//! only ever grows by appending deltas in arrival order; the session and turn
//! ids are first-writer-wins.

use tracing::debug;

use crate::frame::FramePayload;
use crate::messages::{SessionId, TurnId};

/// What changed when a payload was applied
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TurnUpdate {
    /// Session id adopted by this payload
    pub new_session_id: Option<SessionId>,
    /// Turn id adopted by this payload
    pub new_turn_id: Option<TurnId>,
    /// Background audio generation announced by this payload
    pub tts_pending: Option<TurnId>,
    /// Whether the reply text grew
    pub text_changed: bool,
}

impl TurnUpdate {
    /// True if the payload changed nothing
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.new_session_id.is_none()
            && self.new_turn_id.is_none()
            && self.tts_pending.is_none()
            && !self.text_changed
    }
}

/// State of the reply being streamed for one turn
#[derive(Clone, Debug, Default)]
pub struct AccumulatedTurn {
    text: String,
    session_id: Option<SessionId>,
    turn_id: Option<TurnId>,
    tts_pending: Option<TurnId>,
    tts_delivered_inline: bool,
    payloads_applied: u32,
    completed: bool,
}

impl AccumulatedTurn {
    /// Start a turn, seeded with the session id already known to the conversation
    #[must_use]
    pub fn new(session_id: Option<SessionId>) -> Self {
        Self {
            session_id,
            ..Default::default()
        }
    }

    /// Apply one payload
    ///
    /// Each recognized field is handled independently; a payload may carry any
    /// subset. Payloads arriving after [`complete`](Self::complete) are ignored.
    pub fn apply(&mut self, payload: &FramePayload) -> TurnUpdate {
        let mut update = TurnUpdate::default();
        if self.completed {
            debug!("Ignoring payload for a completed turn");
            return update;
        }
        self.payloads_applied += 1;

        if let Some(ref id) = payload.session_id {
            if self.session_id.is_none() {
                self.session_id = Some(id.clone());
                update.new_session_id = Some(id.clone());
            }
        }

        if let Some(ref id) = payload.turn_id {
            if self.turn_id.is_none() {
                self.turn_id = Some(id.clone());
                update.new_turn_id = Some(id.clone());
            }
        }

        if let Some(ref id) = payload.tts_pending {
            self.tts_pending = Some(id.clone());
            self.tts_delivered_inline = true;
            update.tts_pending = Some(id.clone());
        }

        if let Some(ref delta) = payload.text_delta {
            update.text_changed = self.append(delta);
        }

        update
    }

    /// Append a text delta; returns whether the text changed
    pub fn append(&mut self, delta: &str) -> bool {
        if self.completed || delta.is_empty() {
            return false;
        }
        self.text.push_str(delta);
        true
    }

    /// Freeze the turn at end-of-stream
    pub fn complete(&mut self) {
        self.completed = true;
    }

    /// Accumulated reply text
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Session id, seeded or first seen on the stream
    #[must_use]
    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    /// Turn id first seen on the stream
    #[must_use]
    pub fn turn_id(&self) -> Option<&TurnId> {
        self.turn_id.as_ref()
    }

    /// Turn id of background audio generation, if announced
    #[must_use]
    pub fn tts_pending(&self) -> Option<&TurnId> {
        self.tts_pending.as_ref()
    }

    /// Whether audio is being delivered through the stream's side channel
    #[must_use]
    pub fn tts_delivered_inline(&self) -> bool {
        self.tts_delivered_inline
    }

    /// Number of payloads folded so far
    #[must_use]
    pub fn payloads_applied(&self) -> u32 {
        self.payloads_applied
    }

    /// Whether end-of-stream has been reached
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.completed
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn payload(json: &str) -> FramePayload {
        FramePayload::parse(json).unwrap()
    }

    #[test]
    fn test_deltas_accumulate_in_order() {
        let mut turn = AccumulatedTurn::new(None);
        for json in [
            r#"{"chunk":"Hel"}"#,
            r#"{"chunk":"lo "}"#,
            r#"{"chunk":" world"}"#,
        ] {
            assert!(turn.apply(&payload(json)).text_changed);
        }
        assert_eq!(turn.text(), "Hello  world");
    }

    #[test]
    fn test_first_session_id_wins() {
        let mut turn = AccumulatedTurn::new(None);
        let first = turn.apply(&payload(r#"{"session_id":"s1"}"#));
        let second = turn.apply(&payload(r#"{"session_id":"s2"}"#));

        assert_eq!(first.new_session_id, Some(SessionId::new("s1")));
        assert!(second.is_noop());
        assert_eq!(turn.session_id(), Some(&SessionId::new("s1")));
    }

    #[test]
    fn test_seeded_session_id_is_kept() {
        let mut turn = AccumulatedTurn::new(Some(SessionId::new("existing")));
        let update = turn.apply(&payload(r#"{"session_id":"fresh"}"#));
        assert!(update.new_session_id.is_none());
        assert_eq!(turn.session_id(), Some(&SessionId::new("existing")));
    }

    #[test]
    fn test_first_turn_id_wins() {
        let mut turn = AccumulatedTurn::new(None);
        turn.apply(&payload(r#"{"question_id":"q1","chunk":"a"}"#));
        let update = turn.apply(&payload(r#"{"question_id":"q2","chunk":"b"}"#));

        assert!(update.new_turn_id.is_none());
        assert!(update.text_changed);
        assert_eq!(turn.turn_id(), Some(&TurnId::new("q1")));
        assert_eq!(turn.text(), "ab");
    }

    #[test]
    fn test_tts_pending_marks_inline_delivery() {
        let mut turn = AccumulatedTurn::new(None);
        assert!(!turn.tts_delivered_inline());

        let update = turn.apply(&payload(r#"{"tts_pending":"q1"}"#));
        assert_eq!(update.tts_pending, Some(TurnId::new("q1")));
        assert!(turn.tts_delivered_inline());
        assert_eq!(turn.tts_pending(), Some(&TurnId::new("q1")));
    }

    #[test]
    fn test_empty_payload_is_consumed_as_noop() {
        let mut turn = AccumulatedTurn::new(None);
        let update = turn.apply(&FramePayload::default());
        assert!(update.is_noop());
        assert_eq!(turn.payloads_applied(), 1);
    }

    #[test]
    fn test_completed_turn_is_frozen() {
        let mut turn = AccumulatedTurn::new(None);
        turn.apply(&payload(r#"{"chunk":"final"}"#));
        turn.complete();

        let update = turn.apply(&payload(r#"{"chunk":" extra","question_id":"late"}"#));
        assert!(update.is_noop());
        assert!(!turn.append("more"));
        assert_eq!(turn.text(), "final");
        assert!(turn.turn_id().is_none());
    }
}
