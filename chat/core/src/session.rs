//! Conversation Session
//!
//! Holds what survives between turns on one conversation surface: the
//! backend-assigned session id, the id of the last turn (for feedback), the
//! user's language settings, and the turn state that keeps the surface to a
//! single request in flight.
//!
//! # Turn States
//!
//! ```text
//! Idle ──► Sending ──► Streaming ──► Finalizing ──► Done ──► Idle
//!             │            │
//!             └────────────┴──► Failed ──► Idle
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ClientError;
use crate::messages::{SessionId, StreamRequest, TurnId};

/// A session shared between the controller and the surface
pub type SharedSession = Arc<Mutex<ConversationSession>>;

/// Lifecycle state of the current turn
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnState {
    /// No turn in flight
    #[default]
    Idle,
    /// Request sent, waiting for the response status
    Sending,
    /// Consuming the event stream
    Streaming,
    /// Stream ended; final render and side-effect handoff
    Finalizing,
    /// Turn completed
    Done,
    /// Turn aborted by a transport error
    Failed,
}

impl TurnState {
    /// Whether a turn occupies the surface in this state
    #[must_use]
    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::Sending | Self::Streaming | Self::Finalizing)
    }

    /// Whether `next` is a legal successor of this state
    #[must_use]
    pub fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Sending)
                | (Self::Sending, Self::Streaming | Self::Failed)
                | (Self::Streaming, Self::Finalizing | Self::Failed)
                | (Self::Finalizing, Self::Done)
        )
    }
}

/// Per-conversation request settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnPreferences {
    /// Two-letter language code
    pub language: String,
    /// IANA timezone name
    pub timezone: String,
    /// BCP 47 locale
    pub locale: String,
    /// Whether replies should be spoken aloud
    pub tts_enabled: bool,
}

impl Default for TurnPreferences {
    fn default() -> Self {
        Self {
            language: "fr".to_string(),
            timezone: "UTC".to_string(),
            locale: "fr-FR".to_string(),
            tts_enabled: false,
        }
    }
}

/// State of one conversation surface
#[derive(Clone, Debug, Default)]
pub struct ConversationSession {
    session_id: Option<SessionId>,
    last_turn_id: Option<TurnId>,
    preferences: TurnPreferences,
    state: TurnState,
    turns_completed: u32,
    turns_failed: u32,
}

impl ConversationSession {
    /// Create a session with no backend id yet
    #[must_use]
    pub fn new(preferences: TurnPreferences) -> Self {
        Self {
            preferences,
            ..Default::default()
        }
    }

    /// Wrap in the shared handle used by the controller
    #[must_use]
    pub fn shared(self) -> SharedSession {
        Arc::new(Mutex::new(self))
    }

    /// Claim the surface for a new turn
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Busy`] if a turn is already in flight.
    pub fn begin_turn(&mut self) -> Result<(), ClientError> {
        if self.state.is_in_flight() {
            return Err(ClientError::Busy);
        }
        self.state = TurnState::Sending;
        Ok(())
    }

    /// Move the current turn forward
    ///
    /// Illegal transitions are logged and ignored.
    pub fn advance(&mut self, next: TurnState) -> bool {
        if !self.state.can_advance_to(next) {
            warn!(from = ?self.state, to = ?next, "Ignoring illegal turn transition");
            return false;
        }
        debug!(from = ?self.state, to = ?next, "Turn state");
        self.state = next;
        match next {
            TurnState::Done => self.turns_completed += 1,
            TurnState::Failed => self.turns_failed += 1,
            _ => {}
        }
        true
    }

    /// Return the surface to idle after a turn, whatever its outcome
    pub fn release(&mut self) {
        debug!(from = ?self.state, "Releasing turn");
        self.state = TurnState::Idle;
    }

    /// Current turn state
    #[must_use]
    pub fn state(&self) -> TurnState {
        self.state
    }

    /// Whether a turn is in flight
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.state.is_in_flight()
    }

    /// Backend session id, once assigned
    #[must_use]
    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    /// Store the session id if none is stored yet; returns whether it was adopted
    pub fn adopt_session_id(&mut self, id: SessionId) -> bool {
        if self.session_id.is_some() {
            return false;
        }
        self.session_id = Some(id);
        true
    }

    /// Id of the most recent turn that reported one
    #[must_use]
    pub fn last_turn_id(&self) -> Option<&TurnId> {
        self.last_turn_id.as_ref()
    }

    /// Remember the id of the current turn
    pub fn record_turn_id(&mut self, id: TurnId) {
        self.last_turn_id = Some(id);
    }

    /// Request settings
    #[must_use]
    pub fn preferences(&self) -> &TurnPreferences {
        &self.preferences
    }

    /// Turn text-to-speech on or off for later turns
    pub fn set_tts_enabled(&mut self, enabled: bool) {
        self.preferences.tts_enabled = enabled;
    }

    /// Switch the conversation language
    pub fn set_language(&mut self, language: impl Into<String>) {
        self.preferences.language = language.into();
    }

    /// Completed turns so far
    #[must_use]
    pub fn turns_completed(&self) -> u32 {
        self.turns_completed
    }

    /// Failed turns so far
    #[must_use]
    pub fn turns_failed(&self) -> u32 {
        self.turns_failed
    }

    /// Build the request for a new turn, continuing this conversation
    #[must_use]
    pub fn build_request(&self, prompt: &str) -> StreamRequest {
        StreamRequest {
            prompt: prompt.to_string(),
            language: self.preferences.language.clone(),
            timezone: self.preferences.timezone.clone(),
            locale: self.preferences.locale.clone(),
            session_id: self.session_id.clone(),
            tts_requested: self.preferences.tts_enabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_flight() {
        let mut session = ConversationSession::default();
        session.begin_turn().unwrap();
        assert!(session.is_busy());
        assert_eq!(session.begin_turn(), Err(ClientError::Busy));

        session.advance(TurnState::Streaming);
        assert_eq!(session.begin_turn(), Err(ClientError::Busy));

        session.advance(TurnState::Finalizing);
        assert_eq!(session.begin_turn(), Err(ClientError::Busy));

        session.advance(TurnState::Done);
        assert!(!session.is_busy());
        session.release();
        assert!(session.begin_turn().is_ok());
    }

    #[test]
    fn test_illegal_transitions_are_ignored() {
        let mut session = ConversationSession::default();
        assert!(!session.advance(TurnState::Streaming));
        assert_eq!(session.state(), TurnState::Idle);

        session.begin_turn().unwrap();
        assert!(!session.advance(TurnState::Done));
        assert!(session.advance(TurnState::Failed));
        assert_eq!(session.turns_failed(), 1);
    }

    #[test]
    fn test_session_id_first_writer_wins() {
        let mut session = ConversationSession::default();
        assert!(session.adopt_session_id(SessionId::new("s1")));
        assert!(!session.adopt_session_id(SessionId::new("s2")));
        assert_eq!(session.session_id(), Some(&SessionId::new("s1")));
    }

    #[test]
    fn test_build_request_continues_conversation() {
        let mut session = ConversationSession::new(TurnPreferences {
            language: "en".to_string(),
            timezone: "America/Toronto".to_string(),
            locale: "en-CA".to_string(),
            tts_enabled: true,
        });

        let first = session.build_request("hi");
        assert!(first.session_id.is_none());
        assert!(first.tts_requested);

        session.adopt_session_id(SessionId::new("s1"));
        let second = session.build_request("again");
        assert_eq!(second.session_id, Some(SessionId::new("s1")));
        assert_eq!(second.locale, "en-CA");
    }
}
