//! Wire Messages
//!
//! Identifiers and the JSON bodies exchanged with the assistant backend.
//!
//! # Endpoints
//!
//! - `POST /query` - [`StreamRequest`], answered with an event stream
//! - `POST /api/translate` - [`TranslationRequest`], answered with an event stream
//! - `POST /api/pmids` - [`ReferenceRequest`] → [`ReferenceResponse`]
//! - `POST /api/like_answer` - [`FeedbackRequest`] → [`FeedbackResponse`]
//! - `POST /api/tts_result` - [`AudioResultRequest`] → audio bytes, or 202 while generating
//! - `POST /api/tts` - [`SpeechRequest`] → audio bytes

use std::fmt;

use serde::{Deserialize, Serialize};

/// Conversation identifier assigned by the backend
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Wrap a backend-issued id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of one question/answer turn (the backend calls it `question_id`)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TurnId(pub String);

impl TurnId {
    /// Wrap a backend-issued id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TurnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Body of the question request that opens a turn
///
/// Built once per turn and never modified after it is sent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StreamRequest {
    /// The user's question (trimmed, non-empty)
    #[serde(rename = "question")]
    pub prompt: String,
    /// Two-letter language code
    pub language: String,
    /// IANA timezone name
    pub timezone: String,
    /// BCP 47 locale
    pub locale: String,
    /// Conversation to continue; serialized as `null` on the first turn
    pub session_id: Option<SessionId>,
    /// Ask the backend to synthesize audio alongside the text
    #[serde(rename = "tts")]
    pub tts_requested: bool,
}

/// Body of a streamed translation request
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TranslationRequest {
    /// Text to translate
    pub text: String,
    /// Language to translate into
    pub target_language: String,
    /// Source language, `"auto"` to let the backend detect it
    pub source_language: String,
}

impl TranslationRequest {
    /// Create a request with automatic source language detection
    pub fn new(text: impl Into<String>, target_language: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            target_language: target_language.into(),
            source_language: "auto".to_string(),
        }
    }
}

/// Reference (citation) lookup for a finished turn
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReferenceRequest {
    /// Conversation the turn belongs to
    pub session_id: SessionId,
    /// The turn to look up
    pub question_id: TurnId,
}

/// Reference lookup result
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ReferenceResponse {
    /// Citation identifiers, possibly empty
    #[serde(default)]
    pub pmids: Vec<String>,
}

/// Like/dislike feedback on a turn
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FeedbackRequest {
    /// The rated turn
    pub question_id: TurnId,
    /// `true` for like, `false` for dislike
    pub like: bool,
}

/// Feedback acknowledgement
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct FeedbackResponse {
    /// `"success"` when the feedback was recorded
    #[serde(default)]
    pub status: String,
    /// Optional explanation, mostly on failure
    #[serde(default)]
    pub message: Option<String>,
}

impl FeedbackResponse {
    /// Whether the backend recorded the feedback
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

/// Poll for audio generated in the background for a turn
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AudioResultRequest {
    /// Conversation the turn belongs to, if known
    pub session_id: Option<SessionId>,
    /// The turn whose audio is being generated
    pub question_id: TurnId,
}

/// Direct speech synthesis of arbitrary text
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SpeechRequest {
    /// Text to speak, already cleaned of markup
    pub text: String,
    /// Voice language
    pub language: String,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn request(session_id: Option<SessionId>) -> StreamRequest {
        StreamRequest {
            prompt: "hi".to_string(),
            language: "en".to_string(),
            timezone: "Europe/Paris".to_string(),
            locale: "en-US".to_string(),
            session_id,
            tts_requested: false,
        }
    }

    #[test]
    fn test_stream_request_first_turn_sends_null_session() {
        let value = serde_json::to_value(request(None)).unwrap();
        assert_eq!(
            value,
            json!({
                "question": "hi",
                "language": "en",
                "timezone": "Europe/Paris",
                "locale": "en-US",
                "session_id": null,
                "tts": false,
            })
        );
    }

    #[test]
    fn test_stream_request_carries_session() {
        let value = serde_json::to_value(request(Some(SessionId::new("s1")))).unwrap();
        assert_eq!(value["session_id"], json!("s1"));
    }

    #[test]
    fn test_translation_request_defaults_to_auto() {
        let value = serde_json::to_value(TranslationRequest::new("bonjour", "en")).unwrap();
        assert_eq!(
            value,
            json!({"text": "bonjour", "target_language": "en", "source_language": "auto"})
        );
    }

    #[test]
    fn test_feedback_response_status() {
        let ok: FeedbackResponse = serde_json::from_str(r#"{"status":"success"}"#).unwrap();
        assert!(ok.is_success());

        let err: FeedbackResponse =
            serde_json::from_str(r#"{"status":"error","message":"unknown question"}"#).unwrap();
        assert!(!err.is_success());
        assert_eq!(err.message.as_deref(), Some("unknown question"));
    }

    #[test]
    fn test_reference_response_tolerates_missing_list() {
        let refs: ReferenceResponse = serde_json::from_str("{}").unwrap();
        assert!(refs.pmids.is_empty());
    }
}
