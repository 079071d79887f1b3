//! Backend Traits
//!
//! The one streaming call that drives a turn, plus the side channels used
//! once it has finished. Implementations handle the provider details (URLs,
//! status codes, body encodings).

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::{SideEffectError, TransportError};
use crate::messages::{
    AudioResultRequest, FeedbackRequest, FeedbackResponse, ReferenceRequest, SpeechRequest,
    StreamRequest, TranslationRequest,
};

/// Response body delivered in arbitrary-sized, in-order pieces
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, TransportError>> + Send>>;

/// One poll of the background audio endpoint
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AudioPoll {
    /// Audio is ready
    Ready(Vec<u8>),
    /// Still generating (HTTP 202)
    Pending,
}

/// Assistant backend
///
/// Implement this trait to point the client at a different service.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Send a question and return the response body as a byte stream
    ///
    /// Resolves once the response status is known: a non-success status is
    /// an error, a success status yields the body stream.
    async fn open_stream(&self, request: &StreamRequest) -> Result<ByteStream, TransportError>;

    /// Send a translation request and return the response body as a byte stream
    async fn open_translation(
        &self,
        request: &TranslationRequest,
    ) -> Result<ByteStream, TransportError>;

    /// Fetch citation ids for a finished turn
    async fn lookup_references(
        &self,
        request: &ReferenceRequest,
    ) -> Result<Vec<String>, SideEffectError>;

    /// Record like/dislike feedback for a turn
    async fn send_feedback(
        &self,
        request: &FeedbackRequest,
    ) -> Result<FeedbackResponse, SideEffectError>;

    /// Poll once for audio generated in the background
    async fn poll_audio(&self, request: &AudioResultRequest) -> Result<AudioPoll, SideEffectError>;

    /// Synthesize speech for the given text
    async fn synthesize_speech(&self, request: &SpeechRequest) -> Result<Vec<u8>, SideEffectError>;
}
