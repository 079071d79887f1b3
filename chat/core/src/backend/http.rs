//! HTTP Backend Implementation
//!
//! Talks to the assistant web service. Every call is a JSON `POST`; the two
//! streaming endpoints answer with a server-sent event body that is handed
//! back unparsed.
//!
//! The client only sets a connect timeout. Streams have no overall deadline,
//! a long answer is allowed to keep streaming.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::traits::{AudioPoll, ByteStream, ChatBackend};
use crate::config::ClientConfig;
use crate::error::{SideEffectError, TransportError};
use crate::messages::{
    AudioResultRequest, FeedbackRequest, FeedbackResponse, ReferenceRequest, ReferenceResponse,
    SpeechRequest, StreamRequest, TranslationRequest,
};

const QUERY_PATH: &str = "/query";
const TRANSLATE_PATH: &str = "/api/translate";
const REFERENCES_PATH: &str = "/api/pmids";
const FEEDBACK_PATH: &str = "/api/like_answer";
const AUDIO_RESULT_PATH: &str = "/api/tts_result";
const SPEECH_PATH: &str = "/api/tts";

/// Assistant web service client
#[derive(Clone, Debug)]
pub struct HttpBackend {
    /// Service root, without trailing slash
    base_url: String,
    /// HTTP client
    http_client: reqwest::Client,
}

impl HttpBackend {
    /// Create a backend for the service at `base_url`
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Network`] if the HTTP client cannot be built
    /// (for example when no TLS backend is available).
    pub fn new(base_url: impl Into<String>, connect_timeout: Duration) -> Result<Self, TransportError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let http_client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;
        Ok(Self {
            base_url,
            http_client,
        })
    }

    /// Create from the client configuration
    ///
    /// # Errors
    ///
    /// See [`HttpBackend::new`].
    pub fn from_config(config: &ClientConfig) -> Result<Self, TransportError> {
        Self::new(config.base_url.clone(), config.connect_timeout)
    }

    /// Service root
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post<T: Serialize + Sync>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<reqwest::Response, TransportError> {
        let url = self.url(path);
        debug!(url = %url, "POST");
        let response = self.http_client.post(&url).json(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn open<T: Serialize + Sync>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<ByteStream, TransportError> {
        let response = self.post(path, body).await?;
        let stream = response.bytes_stream().map(|chunk| {
            chunk
                .map(|bytes| bytes.to_vec())
                .map_err(|e| TransportError::Stream(e.to_string()))
        });
        Ok(Box::pin(stream))
    }

    async fn post_json<T: Serialize + Sync, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<R, SideEffectError> {
        let response = self.post(path, body).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| SideEffectError::Decode(e.to_string()))
    }
}

#[async_trait]
impl ChatBackend for HttpBackend {
    fn name(&self) -> &str {
        "HTTP"
    }

    async fn open_stream(&self, request: &StreamRequest) -> Result<ByteStream, TransportError> {
        self.open(QUERY_PATH, request).await
    }

    async fn open_translation(
        &self,
        request: &TranslationRequest,
    ) -> Result<ByteStream, TransportError> {
        self.open(TRANSLATE_PATH, request).await
    }

    async fn lookup_references(
        &self,
        request: &ReferenceRequest,
    ) -> Result<Vec<String>, SideEffectError> {
        let response: ReferenceResponse = self.post_json(REFERENCES_PATH, request).await?;
        Ok(response.pmids)
    }

    async fn send_feedback(
        &self,
        request: &FeedbackRequest,
    ) -> Result<FeedbackResponse, SideEffectError> {
        self.post_json(FEEDBACK_PATH, request).await
    }

    async fn poll_audio(&self, request: &AudioResultRequest) -> Result<AudioPoll, SideEffectError> {
        let response = self.post(AUDIO_RESULT_PATH, request).await?;
        if response.status() == StatusCode::ACCEPTED {
            return Ok(AudioPoll::Pending);
        }
        let bytes = response.bytes().await?;
        Ok(AudioPoll::Ready(bytes.to_vec()))
    }

    async fn synthesize_speech(&self, request: &SpeechRequest) -> Result<Vec<u8>, SideEffectError> {
        let response = self.post(SPEECH_PATH, request).await?;
        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_creation() {
        let backend = HttpBackend::new("http://localhost:8000/", Duration::from_secs(5)).unwrap();
        assert_eq!(backend.base_url(), "http://localhost:8000");
        assert_eq!(backend.url(QUERY_PATH), "http://localhost:8000/query");
        assert_eq!(
            backend.url(AUDIO_RESULT_PATH),
            "http://localhost:8000/api/tts_result"
        );
    }

    #[test]
    fn test_from_config() {
        let mut config = ClientConfig::default();
        config.base_url = "https://assistant.example.com/app".to_string();
        let backend = HttpBackend::from_config(&config).unwrap();
        assert_eq!(
            backend.url(REFERENCES_PATH),
            "https://assistant.example.com/app/api/pmids"
        );
    }
}
