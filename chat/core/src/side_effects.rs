//! Side-Effect Dispatcher
//!
//! Out-of-band work keyed by the ids a finished turn produced: citation
//! lookup, like/dislike feedback, and audio (either polled from background
//! generation or synthesized on demand).
//!
//! These never feed back into the turn. Failures are logged and at most
//! change what the surface shows for that one effect; the reply text on
//! screen is never touched.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::{AudioPoll, ChatBackend};
use crate::error::SideEffectError;
use crate::messages::{
    AudioResultRequest, FeedbackRequest, ReferenceRequest, SessionId, SpeechRequest, TurnId,
};
use crate::render::{Renderer, TtsIndicator};
use crate::speech::clean_for_speech;

/// Plays synthesized audio on the surface
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Play the audio; resolves when playback has finished
    async fn play(&self, audio: Vec<u8>) -> Result<(), SideEffectError>;

    /// Stop whatever is playing
    fn stop(&self) {}
}

/// Retry budget for background audio polling
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AudioPollConfig {
    /// Polls before giving up
    pub max_attempts: u32,
    /// Delay after each "still generating" answer
    pub interval: Duration,
}

impl Default for AudioPollConfig {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            interval: Duration::from_millis(500),
        }
    }
}

/// How background audio polling ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AudioPollOutcome {
    /// Audio arrived and was played
    Played {
        /// Polls it took
        attempts: u32,
    },
    /// Still generating after the whole budget
    Exhausted {
        /// Polls made
        attempts: u32,
    },
    /// The poll or the playback failed
    Failed(SideEffectError),
}

/// Runs side effects for finished turns
pub struct SideEffectDispatcher<B: ChatBackend> {
    backend: Arc<B>,
    renderer: Arc<dyn Renderer>,
    audio: Arc<dyn AudioSink>,
    poll: AudioPollConfig,
}

impl<B: ChatBackend> Clone for SideEffectDispatcher<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            renderer: Arc::clone(&self.renderer),
            audio: Arc::clone(&self.audio),
            poll: self.poll,
        }
    }
}

impl<B: ChatBackend + 'static> SideEffectDispatcher<B> {
    /// Create a dispatcher
    pub fn new(
        backend: Arc<B>,
        renderer: Arc<dyn Renderer>,
        audio: Arc<dyn AudioSink>,
        poll: AudioPollConfig,
    ) -> Self {
        Self {
            backend,
            renderer,
            audio,
            poll,
        }
    }

    /// Polling budget in use
    #[must_use]
    pub fn poll_config(&self) -> AudioPollConfig {
        self.poll
    }

    /// Look up citations in the background
    pub fn spawn_references(&self, session_id: SessionId, turn_id: TurnId) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            this.show_references(session_id, turn_id).await;
        })
    }

    /// Poll for background audio in the background
    pub fn spawn_audio_poll(
        &self,
        session_id: Option<SessionId>,
        turn_id: TurnId,
    ) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            this.poll_audio(session_id, turn_id).await;
        })
    }

    /// Synthesize and play speech in the background
    pub fn spawn_speech(&self, text: String, language: String) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            if let Err(e) = this.speak(&text, &language).await {
                warn!(error = %e, "Speech synthesis failed");
            }
        })
    }

    /// Fetch citations for a turn and show them if there are any
    ///
    /// Returns the citations shown.
    pub async fn show_references(&self, session_id: SessionId, turn_id: TurnId) -> Vec<String> {
        let request = ReferenceRequest {
            session_id,
            question_id: turn_id,
        };
        match self.backend.lookup_references(&request).await {
            Ok(references) if !references.is_empty() => {
                debug!(count = references.len(), turn = %request.question_id, "References");
                self.renderer.show_references(&references);
                references
            }
            Ok(_) => Vec::new(),
            Err(e) => {
                warn!(error = %e, turn = %request.question_id, "Reference lookup failed");
                Vec::new()
            }
        }
    }

    /// Record like/dislike feedback
    ///
    /// # Errors
    ///
    /// Returns [`SideEffectError::Rejected`] if the backend did not record
    /// it, or the transport error if the call failed.
    pub async fn send_feedback(&self, turn_id: TurnId, like: bool) -> Result<(), SideEffectError> {
        let request = FeedbackRequest {
            question_id: turn_id,
            like,
        };
        let response = self.backend.send_feedback(&request).await?;
        if response.is_success() {
            info!(turn = %request.question_id, like, "Feedback recorded");
            Ok(())
        } else {
            Err(SideEffectError::Rejected {
                message: response
                    .message
                    .unwrap_or_else(|| format!("feedback status '{}'", response.status)),
            })
        }
    }

    /// Poll for audio generated in the background, then play it
    ///
    /// Sleeps `interval` after each "still generating" answer, for at most
    /// `max_attempts` polls. The TTS indicator is always back to idle when
    /// this returns, whatever the outcome.
    pub async fn poll_audio(
        &self,
        session_id: Option<SessionId>,
        turn_id: TurnId,
    ) -> AudioPollOutcome {
        self.renderer.set_tts_indicator(TtsIndicator::Pending);
        let request = AudioResultRequest {
            session_id,
            question_id: turn_id,
        };

        let mut attempts = 0;
        let outcome = loop {
            if attempts >= self.poll.max_attempts {
                break AudioPollOutcome::Exhausted { attempts };
            }
            attempts += 1;

            match self.backend.poll_audio(&request).await {
                Ok(AudioPoll::Pending) => {
                    debug!(attempt = attempts, "Audio still generating");
                    tokio::time::sleep(self.poll.interval).await;
                }
                Ok(AudioPoll::Ready(audio)) => {
                    break match self.play(audio).await {
                        Ok(()) => AudioPollOutcome::Played { attempts },
                        Err(e) => AudioPollOutcome::Failed(e),
                    };
                }
                Err(e) => break AudioPollOutcome::Failed(e),
            }
        };

        match &outcome {
            AudioPollOutcome::Played { attempts } => {
                info!(attempts, turn = %request.question_id, "Played background audio");
            }
            AudioPollOutcome::Exhausted { attempts } => {
                warn!(attempts, turn = %request.question_id, "Gave up waiting for audio");
            }
            AudioPollOutcome::Failed(e) => {
                warn!(error = %e, turn = %request.question_id, "Audio poll failed");
            }
        }
        self.renderer.set_tts_indicator(TtsIndicator::Idle);
        outcome
    }

    /// Clean the text, synthesize it and play it
    ///
    /// Returns `Ok(false)` without calling the backend when nothing speakable
    /// is left after cleanup.
    ///
    /// # Errors
    ///
    /// Returns the synthesis or playback error. The TTS indicator is back to
    /// idle either way.
    pub async fn speak(&self, text: &str, language: &str) -> Result<bool, SideEffectError> {
        let text = clean_for_speech(text);
        if text.is_empty() {
            debug!("Nothing to speak");
            self.renderer.set_tts_indicator(TtsIndicator::Idle);
            return Ok(false);
        }

        self.audio.stop();
        self.renderer.set_tts_indicator(TtsIndicator::Pending);
        let request = SpeechRequest {
            text,
            language: language.to_string(),
        };
        debug!(chars = request.text.chars().count(), language, "Synthesizing speech");

        let result = match self.backend.synthesize_speech(&request).await {
            Ok(audio) => self.play(audio).await,
            Err(e) => Err(e),
        };
        self.renderer.set_tts_indicator(TtsIndicator::Idle);
        result.map(|()| true)
    }

    async fn play(&self, audio: Vec<u8>) -> Result<(), SideEffectError> {
        self.audio.stop();
        self.renderer.set_tts_indicator(TtsIndicator::Speaking);
        self.audio.play(audio).await
    }
}
