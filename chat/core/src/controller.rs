//! Turn Controller
//!
//! Runs one turn from submission to cleanup: claims the conversation, opens
//! the stream, folds payloads into the reply as they arrive, renders full-text
//! snapshots, and once the stream ends hands the ids it collected to the
//! side-effect dispatcher.
//!
//! # Cleanup
//!
//! Once a turn has claimed the conversation, a drop guard returns it to idle
//! and re-enables the surface's input. That happens exactly once whatever
//! the exit path, including a transport failure halfway through the stream.
//!
//! # Locking
//!
//! The session lock is only taken for short synchronous updates and is never
//! held across an `.await`.

use std::sync::Arc;

use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::{ByteStream, ChatBackend};
use crate::config::ClientConfig;
use crate::error::{ClientError, SideEffectError, TransportError};
use crate::frame::payload_stream;
use crate::i18n;
use crate::messages::{SessionId, TranslationRequest, TurnId};
use crate::render::{Formatter, Markdown, PlainText, RenderedContent, Renderer, TtsIndicator};
use crate::session::{ConversationSession, SharedSession, TurnState};
use crate::side_effects::{AudioPollConfig, AudioSink, SideEffectDispatcher};
use crate::turn::{AccumulatedTurn, TurnUpdate};

/// Background tasks started when a turn completed
///
/// The controller never waits on these. Callers that need to (tests, a
/// one-shot CLI invocation) can [`join`](Self::join) them.
#[derive(Debug, Default)]
pub struct SideEffects(Vec<JoinHandle<()>>);

impl SideEffects {
    /// Wait for every task to finish
    pub async fn join(self) {
        for handle in self.0 {
            if let Err(e) = handle.await {
                warn!(error = %e, "Side effect task failed");
            }
        }
    }

    /// Number of tasks started
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if nothing was started
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A turn whose stream ended normally
#[derive(Debug)]
pub struct CompletedTurn {
    /// Final reply text
    pub text: String,
    /// Conversation id after this turn
    pub session_id: Option<SessionId>,
    /// Id of this turn, if the backend sent one
    pub turn_id: Option<TurnId>,
    /// Tasks started for references and audio
    pub side_effects: SideEffects,
}

/// How a submitted turn ended
#[derive(Debug)]
pub enum TurnOutcome {
    /// The stream ran to its end
    Completed(CompletedTurn),
    /// The request or the stream failed
    Failed {
        /// What went wrong
        error: TransportError,
        /// Localized message shown in place of the reply
        message: String,
    },
}

impl TurnOutcome {
    /// True for [`TurnOutcome::Completed`]
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

/// What kind of stream a turn consumes
enum TurnKind {
    /// A question: every payload field is honoured
    Question,
    /// A translation: only text deltas are honoured
    Translation { label: String },
}

/// Returns the conversation to idle when dropped
struct TurnGuard<'a> {
    session: &'a SharedSession,
    renderer: &'a dyn Renderer,
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        self.session.lock().release();
        self.renderer.set_busy(false);
    }
}

/// Drives turns for one conversation surface
pub struct TurnController<B: ChatBackend> {
    backend: Arc<B>,
    session: SharedSession,
    renderer: Arc<dyn Renderer>,
    formatter: Arc<dyn Formatter>,
    dispatcher: SideEffectDispatcher<B>,
}

impl<B: ChatBackend + 'static> TurnController<B> {
    /// Create a controller
    pub fn new(
        backend: Arc<B>,
        session: SharedSession,
        renderer: Arc<dyn Renderer>,
        formatter: Arc<dyn Formatter>,
        audio: Arc<dyn AudioSink>,
        poll: AudioPollConfig,
    ) -> Self {
        let dispatcher =
            SideEffectDispatcher::new(Arc::clone(&backend), Arc::clone(&renderer), audio, poll);
        Self {
            backend,
            session,
            renderer,
            formatter,
            dispatcher,
        }
    }

    /// Create a controller for a fresh conversation from the client configuration
    pub fn from_config(
        backend: B,
        config: &ClientConfig,
        renderer: Arc<dyn Renderer>,
        audio: Arc<dyn AudioSink>,
    ) -> Self {
        let formatter: Arc<dyn Formatter> = if config.markdown {
            Arc::new(Markdown)
        } else {
            Arc::new(PlainText)
        };
        Self::new(
            Arc::new(backend),
            ConversationSession::new(config.preferences()).shared(),
            renderer,
            formatter,
            audio,
            config.tts_poll,
        )
    }

    /// Shared conversation state
    #[must_use]
    pub fn session(&self) -> SharedSession {
        Arc::clone(&self.session)
    }

    /// Current turn state
    #[must_use]
    pub fn state(&self) -> TurnState {
        self.session.lock().state()
    }

    /// Backend in use
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Send a question and stream the reply
    ///
    /// Returns once the stream has ended and side effects have been started.
    /// A transport failure is not an error here: the turn is reported as
    /// [`TurnOutcome::Failed`] after the localized message was shown.
    ///
    /// # Errors
    ///
    /// - [`ClientError::EmptyPrompt`] if the prompt is blank
    /// - [`ClientError::Busy`] if another turn is in flight
    pub async fn submit_turn(&self, prompt: &str) -> Result<TurnOutcome, ClientError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(ClientError::EmptyPrompt);
        }

        let request = {
            let mut session = self.session.lock();
            session.begin_turn()?;
            session.build_request(prompt)
        };
        let _guard = self.guard();

        info!(
            backend = self.backend.name(),
            chars = prompt.chars().count(),
            continuing = request.session_id.is_some(),
            "Turn started"
        );
        self.renderer.set_busy(true);
        if request.tts_requested {
            self.renderer.set_tts_indicator(TtsIndicator::Pending);
        }

        let mut turn = AccumulatedTurn::new(request.session_id.clone());
        let result = match self.backend.open_stream(&request).await {
            Ok(bytes) => self.consume(bytes, &mut turn, &TurnKind::Question).await,
            Err(e) => Err(e),
        };

        Ok(match result {
            Ok(()) => {
                TurnOutcome::Completed(self.finalize(turn, &request.language, request.tts_requested))
            }
            Err(error) => self.fail(error, &request.language, request.tts_requested),
        })
    }

    /// Stream a translation of `text` into `target_language`
    ///
    /// Shares the single-flight guard and cleanup with
    /// [`submit_turn`](Self::submit_turn). Only text deltas are read from the
    /// stream; the result does not touch the conversation's ids.
    ///
    /// # Errors
    ///
    /// Same as [`submit_turn`](Self::submit_turn).
    pub async fn submit_translation(
        &self,
        text: &str,
        target_language: &str,
    ) -> Result<TurnOutcome, ClientError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ClientError::EmptyPrompt);
        }

        let (language, tts_enabled) = {
            let mut session = self.session.lock();
            session.begin_turn()?;
            let preferences = session.preferences();
            (preferences.language.clone(), preferences.tts_enabled)
        };
        let _guard = self.guard();

        info!(target_language, chars = text.chars().count(), "Translation started");
        self.renderer.set_busy(true);

        let request = TranslationRequest::new(text, target_language);
        let kind = TurnKind::Translation {
            label: format!("{} ({target_language})", i18n::translation_label(&language)),
        };
        let mut turn = AccumulatedTurn::new(None);
        let result = match self.backend.open_translation(&request).await {
            Ok(bytes) => self.consume(bytes, &mut turn, &kind).await,
            Err(e) => Err(e),
        };

        if let Err(error) = result {
            return Ok(self.fail(error, &language, false));
        }

        self.session.lock().advance(TurnState::Finalizing);
        self.renderer.render(&self.snapshot(turn.text(), true, &kind));
        let mut side_effects = Vec::new();
        if tts_enabled {
            side_effects.push(
                self.dispatcher
                    .spawn_speech(turn.text().to_string(), target_language.to_string()),
            );
        }
        self.session.lock().advance(TurnState::Done);
        info!(chars = turn.text().chars().count(), "Translation completed");

        Ok(TurnOutcome::Completed(CompletedTurn {
            text: turn.text().to_string(),
            session_id: None,
            turn_id: None,
            side_effects: SideEffects(side_effects),
        }))
    }

    /// Record like/dislike feedback for a turn
    ///
    /// # Errors
    ///
    /// Returns the [`SideEffectError`] so the surface can show an alert.
    pub async fn send_feedback(&self, turn_id: TurnId, like: bool) -> Result<(), SideEffectError> {
        self.dispatcher.send_feedback(turn_id, like).await
    }

    /// Speak arbitrary text in the conversation language
    ///
    /// Returns `Ok(false)` if nothing speakable was left after cleanup.
    ///
    /// # Errors
    ///
    /// Returns the synthesis or playback error.
    pub async fn speak(&self, text: &str) -> Result<bool, SideEffectError> {
        let language = self.session.lock().preferences().language.clone();
        self.dispatcher.speak(text, &language).await
    }

    /// Turn text-to-speech on or off for later turns
    pub fn set_tts_enabled(&self, enabled: bool) {
        self.session.lock().set_tts_enabled(enabled);
    }

    fn guard(&self) -> TurnGuard<'_> {
        TurnGuard {
            session: &self.session,
            renderer: self.renderer.as_ref(),
        }
    }

    /// Fold the stream into `turn` until it ends or fails
    async fn consume(
        &self,
        bytes: ByteStream,
        turn: &mut AccumulatedTurn,
        kind: &TurnKind,
    ) -> Result<(), TransportError> {
        self.session.lock().advance(TurnState::Streaming);

        let mut payloads = payload_stream(bytes);
        while let Some(payload) = payloads.next().await {
            let payload = payload?;
            match kind {
                TurnKind::Question => {
                    let update = turn.apply(&payload);
                    self.publish(&update, turn, kind);
                }
                TurnKind::Translation { .. } => {
                    let changed = payload
                        .text_delta
                        .as_deref()
                        .is_some_and(|delta| turn.append(delta));
                    if changed {
                        self.renderer.render(&self.snapshot(turn.text(), false, kind));
                    }
                }
            }
        }

        turn.complete();
        debug!(payloads = turn.payloads_applied(), "Stream complete");
        Ok(())
    }

    /// Push the effects of one payload to the session and the surface
    fn publish(&self, update: &TurnUpdate, turn: &AccumulatedTurn, kind: &TurnKind) {
        if let Some(ref id) = update.new_session_id {
            if self.session.lock().adopt_session_id(id.clone()) {
                info!(session = %id, "Session assigned");
            }
        }
        if let Some(ref id) = update.new_turn_id {
            self.session.lock().record_turn_id(id.clone());
            self.renderer.bind_turn(id);
        }
        if let Some(ref id) = update.tts_pending {
            debug!(turn = %id, "Audio generating in the background");
        }
        if update.text_changed {
            self.renderer.render(&self.snapshot(turn.text(), false, kind));
        }
    }

    fn snapshot(&self, text: &str, is_final: bool, kind: &TurnKind) -> RenderedContent {
        let mut content = self.formatter.snapshot(text, is_final);
        if let TurnKind::Translation { label } = kind {
            content.label = Some(label.clone());
        }
        content
    }

    /// Final render and side-effect handoff for a question turn
    fn finalize(&self, turn: AccumulatedTurn, language: &str, tts_requested: bool) -> CompletedTurn {
        self.session.lock().advance(TurnState::Finalizing);

        self.renderer
            .render(&self.snapshot(turn.text(), true, &TurnKind::Question));
        self.renderer.reveal_actions(turn.turn_id());

        let mut side_effects = Vec::new();
        if let (Some(session_id), Some(turn_id)) = (turn.session_id(), turn.turn_id()) {
            side_effects.push(
                self.dispatcher
                    .spawn_references(session_id.clone(), turn_id.clone()),
            );
        }

        if let Some(pending) = turn.tts_pending() {
            side_effects.push(
                self.dispatcher
                    .spawn_audio_poll(turn.session_id().cloned(), pending.clone()),
            );
        } else if tts_requested && !turn.tts_delivered_inline() {
            side_effects.push(
                self.dispatcher
                    .spawn_speech(turn.text().to_string(), language.to_string()),
            );
        } else {
            self.renderer.set_tts_indicator(TtsIndicator::Idle);
        }

        self.session.lock().advance(TurnState::Done);
        info!(
            chars = turn.text().chars().count(),
            turn = ?turn.turn_id().map(TurnId::as_str),
            side_effects = side_effects.len(),
            "Turn completed"
        );

        CompletedTurn {
            text: turn.text().to_string(),
            session_id: turn.session_id().cloned(),
            turn_id: turn.turn_id().cloned(),
            side_effects: SideEffects(side_effects),
        }
    }

    fn fail(&self, error: TransportError, language: &str, tts_requested: bool) -> TurnOutcome {
        self.session.lock().advance(TurnState::Failed);
        warn!(error = %error, "Turn failed");

        let message = i18n::error_message(language).to_string();
        self.renderer.show_error(&message);
        if tts_requested {
            self.renderer.set_tts_indicator(TtsIndicator::Idle);
        }

        TurnOutcome::Failed { error, message }
    }
}
