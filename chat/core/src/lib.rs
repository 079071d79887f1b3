//! Chat Core - Headless Streaming-Response Consumer
//!
//! This crate drives one conversation surface of a chat assistant: it sends a
//! question to the backend, consumes the server-sent event stream that comes
//! back, accumulates the assistant's reply and tells a rendering surface what
//! to show. It has no opinion about how things are displayed; a terminal, a
//! web view or a test harness all plug in through the same traits.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          UI Surface                               │
//! │        Renderer (snapshots)          AudioSink (playback)         │
//! └───────────────▲───────────────────────────────▲──────────────────┘
//!                 │                               │
//! ┌───────────────┴───────────────────────────────┴──────────────────┐
//! │                        TurnController                             │
//! │  ┌──────────────┐  ┌──────────────┐  ┌─────────────────────────┐ │
//! │  │ Conversation │  │ Accumulated  │  │  SideEffectDispatcher   │ │
//! │  │   Session    │  │    Turn      │  │ (refs, feedback, audio) │ │
//! │  └──────────────┘  └──────▲───────┘  └────────────┬────────────┘ │
//! │                           │                       │              │
//! │                    FrameDemuxer                   │              │
//! │                           ▲                       │              │
//! └───────────────────────────┼───────────────────────┼──────────────┘
//!                             │                       │
//!                      ChatBackend (HTTP, streaming + side channels)
//! ```
//!
//! # Key Types
//!
//! - [`TurnController`]: runs a turn from submission to cleanup
//! - [`FrameDemuxer`]: turns arbitrarily chunked bytes into frame payloads
//! - [`AccumulatedTurn`]: the growing reply and the ids seen on the stream
//! - [`ConversationSession`]: session continuity and the single-flight guard
//! - [`ChatBackend`]: transport seam, implemented over HTTP by [`HttpBackend`]
//! - [`Renderer`] / [`Formatter`]: how snapshots reach the surface
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use chat_core::{ClientConfig, HttpBackend, TurnController, TurnOutcome};
//!
//! let config = chat_core::load_config()?;
//! let backend = HttpBackend::from_config(&config)?;
//! let controller = TurnController::from_config(backend, &config, renderer, audio_sink);
//!
//! match controller.submit_turn("What is a balanced breakfast?").await? {
//!     TurnOutcome::Completed(turn) => turn.side_effects.join().await,
//!     TurnOutcome::Failed { message, .. } => eprintln!("{message}"),
//! }
//! ```

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod config;
pub mod controller;
pub mod error;
pub mod frame;
pub mod i18n;
pub mod messages;
pub mod render;
pub mod session;
pub mod side_effects;
pub mod speech;
pub mod turn;

pub use backend::{AudioPoll, ByteStream, ChatBackend, HttpBackend};
pub use config::{
    default_config_path, load_config, load_config_from_path, ClientConfig, ClientToml,
    ConfigOverrides, ConfigSource,
};
pub use controller::{CompletedTurn, SideEffects, TurnController, TurnOutcome};
pub use error::{ClientError, ConfigError, FrameParseError, SideEffectError, TransportError};
pub use frame::{payload_stream, DemuxStats, FrameDemuxer, FramePayload, PayloadStream};
pub use messages::{
    AudioResultRequest, FeedbackRequest, FeedbackResponse, ReferenceRequest, ReferenceResponse,
    SessionId, SpeechRequest, StreamRequest, TranslationRequest, TurnId,
};
pub use render::{ContentType, Formatter, Markdown, PlainText, RenderedContent, Renderer, TtsIndicator};
pub use session::{ConversationSession, SharedSession, TurnPreferences, TurnState};
pub use side_effects::{AudioPollConfig, AudioPollOutcome, AudioSink, SideEffectDispatcher};
pub use turn::{AccumulatedTurn, TurnUpdate};
