//! Terminal rendering surface
//!
//! Snapshots only ever grow within a turn, so the terminal prints just the new
//! suffix of each one. The final snapshot ends the line and, if a transcript
//! file is configured, is appended there in its formatted form.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use chat_core::{RenderedContent, Renderer, TtsIndicator, TurnId};
use parking_lot::Mutex;
use tracing::{debug, warn};

/// Appended to a reply cut off by an error
const INTERRUPTED_MARK: &str = "[interrupted]";

struct RenderState<W> {
    out: W,
    /// Bytes of the current reply already written to `out`
    printed: usize,
    transcript: Option<File>,
}

/// Prints conversation output as plain text
pub struct TerminalRenderer<W: Write + Send = io::Stdout> {
    state: Mutex<RenderState<W>>,
    interactive: bool,
}

impl TerminalRenderer<io::Stdout> {
    /// Render to standard output
    pub fn stdout(interactive: bool, transcript: Option<&Path>) -> io::Result<Self> {
        let transcript = transcript
            .map(|path| OpenOptions::new().create(true).append(true).open(path))
            .transpose()?;
        Ok(Self::with_writer(io::stdout(), interactive, transcript))
    }
}

impl<W: Write + Send> TerminalRenderer<W> {
    fn with_writer(out: W, interactive: bool, transcript: Option<File>) -> Self {
        Self {
            state: Mutex::new(RenderState {
                out,
                printed: 0,
                transcript,
            }),
            interactive,
        }
    }
}

impl<W: Write + Send> RenderState<W> {
    fn end_line(&mut self) {
        if self.printed > 0 {
            let _ = writeln!(self.out);
            self.printed = 0;
        }
    }
}

impl<W: Write + Send> Renderer for TerminalRenderer<W> {
    fn render(&self, content: &RenderedContent) {
        let mut state = self.state.lock();

        if state.printed == 0 {
            if let Some(ref label) = content.label {
                let _ = writeln!(state.out, "[{label}]");
            }
        }

        // A shorter snapshot means a new reply started without a final render.
        if content.text.len() < state.printed {
            state.end_line();
        }
        if let Some(suffix) = content.text.get(state.printed..) {
            let _ = state.out.write_all(suffix.as_bytes());
            state.printed = content.text.len();
        }

        if content.is_final {
            // Keep a blank reply from leaving the prompt on the same line.
            state.printed = state.printed.max(1);
            state.end_line();
            if let Some(ref mut file) = state.transcript {
                if let Err(e) = writeln!(file, "{}\n", content.display) {
                    warn!(error = %e, "Failed to write transcript");
                }
            }
        }
        let _ = state.out.flush();
    }

    /// The terminal cannot erase what it printed, so a partial reply is
    /// marked as cut off before the error.
    fn show_error(&self, message: &str) {
        let mut state = self.state.lock();
        if state.printed > 0 {
            let _ = write!(state.out, " {INTERRUPTED_MARK}");
        }
        state.end_line();
        let _ = writeln!(state.out, "! {message}");
        let _ = state.out.flush();
    }

    fn reveal_actions(&self, turn_id: Option<&TurnId>) {
        if !self.interactive || turn_id.is_none() {
            return;
        }
        let mut state = self.state.lock();
        let _ = writeln!(state.out, "  (/like, /dislike)");
        let _ = state.out.flush();
    }

    fn set_busy(&self, busy: bool) {
        debug!(busy, "Input");
    }

    fn bind_turn(&self, turn_id: &TurnId) {
        debug!(turn = %turn_id, "Reply bound");
    }

    fn show_references(&self, references: &[String]) {
        let mut state = self.state.lock();
        state.end_line();
        let _ = writeln!(state.out, "  PubMed: {}", references.join(", "));
        let _ = state.out.flush();
    }

    fn set_tts_indicator(&self, indicator: TtsIndicator) {
        debug!(?indicator, "Speech");
    }
}
