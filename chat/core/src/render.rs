//! Rendering Seam
//!
//! The controller never touches a UI directly. It hands the surface full-text
//! snapshots through [`Renderer`], after passing the text through the
//! [`Formatter`] chosen when the controller was built.

use pulldown_cmark::{html, Options, Parser};
use serde::{Deserialize, Serialize};

use crate::messages::TurnId;

/// Content type hint for rendering
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentType {
    /// Plain text content
    #[default]
    Plain,
    /// HTML produced from Markdown
    Html,
}

/// Snapshot of the reply handed to the renderer
///
/// Always the full text so far, never an increment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedContent {
    /// Raw accumulated text
    pub text: String,
    /// Formatted form of `text`
    pub display: String,
    /// What `display` contains
    pub content_type: ContentType,
    /// Heading to show above the content (translations)
    pub label: Option<String>,
    /// Last render of the turn
    pub is_final: bool,
}

/// State of the text-to-speech control
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TtsIndicator {
    /// Ready; shows the normal icon
    #[default]
    Idle,
    /// Waiting for audio; shows a spinner and is disabled
    Pending,
    /// Audio is playing
    Speaking,
}

/// Text formatting strategy
pub trait Formatter: Send + Sync {
    /// What [`format`](Self::format) produces
    fn content_type(&self) -> ContentType;

    /// Format the full accumulated text
    fn format(&self, text: &str) -> String;

    /// Build a snapshot for the renderer
    fn snapshot(&self, text: &str, is_final: bool) -> RenderedContent {
        RenderedContent {
            text: text.to_string(),
            display: self.format(text),
            content_type: self.content_type(),
            label: None,
            is_final,
        }
    }
}

/// Pass-through formatter
#[derive(Clone, Copy, Debug, Default)]
pub struct PlainText;

impl Formatter for PlainText {
    fn content_type(&self) -> ContentType {
        ContentType::Plain
    }

    fn format(&self, text: &str) -> String {
        text.to_string()
    }
}

/// Markdown to HTML formatter
///
/// Re-rendering the whole text on every delta keeps partially streamed
/// constructs (an unclosed `**`, a half-written list) consistent once they
/// complete.
#[derive(Clone, Copy, Debug, Default)]
pub struct Markdown;

impl Formatter for Markdown {
    fn content_type(&self) -> ContentType {
        ContentType::Html
    }

    fn format(&self, text: &str) -> String {
        let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH;
        let parser = Parser::new_ext(text, options);
        let mut out = String::with_capacity(text.len() + text.len() / 2);
        html::push_html(&mut out, parser);
        out
    }
}

/// Surface that displays a conversation
///
/// Implementations receive copies only; none of these calls can reach back
/// into controller state.
pub trait Renderer: Send + Sync {
    /// Replace the reply area with this snapshot
    fn render(&self, content: &RenderedContent);

    /// Show the localized error message in place of the reply
    ///
    /// Surfaces that cannot take back output, like a terminal, keep the
    /// partial reply and mark it as cut off instead.
    fn show_error(&self, message: &str);

    /// Show the copy/share/feedback controls for the finished turn
    fn reveal_actions(&self, turn_id: Option<&TurnId>);

    /// Input controls enabled (`false`) or disabled (`true`)
    fn set_busy(&self, busy: bool);

    /// Point the action controls at this turn
    fn bind_turn(&self, _turn_id: &TurnId) {}

    /// Show citations below the finished reply
    fn show_references(&self, _references: &[String]) {}

    /// Update the text-to-speech control
    fn set_tts_indicator(&self, _indicator: TtsIndicator) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_identity() {
        let content = PlainText.snapshot("**bold** <b>", false);
        assert_eq!(content.display, "**bold** <b>");
        assert_eq!(content.content_type, ContentType::Plain);
        assert!(!content.is_final);
    }

    #[test]
    fn test_markdown_renders_html() {
        let content = Markdown.snapshot("Eat **more** greens\n\n- kale\n- spinach", true);
        assert_eq!(content.text, "Eat **more** greens\n\n- kale\n- spinach");
        assert!(content.display.contains("<strong>more</strong>"));
        assert!(content.display.contains("<li>kale</li>"));
        assert_eq!(content.content_type, ContentType::Html);
        assert!(content.is_final);
    }

    #[test]
    fn test_markdown_settles_once_emphasis_closes() {
        let partial = Markdown.format("a **b");
        assert!(!partial.contains("<strong>"));
        let complete = Markdown.format("a **b**");
        assert!(complete.contains("<strong>b</strong>"));
    }
}
