//! Chat CLI - Terminal Surface for the Assistant
//!
//! Streams assistant replies into the terminal as they arrive. Logs go to
//! stderr so stdout carries only the conversation.
//!
//! # Usage
//!
//! ```bash
//! # Interactive conversation
//! chat-cli
//!
//! # One question
//! chat-cli ask "What is a balanced breakfast?"
//!
//! # Translate
//! chat-cli translate --to en "Une alimentation équilibrée"
//!
//! # Another backend, English, spoken replies saved to ./audio
//! chat-cli --base-url https://assistant.example.com -l en --tts --audio-dir audio
//!
//! # Verbose logging
//! RUST_LOG=debug chat-cli
//! ```
//!
//! # Chat Commands
//!
//! - `/like`, `/dislike`: rate the last reply
//! - `/translate <lang> <text>`: translate text
//! - `/tts on|off`: toggle spoken replies
//! - `/speak`: speak the last reply again
//! - `/quit`: leave

mod audio;
mod renderer;

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use chat_core::{
    load_config, load_config_from_path, AudioSink, ChatBackend, ClientError, ConfigOverrides,
    HttpBackend, TurnController, TurnOutcome,
};

use audio::{DiscardAudioSink, FileAudioSink};
use renderer::TerminalRenderer;

/// Chat CLI - Streaming terminal client for the assistant
#[derive(Parser, Debug)]
#[command(name = "chat-cli")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "CHAT_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Assistant service root URL
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,

    /// Conversation language (two-letter code)
    #[arg(short = 'l', long, value_name = "LANG")]
    language: Option<String>,

    /// Speak replies
    #[arg(long)]
    tts: bool,

    /// Format replies as Markdown (affects the transcript)
    #[arg(long)]
    markdown: bool,

    /// Directory to save reply audio into
    #[arg(long, value_name = "DIR")]
    audio_dir: Option<PathBuf>,

    /// File to append finished replies to
    #[arg(long, value_name = "FILE")]
    transcript: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "CHAT_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interactive conversation (default)
    Chat,
    /// Ask one question and exit
    Ask {
        /// The question
        #[arg(required = true)]
        question: Vec<String>,
    },
    /// Translate text and exit
    Translate {
        /// Target language
        #[arg(short = 't', long, value_name = "LANG")]
        to: String,
        /// Text to translate
        #[arg(required = true)]
        text: Vec<String>,
    },
}

/// One line of chat input
#[derive(Debug, PartialEq, Eq)]
enum Input {
    Empty,
    Quit,
    Feedback { like: bool },
    Translate { target: String, text: String },
    Tts(bool),
    Speak,
    Question(String),
    Unknown(String),
}

fn parse_line(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Input::Question(line.to_string());
    };

    let mut parts = command.splitn(2, char::is_whitespace);
    let name = parts.next().unwrap_or_default();
    let rest = parts.next().unwrap_or_default().trim();
    match name {
        "quit" | "exit" => Input::Quit,
        "like" => Input::Feedback { like: true },
        "dislike" => Input::Feedback { like: false },
        "speak" => Input::Speak,
        "tts" => match rest {
            "on" => Input::Tts(true),
            "off" => Input::Tts(false),
            _ => Input::Unknown(line.to_string()),
        },
        "translate" => match rest.split_once(char::is_whitespace) {
            Some((target, text)) if !text.trim().is_empty() => Input::Translate {
                target: target.to_string(),
                text: text.trim().to_string(),
            },
            _ => Input::Unknown(line.to_string()),
        },
        _ => Input::Unknown(line.to_string()),
    }
}

/// Initialize logging with the specified level
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("chat_cli={level},chat_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Wait for a turn's side effects; returns the reply text if it completed
async fn run(outcome: Result<TurnOutcome, ClientError>) -> Result<Option<String>> {
    match outcome? {
        TurnOutcome::Completed(turn) => {
            turn.side_effects.join().await;
            Ok(Some(turn.text))
        }
        TurnOutcome::Failed { error, .. } => {
            warn!(error = %error, "Turn failed");
            Ok(None)
        }
    }
}

async fn chat<B: ChatBackend + 'static>(controller: &TurnController<B>) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut last_reply = String::new();

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await.context("Failed to read input")? else {
            println!();
            break;
        };

        match parse_line(&line) {
            Input::Empty => {}
            Input::Quit => break,
            Input::Question(question) => {
                if let Some(text) = run(controller.submit_turn(&question).await).await? {
                    last_reply = text;
                }
            }
            Input::Translate { target, text } => {
                run(controller.submit_translation(&text, &target).await).await?;
            }
            Input::Feedback { like } => {
                let turn_id = controller.session().lock().last_turn_id().cloned();
                match turn_id {
                    Some(turn_id) => match controller.send_feedback(turn_id, like).await {
                        Ok(()) => println!("  Thanks for the feedback."),
                        Err(e) => println!("! {e}"),
                    },
                    None => println!("! Nothing to rate yet."),
                }
            }
            Input::Tts(enabled) => {
                controller.set_tts_enabled(enabled);
                println!("  Speech {}.", if enabled { "on" } else { "off" });
            }
            Input::Speak => {
                if let Err(e) = controller.speak(&last_reply).await {
                    println!("! {e}");
                }
            }
            Input::Unknown(command) => println!("! Unknown command: {command}"),
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let mut config = match args.config {
        Some(ref path) => load_config_from_path(Some(path.clone())),
        None => load_config(),
    }
    .context("Failed to load configuration")?;

    let mut overrides = ConfigOverrides::new();
    if let Some(ref url) = args.base_url {
        overrides = overrides.with_base_url(url.clone());
    }
    if let Some(ref language) = args.language {
        overrides = overrides.with_language(language.clone());
    }
    if args.tts {
        overrides = overrides.with_tts_enabled(true);
    }
    if args.markdown {
        overrides = overrides.with_markdown(true);
    }
    overrides
        .apply(&mut config)
        .context("Invalid command-line options")?;

    info!(
        source = %config.source(),
        base_url = %config.base_url,
        language = %config.language,
        "Configuration loaded"
    );

    let backend = HttpBackend::from_config(&config).context("Failed to create HTTP client")?;
    let interactive = matches!(args.command, None | Some(Command::Chat));
    let renderer = Arc::new(
        TerminalRenderer::stdout(interactive, args.transcript.as_deref())
            .context("Failed to open transcript")?,
    );
    let audio: Arc<dyn AudioSink> = match args.audio_dir {
        Some(dir) => Arc::new(FileAudioSink::new(dir).context("Failed to create audio directory")?),
        None => Arc::new(DiscardAudioSink),
    };
    let controller = TurnController::from_config(backend, &config, renderer, audio);

    match args.command.unwrap_or(Command::Chat) {
        Command::Chat => chat(&controller).await,
        Command::Ask { question } => {
            let outcome = controller.submit_turn(&question.join(" ")).await;
            match run(outcome).await? {
                Some(_) => Ok(()),
                None => anyhow::bail!("The assistant could not answer"),
            }
        }
        Command::Translate { to, text } => {
            let outcome = controller.submit_translation(&text.join(" "), &to).await;
            match run(outcome).await? {
                Some(_) => Ok(()),
                None => anyhow::bail!("The translation failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_parse_questions_and_commands() {
        assert_eq!(parse_line("   "), Input::Empty);
        assert_eq!(
            parse_line("  What about fiber? "),
            Input::Question("What about fiber?".to_string())
        );
        assert_eq!(parse_line("/like"), Input::Feedback { like: true });
        assert_eq!(parse_line("/dislike"), Input::Feedback { like: false });
        assert_eq!(parse_line("/quit"), Input::Quit);
        assert_eq!(parse_line("/tts off"), Input::Tts(false));
        assert_eq!(parse_line("/speak"), Input::Speak);
    }

    #[test]
    fn test_parse_translate() {
        assert_eq!(
            parse_line("/translate en  Bonjour tout le monde"),
            Input::Translate {
                target: "en".to_string(),
                text: "Bonjour tout le monde".to_string(),
            }
        );
        assert_eq!(
            parse_line("/translate en"),
            Input::Unknown("/translate en".to_string())
        );
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from(["chat-cli", "--tts", "ask", "hello", "there"]).unwrap();
        assert!(args.tts);
        assert!(matches!(args.command, Some(Command::Ask { ref question }) if question.len() == 2));
    }
}
