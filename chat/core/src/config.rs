//! TOML Configuration File Support
//!
//! Client configuration with a TOML file at
//! `~/.config/chat-client/client.toml`.
//!
//! # Configuration Priority
//!
//! Values are loaded with the following priority (highest first):
//! 1. CLI arguments ([`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [server]
//! base_url = "https://assistant.example.com"
//! connect_timeout_ms = 10000
//!
//! [conversation]
//! language = "en"
//! timezone = "America/Toronto"
//! locale = "en-CA"
//!
//! [speech]
//! enabled = true
//! poll_attempts = 30
//! poll_interval_ms = 500
//!
//! [display]
//! markdown = true
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::i18n;
use crate::session::TurnPreferences;
use crate::side_effects::AudioPollConfig;

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Server section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerToml {
    /// Service root URL
    pub base_url: Option<String>,

    /// Connection timeout in milliseconds
    pub connect_timeout_ms: Option<u64>,
}

/// Conversation section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationToml {
    /// Two-letter language code
    pub language: Option<String>,

    /// IANA timezone name
    pub timezone: Option<String>,

    /// BCP 47 locale
    pub locale: Option<String>,
}

/// Speech section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechToml {
    /// Whether replies are spoken aloud
    pub enabled: Option<bool>,

    /// Audio result polls before giving up
    pub poll_attempts: Option<u32>,

    /// Delay between audio result polls in milliseconds
    pub poll_interval_ms: Option<u64>,
}

/// Display section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayToml {
    /// Render replies as Markdown
    pub markdown: Option<bool>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientToml {
    /// Server section
    pub server: ServerToml,

    /// Conversation section
    pub conversation: ConversationToml,

    /// Speech section
    pub speech: SpeechToml,

    /// Display section
    pub display: DisplayToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Client configuration
///
/// Use [`load_config`] to load with proper priority handling.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Service root URL
    pub base_url: String,

    /// Two-letter language code
    pub language: String,

    /// IANA timezone name
    pub timezone: String,

    /// BCP 47 locale; derived from the language when unset
    pub locale: Option<String>,

    /// Whether replies are spoken aloud
    pub tts_enabled: bool,

    /// Render replies as Markdown
    pub markdown: bool,

    /// HTTP connect timeout
    pub connect_timeout: Duration,

    /// Audio result polling budget
    pub tts_poll: AudioPollConfig,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    source: ConfigSource,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            language: "fr".to_string(),
            timezone: "UTC".to_string(),
            locale: None,
            tts_enabled: false,
            markdown: false,
            connect_timeout: Duration::from_secs(10),
            tts_poll: AudioPollConfig::default(),
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl ClientConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Locale to send, falling back to one derived from the language
    #[must_use]
    pub fn effective_locale(&self) -> String {
        match self.locale.as_deref() {
            Some(locale) if !locale.trim().is_empty() => locale.to_string(),
            _ => i18n::default_locale(&self.language).to_string(),
        }
    }

    /// Request settings for a new conversation
    #[must_use]
    pub fn preferences(&self) -> TurnPreferences {
        TurnPreferences {
            language: self.language.clone(),
            timezone: self.timezone.clone(),
            locale: self.effective_locale(),
            tts_enabled: self.tts_enabled,
        }
    }

    /// Check the values that would otherwise fail later and less clearly
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.base_url.trim();
        if url.is_empty() {
            return Err(ConfigError::ValidationError(
                "base_url must not be empty".to_string(),
            ));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::ValidationError(format!(
                "base_url must start with http:// or https://, got '{url}'"
            )));
        }
        if self.language.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "language must not be empty".to_string(),
            ));
        }
        if self.tts_poll.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "speech.poll_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/chat-client/client.toml` or
/// `~/.config/chat-client/client.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("chat-client").join("client.toml"))
}

/// Load configuration from all sources with proper priority
///
/// CLI arguments are not handled here; apply [`ConfigOverrides`] afterwards.
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or if the
/// result does not validate. A missing config file is not an error.
pub fn load_config() -> Result<ClientConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// If `path` is `None`, only defaults and environment variables are used.
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<ClientConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

fn load_config_with_env(
    path: Option<PathBuf>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ClientConfig, ConfigError> {
    let mut config = ClientConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: ClientToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, env);
    config.validate()?;

    Ok(config)
}

fn apply_toml_config(config: &mut ClientConfig, toml: &ClientToml) {
    // Server
    if let Some(ref url) = toml.server.base_url {
        config.base_url.clone_from(url);
    }
    if let Some(ms) = toml.server.connect_timeout_ms {
        config.connect_timeout = Duration::from_millis(ms);
    }

    // Conversation
    if let Some(ref language) = toml.conversation.language {
        config.language.clone_from(language);
    }
    if let Some(ref timezone) = toml.conversation.timezone {
        config.timezone.clone_from(timezone);
    }
    if toml.conversation.locale.is_some() {
        config.locale.clone_from(&toml.conversation.locale);
    }

    // Speech
    if let Some(enabled) = toml.speech.enabled {
        config.tts_enabled = enabled;
    }
    if let Some(attempts) = toml.speech.poll_attempts {
        config.tts_poll.max_attempts = attempts;
    }
    if let Some(ms) = toml.speech.poll_interval_ms {
        config.tts_poll.interval = Duration::from_millis(ms);
    }

    // Display
    if let Some(markdown) = toml.display.markdown {
        config.markdown = markdown;
    }
}

fn parse_flag(value: &str) -> bool {
    value != "0" && !value.eq_ignore_ascii_case("false")
}

/// Apply environment variable overrides; unparsable numbers are ignored
fn apply_env_config(config: &mut ClientConfig, env: impl Fn(&str) -> Option<String>) {
    if let Some(url) = env("CHAT_BASE_URL") {
        config.base_url = url;
        config.source = ConfigSource::Env;
    }
    if let Some(language) = env("CHAT_LANGUAGE") {
        config.language = language;
        config.source = ConfigSource::Env;
    }
    if let Some(timezone) = env("CHAT_TIMEZONE").or_else(|| env("TZ")) {
        if !timezone.is_empty() {
            config.timezone = timezone;
            config.source = ConfigSource::Env;
        }
    }
    if let Some(locale) = env("CHAT_LOCALE") {
        config.locale = Some(locale);
        config.source = ConfigSource::Env;
    }
    if let Some(enabled) = env("CHAT_TTS") {
        config.tts_enabled = parse_flag(&enabled);
        config.source = ConfigSource::Env;
    }
    if let Some(enabled) = env("CHAT_MARKDOWN") {
        config.markdown = parse_flag(&enabled);
        config.source = ConfigSource::Env;
    }
    if let Some(attempts) = env("CHAT_TTS_POLL_ATTEMPTS") {
        if let Ok(n) = attempts.parse::<u32>() {
            config.tts_poll.max_attempts = n;
            config.source = ConfigSource::Env;
        }
    }
    if let Some(interval) = env("CHAT_TTS_POLL_INTERVAL_MS") {
        if let Ok(ms) = interval.parse::<u64>() {
            config.tts_poll.interval = Duration::from_millis(ms);
            config.source = ConfigSource::Env;
        }
    }
    if let Some(timeout) = env("CHAT_CONNECT_TIMEOUT_MS") {
        if let Ok(ms) = timeout.parse::<u64>() {
            config.connect_timeout = Duration::from_millis(ms);
            config.source = ConfigSource::Env;
        }
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Base URL override
    pub base_url: Option<String>,

    /// Language override
    pub language: Option<String>,

    /// Speech override
    pub tts_enabled: Option<bool>,

    /// Markdown override
    pub markdown: Option<bool>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set base URL override
    #[must_use]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = Some(url);
        self
    }

    /// Set language override
    #[must_use]
    pub fn with_language(mut self, language: String) -> Self {
        self.language = Some(language);
        self
    }

    /// Set speech override
    #[must_use]
    pub fn with_tts_enabled(mut self, enabled: bool) -> Self {
        self.tts_enabled = Some(enabled);
        self
    }

    /// Set markdown override
    #[must_use]
    pub fn with_markdown(mut self, markdown: bool) -> Self {
        self.markdown = Some(markdown);
        self
    }

    /// Apply overrides to a configuration
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] if the result is invalid.
    pub fn apply(&self, config: &mut ClientConfig) -> Result<(), ConfigError> {
        if self.base_url.is_some()
            || self.language.is_some()
            || self.tts_enabled.is_some()
            || self.markdown.is_some()
        {
            config.source = ConfigSource::Cli;
        }

        if let Some(ref url) = self.base_url {
            config.base_url.clone_from(url);
        }
        if let Some(ref language) = self.language {
            config.language.clone_from(language);
        }
        if let Some(enabled) = self.tts_enabled {
            config.tts_enabled = enabled;
        }
        if let Some(markdown) = self.markdown {
            config.markdown = markdown;
        }

        config.validate()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use pretty_assertions::assert_eq;
    use tempfile::NamedTempFile;

    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn write_toml(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();

        assert_eq!(config.base_url, "http://localhost:8000");
        assert_eq!(config.language, "fr");
        assert_eq!(config.timezone, "UTC");
        assert_eq!(config.effective_locale(), "fr-FR");
        assert!(!config.tts_enabled);
        assert!(!config.markdown);
        assert_eq!(config.tts_poll.max_attempts, 30);
        assert_eq!(config.tts_poll.interval, Duration::from_millis(500));
        assert_eq!(config.source(), ConfigSource::Default);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_config_path() {
        if let Some(p) = default_config_path() {
            assert!(p.to_string_lossy().contains("chat-client"));
            assert!(p.to_string_lossy().ends_with("client.toml"));
        }
    }

    #[test]
    fn test_parse_valid_toml() {
        let file = write_toml(
            r#"
[server]
base_url = "https://assistant.example.com"
connect_timeout_ms = 2500

[conversation]
language = "en"
timezone = "America/Toronto"
locale = "en-CA"

[speech]
enabled = true
poll_attempts = 10
poll_interval_ms = 250

[display]
markdown = true
"#,
        );

        let config = load_config_with_env(Some(file.path().to_path_buf()), no_env).unwrap();

        assert_eq!(config.base_url, "https://assistant.example.com");
        assert_eq!(config.connect_timeout, Duration::from_millis(2500));
        assert_eq!(
            config.preferences(),
            TurnPreferences {
                language: "en".to_string(),
                timezone: "America/Toronto".to_string(),
                locale: "en-CA".to_string(),
                tts_enabled: true,
            }
        );
        assert_eq!(config.tts_poll.max_attempts, 10);
        assert_eq!(config.tts_poll.interval, Duration::from_millis(250));
        assert!(config.markdown);
        assert_eq!(config.source(), ConfigSource::File);
        assert_eq!(config.config_file_path, Some(file.path().to_path_buf()));
    }

    #[test]
    fn test_parse_partial_toml() {
        let file = write_toml("[conversation]\nlanguage = \"en\"\n");

        let config = load_config_with_env(Some(file.path().to_path_buf()), no_env).unwrap();

        assert_eq!(config.language, "en");
        assert_eq!(config.effective_locale(), "en-US");
        assert_eq!(config.base_url, "http://localhost:8000");
        assert_eq!(config.tts_poll.max_attempts, 30);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");

        let config = load_config_with_env(Some(path), no_env).unwrap();

        assert_eq!(config.source(), ConfigSource::Default);
        assert!(config.config_file_path.is_none());
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let file = write_toml("[server\nbase_url = ");

        let result = load_config_with_env(Some(file.path().to_path_buf()), no_env);

        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_env_overrides_file() {
        let file = write_toml("[server]\nbase_url = \"http://file:1\"\n[speech]\nenabled = true\n");
        let env: HashMap<&str, &str> = [
            ("CHAT_BASE_URL", "http://env:2"),
            ("CHAT_TTS", "false"),
            ("TZ", "Europe/Paris"),
            ("CHAT_TTS_POLL_ATTEMPTS", "not-a-number"),
            ("CHAT_TTS_POLL_INTERVAL_MS", "100"),
        ]
        .into_iter()
        .collect();

        let config = load_config_with_env(Some(file.path().to_path_buf()), |key| {
            env.get(key).map(ToString::to_string)
        })
        .unwrap();

        assert_eq!(config.base_url, "http://env:2");
        assert!(!config.tts_enabled);
        assert_eq!(config.timezone, "Europe/Paris");
        assert_eq!(config.tts_poll.max_attempts, 30);
        assert_eq!(config.tts_poll.interval, Duration::from_millis(100));
        assert_eq!(config.source(), ConfigSource::Env);
    }

    #[test]
    fn test_chat_timezone_wins_over_tz() {
        let config = load_config_with_env(None, |key| match key {
            "CHAT_TIMEZONE" => Some("Asia/Tokyo".to_string()),
            "TZ" => Some("Europe/Paris".to_string()),
            _ => None,
        })
        .unwrap();

        assert_eq!(config.timezone, "Asia/Tokyo");
    }

    #[test]
    fn test_validation() {
        let mut config = ClientConfig {
            base_url: "ftp://nope".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));

        config.base_url = "https://ok".to_string();
        config.tts_poll.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = ClientConfig::default();

        ConfigOverrides::new()
            .with_language("en".to_string())
            .with_markdown(true)
            .apply(&mut config)
            .unwrap();

        assert_eq!(config.language, "en");
        assert!(config.markdown);
        assert_eq!(config.source(), ConfigSource::Cli);

        let bad = ConfigOverrides::new().with_base_url(String::new());
        assert!(bad.apply(&mut config).is_err());
    }

    #[test]
    fn test_empty_overrides_keep_source() {
        let mut config = ClientConfig::default();
        ConfigOverrides::new().apply(&mut config).unwrap();
        assert_eq!(config.source(), ConfigSource::Default);
    }
}
