//! Fixed user-facing strings
//!
//! French is the fallback for any language without its own table.

/// Message shown in place of the reply when a turn fails
#[must_use]
pub fn error_message(language: &str) -> &'static str {
    match primary_subtag(language).as_str() {
        "en" => "Sorry, something went wrong. Please try again.",
        _ => "Désolé, une erreur s'est produite. Veuillez réessayer.",
    }
}

/// Heading placed above a translation result
#[must_use]
pub fn translation_label(language: &str) -> &'static str {
    match primary_subtag(language).as_str() {
        "en" => "Translation",
        _ => "Traduction",
    }
}

/// Locale to send when none is configured
#[must_use]
pub fn default_locale(language: &str) -> &'static str {
    match primary_subtag(language).as_str() {
        "en" => "en-US",
        _ => "fr-FR",
    }
}

fn primary_subtag(language: &str) -> String {
    language
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}
