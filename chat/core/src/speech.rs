//! Speech text cleanup
//!
//! Replies are written for the eye: markdown, inline HTML, citation markers.
//! Before a reply is sent for synthesis those are stripped so the voice reads
//! only prose.

use std::sync::LazyLock;

use regex::Regex;

/// Rewrite rules, applied in order
const RULES: &[(&str, &str)] = &[
    (r"<[^>]*>", ""),
    (r"\*\*(.+?)\*\*", "$1"),
    (r"\*(.+?)\*", "$1"),
    (r"#{1,6}\s", ""),
    (r"(?s)```.*?```", ""),
    (r"`([^`]+)`", "$1"),
    (r"\[([^\]]+)\]\([^)]+\)", "$1"),
    (r"(?i)PMID:\s*\d+", ""),
    (r"\[\d+\]", ""),
    (r"(?im)Références?\s*PubMed\s*:.*$", ""),
    (r"(?im)References?\s*:.*$", ""),
    (r"(?im)Sources?\s*:.*$", ""),
    (r"\n{2,}", ". "),
    (r"\n", " "),
    (r"\s{2,}", " "),
];

static COMPILED: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    RULES
        .iter()
        .filter_map(|(pattern, replacement)| {
            Regex::new(pattern).ok().map(|re| (re, *replacement))
        })
        .collect()
});

/// Strip markup and citations from text meant to be spoken
///
/// Returns an empty string when nothing speakable is left.
#[must_use]
pub fn clean_for_speech(text: &str) -> String {
    let mut out = text.to_string();
    for (re, replacement) in COMPILED.iter() {
        out = re.replace_all(&out, *replacement).into_owned();
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_all_rules_compile() {
        assert_eq!(COMPILED.len(), RULES.len());
    }

    #[test]
    fn test_strips_markdown() {
        assert_eq!(
            clean_for_speech("## Breakfast\n\nEat **oats** and *berries*, see [guide](https://x.y)."),
            "Breakfast. Eat oats and berries, see guide."
        );
    }

    #[test]
    fn test_strips_code_and_html() {
        assert_eq!(
            clean_for_speech("Run `ls`<br>\n```\nrm -rf /\n```\nthen rest."),
            "Run ls. then rest."
        );
    }

    #[test]
    fn test_strips_citations() {
        assert_eq!(
            clean_for_speech("Fiber helps [1] digestion PMID: 123456.\nReferences: [1] Smith 2020"),
            "Fiber helps digestion ."
        );
    }

    #[test]
    fn test_nothing_left() {
        assert_eq!(clean_for_speech("<div></div>  \n"), "");
    }
}
