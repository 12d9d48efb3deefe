use {
    regex::{Regex, RegexBuilder},
    std::collections::BTreeSet,
};

use crate::{error::Result, settings::FilterSettings};

const URL_PATTERN: &str = r"https?://(?:[-\w.]|(?:%[\da-fA-F]{2}))+(?:/[^\s]*)?";
const MENTION_PATTERN: &str = r"@[a-zA-Z0-9_]+|\[([^\]]+)\]\(tg://user\?id=\d+\)";

/// Filter settings of one route with every pattern compiled.
///
/// Built whenever the route's settings change and shared read-only by all
/// workers afterwards.
#[derive(Debug, Clone)]
pub struct CompiledRules {
    pub(crate) blocked_sentences: Option<Regex>,
    pub(crate) blacklist: Option<Regex>,
    pub(crate) urls: Option<Regex>,
    pub(crate) block_urls: bool,
    pub(crate) url_substrings: Vec<String>,
    pub(crate) header_pattern: Option<String>,
    pub(crate) footer_pattern: Option<String>,
    pub(crate) mentions: Option<Regex>,
    pub(crate) whitespace: Option<Regex>,
    pub(crate) custom_header: Option<String>,
    pub(crate) custom_footer: Option<String>,
    pub(crate) fingerprints: BTreeSet<String>,
}

impl CompiledRules {
    pub fn compile(settings: &FilterSettings) -> Result<Self> {
        let url_substrings: Vec<String> = settings
            .blacklisted_url_substrings
            .iter()
            .filter(|s| !s.is_empty())
            .cloned()
            .collect();
        let urls = if settings.block_urls || !url_substrings.is_empty() {
            Some(Regex::new(URL_PATTERN)?)
        } else {
            None
        };
        let (mentions, whitespace) = if settings.remove_mentions {
            (Some(Regex::new(MENTION_PATTERN)?), Some(Regex::new(r"\s+")?))
        } else {
            (None, None)
        };

        Ok(Self {
            blocked_sentences: literal_alternation(&settings.blocked_sentences)?,
            blacklist: literal_alternation(&settings.blacklist_words)?,
            urls,
            block_urls: settings.block_urls,
            url_substrings,
            header_pattern: non_empty(&settings.header_pattern),
            footer_pattern: non_empty(&settings.footer_pattern),
            mentions,
            whitespace,
            custom_header: non_empty(&settings.custom_header),
            custom_footer: non_empty(&settings.custom_footer),
            fingerprints: settings
                .blocked_image_fingerprints
                .iter()
                .map(|h| h.to_ascii_lowercase())
                .collect(),
        })
    }

    /// Rules that let everything through unchanged.
    pub fn passthrough() -> Self {
        Self {
            blocked_sentences: None,
            blacklist: None,
            urls: None,
            block_urls: false,
            url_substrings: Vec::new(),
            header_pattern: None,
            footer_pattern: None,
            mentions: None,
            whitespace: None,
            custom_header: None,
            custom_footer: None,
            fingerprints: BTreeSet::new(),
        }
    }

    /// Whether image attachments need to be fingerprinted for this route.
    #[must_use]
    pub fn checks_images(&self) -> bool {
        !self.fingerprints.is_empty()
    }

    /// Exact membership test against the route's deny-list.
    #[must_use]
    pub fn is_blocked_fingerprint(&self, hash: &str) -> bool {
        self.fingerprints.contains(&hash.to_ascii_lowercase())
    }
}

/// One case-insensitive pattern matching any of `words` literally, longest
/// first so overlapping entries redact the widest span.
fn literal_alternation(words: &BTreeSet<String>) -> Result<Option<Regex>> {
    let mut words: Vec<&str> = words
        .iter()
        .map(String::as_str)
        .filter(|w| !w.is_empty())
        .collect();
    if words.is_empty() {
        return Ok(None);
    }
    words.sort_by_key(|w| std::cmp::Reverse(w.chars().count()));
    let pattern = words
        .iter()
        .map(|w| regex::escape(w))
        .collect::<Vec<_>>()
        .join("|");
    let regex = RegexBuilder::new(&pattern).case_insensitive(true).build()?;
    Ok(Some(regex))
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.is_empty()).cloned()
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_settings_compile_to_passthrough() {
        let rules = CompiledRules::compile(&FilterSettings::default()).unwrap();
        assert!(rules.blocked_sentences.is_none());
        assert!(rules.blacklist.is_none());
        assert!(rules.urls.is_none());
        assert!(rules.mentions.is_none());
        assert!(!rules.checks_images());
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        let settings = FilterSettings {
            blocked_sentences: BTreeSet::from(["price (usd)?".to_string()]),
            ..FilterSettings::default()
        };
        let rules = CompiledRules::compile(&settings).unwrap();
        let re = rules.blocked_sentences.unwrap();
        assert!(re.is_match("PRICE (USD)? 10"));
        assert!(!re.is_match("price usd"));
    }

    #[test]
    fn empty_words_are_ignored() {
        let settings = FilterSettings {
            blacklist_words: BTreeSet::from([String::new()]),
            ..FilterSettings::default()
        };
        let rules = CompiledRules::compile(&settings).unwrap();
        assert!(rules.blacklist.is_none());
    }

    #[test]
    fn fingerprint_lookup_ignores_case() {
        let settings = FilterSettings {
            blocked_image_fingerprints: BTreeSet::from(["ABCD00ff11223344".to_string()]),
            ..FilterSettings::default()
        };
        let rules = CompiledRules::compile(&settings).unwrap();
        assert!(rules.checks_images());
        assert!(rules.is_blocked_fingerprint("abcd00FF11223344"));
        assert!(!rules.is_blocked_fingerprint("abcd00ff11223345"));
    }
}
