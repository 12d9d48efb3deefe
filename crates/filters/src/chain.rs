//! The text filter chain.
//!
//! Stages run in a fixed order and the order matters: a later stage may
//! invalidate the formatting spans an earlier one left intact.
//!
//! 1. blocked sentences (reject)
//! 2. blacklist redaction (reject if nothing but the redaction is left)
//! 3. URL removal / URL blacklist
//! 4. header and footer stripping
//! 5. mention removal
//! 6. custom header and footer insertion
//! 7. empty-result check (reject)

use std::fmt;

use {ferry_channels::MessageEntity, tracing::trace};

use crate::{REDACTION, URL_BLOCKED, URL_REMOVED, rules::CompiledRules};

/// Why a message was not forwarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    /// Matched a blocked sentence; carries the matched text.
    Sentence(String),
    /// Nothing but the redaction token was left.
    FullBlacklist,
    /// No text and no forwardable attachment left.
    Empty,
    /// Image fingerprint is on the deny-list.
    ImageFingerprint(String),
}

impl BlockReason {
    /// Reason with its detail, for notifications.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Sentence(matched) => format!("{self} ('{matched}')"),
            Self::ImageFingerprint(hash) => format!("{self} ({hash})"),
            Self::FullBlacklist | Self::Empty => self.to_string(),
        }
    }
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sentence(_) => "Blocked: sentence",
            Self::FullBlacklist => "Blocked: full blacklist",
            Self::Empty => "Blocked: empty after filtering",
            Self::ImageFingerprint(_) => "Blocked: image fingerprint",
        })
    }
}

/// Text that passed the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filtered {
    pub text: String,
    /// Original formatting, or `None` when a stage changed offsets.
    pub entities: Option<Vec<MessageEntity>>,
    /// URLs were stripped because the route blocks them.
    pub urls_removed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOutcome {
    Pass(Filtered),
    Blocked(BlockReason),
}

impl FilterOutcome {
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked(_))
    }
}

impl CompiledRules {
    /// Run the chain over a message body.
    ///
    /// `has_media` tells the empty-result check whether a forwardable
    /// attachment travels with the text.
    #[must_use]
    pub fn apply(&self, text: &str, entities: &[MessageEntity], has_media: bool) -> FilterOutcome {
        let mut text = text.to_string();
        let mut entities_valid = true;
        let mut urls_removed = false;

        if let Some(re) = &self.blocked_sentences
            && let Some(m) = re.find(&text)
        {
            return FilterOutcome::Blocked(BlockReason::Sentence(m.as_str().to_string()));
        }

        if let Some(re) = &self.blacklist
            && re.is_match(&text)
        {
            let redacted = re.replace_all(&text, REDACTION).into_owned();
            if redacted.trim() == REDACTION {
                return FilterOutcome::Blocked(BlockReason::FullBlacklist);
            }
            text = redacted;
            entities_valid = false;
        }

        if let Some(re) = &self.urls {
            let replaced: String = if self.block_urls {
                re.replace_all(&text, URL_REMOVED).into_owned()
            } else {
                re.replace_all(&text, |caps: &regex::Captures<'_>| {
                    let url = &caps[0];
                    if self.url_substrings.iter().any(|s| url.contains(s.as_str())) {
                        URL_BLOCKED.to_string()
                    } else {
                        url.to_string()
                    }
                })
                .into_owned()
            };
            if replaced != text {
                urls_removed = self.block_urls;
                text = replaced;
                entities_valid = false;
            }
        }

        if self.header_pattern.is_some() || self.footer_pattern.is_some() {
            let stripped = self.strip_header_footer(&text);
            if stripped != text {
                text = stripped;
                entities_valid = false;
            }
        }

        if let (Some(mentions), Some(whitespace)) = (&self.mentions, &self.whitespace) {
            let without = mentions.replace_all(&text, "").into_owned();
            text = whitespace.replace_all(&without, " ").trim().to_string();
            entities_valid = false;
        }

        let inserted = self.insert_custom(&text);
        if inserted != text {
            text = inserted;
            entities_valid = false;
        }

        if text.trim().is_empty() && !has_media {
            return FilterOutcome::Blocked(BlockReason::Empty);
        }

        trace!(entities_valid, urls_removed, "filter chain passed");
        FilterOutcome::Pass(Filtered {
            text,
            entities: (entities_valid && !entities.is_empty()).then(|| entities.to_vec()),
            urls_removed,
        })
    }

    fn strip_header_footer(&self, text: &str) -> String {
        let mut out = text.trim();
        if let Some(header) = &self.header_pattern
            && let Some(rest) = out.strip_prefix(header.as_str())
        {
            out = rest.trim();
        }
        if let Some(footer) = &self.footer_pattern
            && let Some(rest) = out.strip_suffix(footer.as_str())
        {
            out = rest.trim();
        }
        if out.len() == text.trim().len() {
            // Nothing stripped; keep surrounding whitespace as it was.
            return text.to_string();
        }
        out.to_string()
    }

    /// Add the custom header and footer unless already present.
    fn insert_custom(&self, text: &str) -> String {
        if text.is_empty() || (self.custom_header.is_none() && self.custom_footer.is_none()) {
            return text.to_string();
        }
        let mut out = text.trim().to_string();
        if let Some(header) = &self.custom_header
            && !out.starts_with(header.as_str())
        {
            out = format!("{header}\n{out}");
        }
        if let Some(footer) = &self.custom_footer
            && !out.ends_with(footer.as_str())
        {
            out = format!("{out}\n{footer}");
        }
        let out = out.trim().to_string();
        if out == text.trim() {
            return text.to_string();
        }
        out
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::FilterSettings,
        ferry_channels::EntityKind,
        rstest::rstest,
        std::collections::BTreeSet,
    };

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    fn rules(settings: FilterSettings) -> CompiledRules {
        CompiledRules::compile(&settings).unwrap()
    }

    fn pass(outcome: FilterOutcome) -> Filtered {
        match outcome {
            FilterOutcome::Pass(f) => f,
            FilterOutcome::Blocked(reason) => panic!("unexpected block: {reason}"),
        }
    }

    fn bold(offset: usize, length: usize) -> MessageEntity {
        MessageEntity::new(EntityKind::Bold, offset, length)
    }

    #[test]
    fn no_rules_is_identity_and_keeps_entities() {
        let out = pass(CompiledRules::passthrough().apply("hello world", &[bold(0, 5)], false));
        assert_eq!(out.text, "hello world");
        assert_eq!(out.entities, Some(vec![bold(0, 5)]));
        assert!(!out.urls_removed);
    }

    #[rstest]
    #[case("Buy NOW and save", "Buy NOW")]
    #[case("prefix BUY now", "BUY now")]
    fn blocked_sentence_rejects_whole_message(#[case] text: &str, #[case] matched: &str) {
        let r = rules(FilterSettings {
            blocked_sentences: set(&["buy now"]),
            blacklist_words: set(&["save"]),
            ..FilterSettings::default()
        });
        assert_eq!(
            r.apply(text, &[], false),
            FilterOutcome::Blocked(BlockReason::Sentence(matched.to_string()))
        );
    }

    #[test]
    fn blacklist_redacts_every_occurrence_case_insensitively() {
        let r = rules(FilterSettings {
            blacklist_words: set(&["spam", "eggs"]),
            ..FilterSettings::default()
        });
        let out = pass(r.apply("Spam and EGGS and spam", &[bold(0, 4)], false));
        assert_eq!(out.text, "*** and *** and ***");
        assert_eq!(out.entities, None);
    }

    #[test]
    fn blacklist_word_equal_to_text_blocks() {
        let r = rules(FilterSettings {
            blacklist_words: set(&["forbidden"]),
            ..FilterSettings::default()
        });
        let outcome = r.apply(" Forbidden ", &[], false);
        assert_eq!(outcome, FilterOutcome::Blocked(BlockReason::FullBlacklist));
        assert_eq!(
            BlockReason::FullBlacklist.to_string(),
            "Blocked: full blacklist"
        );
    }

    #[test]
    fn blacklist_without_match_keeps_entities() {
        let r = rules(FilterSettings {
            blacklist_words: set(&["spam"]),
            ..FilterSettings::default()
        });
        let out = pass(r.apply("clean text", &[bold(0, 5)], false));
        assert_eq!(out.entities, Some(vec![bold(0, 5)]));
    }

    #[test]
    fn block_urls_replaces_all_links() {
        let r = rules(FilterSettings {
            block_urls: true,
            ..FilterSettings::default()
        });
        let out = pass(r.apply(
            "see https://a.example/x?y=1 and http://b.example",
            &[bold(0, 3)],
            false,
        ));
        assert_eq!(out.text, "see [URL REMOVED] and [URL REMOVED]");
        assert!(out.urls_removed);
        assert_eq!(out.entities, None);
    }

    #[test]
    fn url_blacklist_only_touches_matching_links() {
        let r = rules(FilterSettings {
            blacklisted_url_substrings: set(&["evil"]),
            ..FilterSettings::default()
        });
        let out = pass(r.apply(
            "https://good.example/a https://evil.example/b",
            &[],
            false,
        ));
        assert_eq!(out.text, "https://good.example/a [URL BLOCKED]");
        assert!(!out.urls_removed);
    }

    #[test]
    fn url_blacklist_without_hit_keeps_entities() {
        let r = rules(FilterSettings {
            blacklisted_url_substrings: set(&["evil"]),
            ..FilterSettings::default()
        });
        let out = pass(r.apply("https://good.example", &[bold(0, 5)], false));
        assert_eq!(out.entities, Some(vec![bold(0, 5)]));
    }

    #[rstest]
    #[case("HEADER body FOOTER", "body")]
    #[case("  HEADER\nbody\nFOOTER  ", "body")]
    #[case("body FOOTER", "body")]
    #[case("body HEADER", "body HEADER")]
    fn header_footer_stripping(#[case] input: &str, #[case] expected: &str) {
        let r = rules(FilterSettings {
            header_pattern: Some("HEADER".into()),
            footer_pattern: Some("FOOTER".into()),
            ..FilterSettings::default()
        });
        assert_eq!(pass(r.apply(input, &[], false)).text, expected);
    }

    #[test]
    fn header_strip_miss_keeps_entities() {
        let r = rules(FilterSettings {
            header_pattern: Some("HEADER".into()),
            ..FilterSettings::default()
        });
        let out = pass(r.apply("plain", &[bold(0, 5)], false));
        assert_eq!(out.entities, Some(vec![bold(0, 5)]));
    }

    #[test]
    fn mention_removal_collapses_whitespace() {
        let r = rules(FilterSettings {
            remove_mentions: true,
            ..FilterSettings::default()
        });
        let out = pass(r.apply(
            "hi @alice   and [Bob](tg://user?id=42) there",
            &[bold(0, 2)],
            false,
        ));
        assert_eq!(out.text, "hi and there");
        assert_eq!(out.entities, None);
    }

    #[test]
    fn custom_header_footer_insertion_is_idempotent() {
        let r = rules(FilterSettings {
            custom_header: Some("[news]".into()),
            custom_footer: Some("-- ferry".into()),
            ..FilterSettings::default()
        });
        let once = pass(r.apply("body", &[bold(0, 4)], false));
        assert_eq!(once.text, "[news]\nbody\n-- ferry");
        assert_eq!(once.entities, None);

        let twice = pass(r.apply(&once.text, &[], false));
        assert_eq!(twice.text, once.text);
    }

    #[test]
    fn custom_header_is_not_added_to_empty_caption() {
        let r = rules(FilterSettings {
            custom_header: Some("[news]".into()),
            ..FilterSettings::default()
        });
        let out = pass(r.apply("", &[], true));
        assert_eq!(out.text, "");
    }

    #[rstest]
    #[case(false, true)]
    #[case(true, false)]
    fn empty_after_filtering(#[case] has_media: bool, #[case] blocked: bool) {
        let r = rules(FilterSettings {
            remove_mentions: true,
            ..FilterSettings::default()
        });
        let outcome = r.apply("@only_a_mention", &[], has_media);
        assert_eq!(outcome.is_blocked(), blocked);
        if blocked {
            assert_eq!(outcome, FilterOutcome::Blocked(BlockReason::Empty));
        }
    }

    #[test]
    fn stages_run_in_order() {
        // The blacklist redacts inside the URL before URL removal sees it,
        // then the header is stripped and the custom footer appended.
        let r = rules(FilterSettings {
            blacklist_words: set(&["secret"]),
            block_urls: true,
            header_pattern: Some(">>".into()),
            custom_footer: Some("(relayed)".into()),
            ..FilterSettings::default()
        });
        let out = pass(r.apply(">> secret at https://x.example/secret", &[], false));
        assert_eq!(out.text, "*** at [URL REMOVED]\n(relayed)");
    }

    #[test]
    fn describe_includes_detail() {
        assert_eq!(
            BlockReason::Sentence("buy now".into()).describe(),
            "Blocked: sentence ('buy now')"
        );
        assert_eq!(
            BlockReason::ImageFingerprint("00ff".into()).describe(),
            "Blocked: image fingerprint (00ff)"
        );
    }
}
