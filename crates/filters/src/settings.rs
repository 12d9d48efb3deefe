use {
    serde::{Deserialize, Serialize},
    std::collections::BTreeSet,
};

/// Per-route filter configuration as stored in the route table.
///
/// Field names on disk are kept stable so existing route files load as-is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    pub remove_mentions: bool,
    /// Words redacted case-insensitively.
    #[serde(rename = "blacklist")]
    pub blacklist_words: BTreeSet<String>,
    /// Replace every URL with a placeholder.
    pub block_urls: bool,
    /// Replace only URLs containing one of these substrings.
    #[serde(rename = "blacklist_urls")]
    pub blacklisted_url_substrings: BTreeSet<String>,
    /// Literal prefix stripped from incoming text.
    #[serde(deserialize_with = "empty_as_none")]
    pub header_pattern: Option<String>,
    /// Literal suffix stripped from incoming text.
    #[serde(deserialize_with = "empty_as_none")]
    pub footer_pattern: Option<String>,
    /// Line prepended to forwarded text.
    #[serde(deserialize_with = "empty_as_none")]
    pub custom_header: Option<String>,
    /// Line appended to forwarded text.
    #[serde(deserialize_with = "empty_as_none")]
    pub custom_footer: Option<String>,
    /// Any case-insensitive occurrence blocks the whole message.
    pub blocked_sentences: BTreeSet<String>,
    /// Perceptual hashes of images that are never forwarded.
    #[serde(rename = "blocked_image_hashes")]
    pub blocked_image_fingerprints: BTreeSet<String>,
}

/// Route files written by older versions use `""` for "not set".
fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}
