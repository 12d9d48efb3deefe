//! Configuration validation.
//!
//! Detects unknown or misspelled fields in a config file and flags values
//! the relay cannot run with.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use crate::{
    loader::{apply_env_overrides, find_config_file, parse_config_value, read_substituted},
    schema::FerryConfig,
};

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "syntax", "unknown-field", "type-error", "value", "file-ref"
    pub category: &'static str,
    /// Dotted path, e.g. "relay.num_workers"
    pub path: String,
    pub message: String,
}

impl Diagnostic {
    fn new(
        severity: Severity,
        category: &'static str,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category,
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() {
            write!(f, "{} [{}] {}", self.severity, self.category, self.message)
        } else {
            write!(
                f,
                "{} [{}] {}: {}",
                self.severity, self.category, self.path, self.message
            )
        }
    }
}

/// Result of validating a configuration file.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<PathBuf>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

/// Expected shape of the config tree.
enum KnownKeys {
    Struct(HashMap<&'static str, KnownKeys>),
    Leaf,
}

fn section(keys: &[&'static str]) -> KnownKeys {
    KnownKeys::Struct(keys.iter().map(|k| (*k, KnownKeys::Leaf)).collect())
}

/// Mirror of every field in `schema.rs`.
fn build_schema_map() -> KnownKeys {
    KnownKeys::Struct(HashMap::from([
        (
            "relay",
            section(&[
                "max_retries",
                "retry_delay_secs",
                "max_queue_size",
                "max_mapping_history",
                "num_workers",
                "forward_delay_ms",
                "chunk_delay_ms",
                "max_message_length",
                "idle_poll_ms",
                "reply_search_prefix_chars",
                "reply_search_limit",
            ]),
        ),
        (
            "watchdog",
            section(&[
                "queue_inactivity_secs",
                "queue_sweep_secs",
                "route_inactivity_secs",
                "route_sweep_secs",
                "digest_interval_secs",
                "connection_poll_secs",
            ]),
        ),
        (
            "notifications",
            section(&["notify_chat_id", "monitor_chat_id"]),
        ),
        ("storage", section(&["routes_path"])),
        (
            "telegram",
            section(&["token", "poll_timeout_secs", "recent_message_cache"]),
        ),
    ]))
}

/// Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_chars.len()]
}

/// Closest candidate within `max_distance` edits, if any.
fn suggest<'a>(needle: &str, candidates: &[&'a str], max_distance: usize) -> Option<&'a str> {
    candidates
        .iter()
        .map(|c| (*c, levenshtein(needle, c)))
        .filter(|(_, d)| *d > 0 && *d <= max_distance)
        .min_by_key(|(_, d)| *d)
        .map(|(c, _)| c)
}

/// Validate a config file at `path`, or the discovered one if `None`.
///
/// `require_token` adds an error when no Telegram token is available from
/// the file or the environment (needed by `ferry run`).
#[must_use]
pub fn validate(path: Option<&Path>, require_token: bool) -> ValidationResult {
    let config_path = path.map(Path::to_path_buf).or_else(find_config_file);

    let Some(actual_path) = config_path else {
        let mut config = FerryConfig::default();
        apply_env_overrides(&mut config);
        let mut diagnostics = vec![Diagnostic::new(
            Severity::Info,
            "file-ref",
            "",
            "no config file found; using defaults",
        )];
        diagnostics.extend(validate_config(&config, require_token));
        return ValidationResult {
            diagnostics,
            config_path: None,
        };
    };

    let raw = match read_substituted(&actual_path) {
        Ok(raw) => raw,
        Err(e) => {
            return ValidationResult {
                diagnostics: vec![Diagnostic::new(
                    Severity::Error,
                    "syntax",
                    "",
                    e.to_string(),
                )],
                config_path: Some(actual_path),
            };
        },
    };

    let mut result = validate_str(&raw, &actual_path, require_token);
    result.config_path = Some(actual_path);
    result
}

/// Validate config text; the extension of `path` selects the format.
#[must_use]
pub fn validate_str(raw: &str, path: &Path, require_token: bool) -> ValidationResult {
    let mut diagnostics = Vec::new();

    let tree = match parse_config_value(raw, path) {
        Ok(v) => v,
        Err(e) => {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "syntax",
                "",
                e.to_string(),
            ));
            return ValidationResult {
                diagnostics,
                config_path: None,
            };
        },
    };

    check_unknown_fields(&tree, &build_schema_map(), "", &mut diagnostics);

    match serde_json::from_value::<FerryConfig>(tree) {
        Ok(mut config) => {
            apply_env_overrides(&mut config);
            diagnostics.extend(validate_config(&config, require_token));
        },
        Err(e) => diagnostics.push(Diagnostic::new(
            Severity::Error,
            "type-error",
            "",
            format!("type error: {e}"),
        )),
    }

    ValidationResult {
        diagnostics,
        config_path: None,
    }
}

fn check_unknown_fields(
    value: &serde_json::Value,
    schema: &KnownKeys,
    prefix: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let (serde_json::Value::Object(table), KnownKeys::Struct(fields)) = (value, schema) else {
        return;
    };
    let known: Vec<&str> = fields.keys().copied().collect();
    for (key, child) in table {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        if let Some(child_schema) = fields.get(key.as_str()) {
            check_unknown_fields(child, child_schema, &path, diagnostics);
            continue;
        }
        let message = match suggest(key, &known, 3) {
            Some(s) => format!("unknown field (did you mean \"{s}\"?)"),
            None => "unknown field".to_string(),
        };
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "unknown-field",
            path,
            message,
        ));
    }
}

/// Semantic checks on a parsed config.
#[must_use]
pub fn validate_config(config: &FerryConfig, require_token: bool) -> Vec<Diagnostic> {
    let mut out = Vec::new();
    let mut must_be_positive = |path: &str, value: u64| {
        if value == 0 {
            out.push(Diagnostic::new(
                Severity::Error,
                "value",
                path,
                "must be greater than zero",
            ));
        }
    };

    let relay = &config.relay;
    must_be_positive("relay.num_workers", relay.num_workers as u64);
    must_be_positive("relay.max_queue_size", relay.max_queue_size as u64);
    must_be_positive("relay.max_retries", u64::from(relay.max_retries));
    must_be_positive("relay.max_message_length", relay.max_message_length as u64);
    must_be_positive("relay.idle_poll_ms", relay.idle_poll_ms);

    let watchdog = &config.watchdog;
    must_be_positive("watchdog.queue_sweep_secs", watchdog.queue_sweep_secs);
    must_be_positive("watchdog.route_sweep_secs", watchdog.route_sweep_secs);
    must_be_positive("watchdog.digest_interval_secs", watchdog.digest_interval_secs);
    must_be_positive("watchdog.connection_poll_secs", watchdog.connection_poll_secs);

    if relay.max_mapping_history == 0 {
        out.push(Diagnostic::new(
            Severity::Warning,
            "value",
            "relay.max_mapping_history",
            "no mappings are kept; edits and deletions will not be mirrored",
        ));
    }

    if config.notifications.notify_chat().is_none() {
        out.push(Diagnostic::new(
            Severity::Warning,
            "value",
            "notifications",
            "no notify or monitor chat configured; alerts are only logged",
        ));
    }

    if require_token && !config.telegram.has_token() {
        out.push(Diagnostic::new(
            Severity::Error,
            "value",
            "telegram.token",
            format!(
                "no bot token configured (set telegram.token or {})",
                crate::loader::TOKEN_ENV
            ),
        ));
    }

    out
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn toml(raw: &str) -> ValidationResult {
        validate_str(raw, Path::new("ferry.toml"), false)
    }

    #[test]
    fn defaults_only_warn_about_notifications() {
        let result = toml("");
        assert!(!result.has_errors(), "{:?}", result.diagnostics);
        assert_eq!(result.count(Severity::Warning), 1);
    }

    #[test]
    fn misspelled_field_gets_suggestion() {
        let result = toml("[relay]\nnum_wrkers = 2\n");
        let d = result
            .diagnostics
            .iter()
            .find(|d| d.category == "unknown-field")
            .unwrap();
        assert_eq!(d.path, "relay.num_wrkers");
        assert!(d.message.contains("num_workers"));
    }

    #[test]
    fn unknown_section_is_reported() {
        let result = toml("[server]\nport = 1\n");
        assert!(
            result
                .diagnostics
                .iter()
                .any(|d| d.category == "unknown-field" && d.path == "server")
        );
    }

    #[test]
    fn zero_workers_is_an_error() {
        let result = toml("[relay]\nnum_workers = 0\n");
        assert!(result.has_errors());
        assert!(
            result
                .diagnostics
                .iter()
                .any(|d| d.path == "relay.num_workers")
        );
    }

    #[test]
    fn wrong_type_is_reported() {
        let result = toml("[relay]\nnum_workers = \"three\"\n");
        assert!(
            result
                .diagnostics
                .iter()
                .any(|d| d.category == "type-error")
        );
    }

    #[test]
    fn syntax_error_stops_early() {
        let result = toml("[relay\n");
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].category, "syntax");
    }

    #[test]
    fn yaml_is_checked_too() {
        let result = validate_str(
            "watchdog:\n  queue_swep_secs: 3\n",
            Path::new("ferry.yaml"),
            false,
        );
        assert!(
            result
                .diagnostics
                .iter()
                .any(|d| d.path == "watchdog.queue_swep_secs"
                    && d.message.contains("queue_sweep_secs"))
        );
    }

    #[test]
    fn missing_token_only_matters_when_required() {
        let config = FerryConfig::default();
        let relaxed = validate_config(&config, false);
        assert!(relaxed.iter().all(|d| d.path != "telegram.token"));
        // FERRY_TELEGRAM_TOKEN is not consulted here: validate_config sees
        // the struct as given.
        let strict = validate_config(&config, true);
        assert!(
            strict
                .iter()
                .any(|d| d.path == "telegram.token" && d.severity == Severity::Error)
        );
    }

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("relay", "relay"), 0);
        assert_eq!(levenshtein("rely", "relay"), 1);
    }

    #[test]
    fn diagnostic_display() {
        let d = Diagnostic::new(Severity::Error, "value", "relay.max_retries", "bad");
        assert_eq!(d.to_string(), "error [value] relay.max_retries: bad");
    }
}
