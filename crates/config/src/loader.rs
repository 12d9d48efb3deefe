use std::path::{Path, PathBuf};

use {
    secrecy::Secret,
    tracing::{debug, warn},
};

use crate::{
    env_subst::substitute_env,
    error::{Context, Error, Result},
    schema::FerryConfig,
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["ferry.toml", "ferry.yaml", "ferry.yml", "ferry.json"];

/// Environment variable that overrides `telegram.token`.
pub const TOKEN_ENV: &str = "FERRY_TELEGRAM_TOKEN";

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<FerryConfig> {
    let raw = read_substituted(path)?;
    parse_config(&raw, path)
}

/// Read a config file and resolve `${ENV_VAR}` placeholders.
pub(crate) fn read_substituted(path: &Path) -> Result<String> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(substitute_env(&raw))
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./ferry.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/ferry/ferry.{toml,yaml,yml,json}` (user-global)
///
/// Returns `FerryConfig::default()` if no config file is found or the file
/// fails to parse.
pub fn discover_and_load() -> FerryConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    FerryConfig::default()
}

/// Find the first config file in standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    if let Some(dir) = config_dir() {
        for name in CONFIG_FILENAMES {
            let p = dir.join(name);
            if p.exists() {
                return Some(p);
            }
        }
    }

    None
}

/// Returns the user-global config directory (`~/.config/ferry/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "ferry").map(|d| d.config_dir().to_path_buf())
}

/// Returns the user data directory where the route table lives by default.
pub fn data_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "ferry").map(|d| d.data_dir().to_path_buf())
}

/// Apply environment overrides on top of a loaded config.
pub fn apply_env_overrides(config: &mut FerryConfig) {
    apply_env_overrides_with(config, |name| std::env::var(name).ok());
}

fn apply_env_overrides_with(config: &mut FerryConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(token) = lookup(TOKEN_ENV).filter(|t| !t.trim().is_empty()) {
        debug!(var = TOKEN_ENV, "telegram token taken from environment");
        config.telegram.token = Some(Secret::new(token));
    }
}

fn parse_config(raw: &str, path: &Path) -> Result<FerryConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => Err(Error::UnsupportedFormat(ext.to_string())),
    }
}

/// Parse any supported format into a JSON value tree, for schema checks.
pub(crate) fn parse_config_value(raw: &str, path: &Path) -> Result<serde_json::Value> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => {
            let v: toml::Value = toml::from_str(raw)?;
            serde_json::to_value(v).context("convert TOML tree")
        },
        "yaml" | "yml" => {
            let v: serde_yaml::Value = serde_yaml::from_str(raw)?;
            serde_json::to_value(v).context("convert YAML tree")
        },
        "json" => Ok(serde_json::from_str(raw)?),
        _ => Err(Error::UnsupportedFormat(ext.to_string())),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, secrecy::ExposeSecret, std::io::Write};

    fn write_file(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn loads_toml_yaml_and_json() {
        let dir = tempfile::tempdir().unwrap();
        let toml = write_file(dir.path(), "ferry.toml", "[relay]\nnum_workers = 2\n");
        let yaml = write_file(dir.path(), "ferry.yaml", "relay:\n  num_workers: 4\n");
        let json = write_file(dir.path(), "ferry.json", r#"{"relay": {"num_workers": 6}}"#);

        assert_eq!(load_config(&toml).unwrap().relay.num_workers, 2);
        assert_eq!(load_config(&yaml).unwrap().relay.num_workers, 4);
        assert_eq!(load_config(&json).unwrap().relay.num_workers, 6);
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "ferry.ini", "");
        assert!(matches!(
            load_config(&path),
            Err(Error::UnsupportedFormat(ext)) if ext == "ini"
        ));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_config(Path::new("/nonexistent/ferry.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/ferry.toml"));
    }

    #[test]
    fn env_token_overrides_file_token() {
        let mut cfg: FerryConfig = toml::from_str("[telegram]\ntoken = \"file\"\n").unwrap();
        apply_env_overrides_with(&mut cfg, |name| {
            (name == TOKEN_ENV).then(|| "from-env".to_string())
        });
        assert_eq!(
            cfg.telegram.token.as_ref().unwrap().expose_secret(),
            "from-env"
        );
    }

    #[test]
    fn blank_env_token_is_ignored() {
        let mut cfg = FerryConfig::default();
        apply_env_overrides_with(&mut cfg, |_| Some("  ".into()));
        assert!(cfg.telegram.token.is_none());
    }

    #[test]
    fn value_tree_from_yaml() {
        let value =
            parse_config_value("watchdog:\n  queue_sweep_secs: 9\n", Path::new("x.yml")).unwrap();
        assert_eq!(value["watchdog"]["queue_sweep_secs"], 9);
    }
}
