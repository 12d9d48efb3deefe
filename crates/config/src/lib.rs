//! Configuration loading, validation and env substitution.
//!
//! Config files: `ferry.toml`, `ferry.yaml`, `ferry.yml` or `ferry.json`.
//! Searched in `./` then the user config directory (`~/.config/ferry/`).
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    error::{Error, Result},
    loader::{
        apply_env_overrides, config_dir, data_dir, discover_and_load, find_config_file,
        load_config,
    },
    schema::{
        FerryConfig, NotificationsConfig, RelayConfig, StorageConfig, TelegramConfig,
        WatchdogConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult},
};
