//! Shared configuration for the fireproof CLI.
//!
//! TOML profiles, auth token resolution (env + plaintext), and translation
//! to `fireproof_core::ControllerConfig`. The CLI adds flag-aware wrappers
//! on top.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use fireproof_core::ControllerConfig;
use fireproof_core::config::DEFAULT_PAGE_SIZE;

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{profile}' reads its auth token from ${var}, which is not set")]
    MissingToken { profile: String, var: String },

    #[error("profile '{name}' not found")]
    ProfileNotFound { name: String, available: Vec<String> },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named database profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Look up a profile by name.
    pub fn profile(&self, name: &str) -> Result<&Profile, ConfigError> {
        self.profiles.get(name).ok_or_else(|| {
            let mut available: Vec<String> = self.profiles.keys().cloned().collect();
            available.sort();
            ConfigError::ProfileNotFound {
                name: name.into(),
                available,
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            output: default_output(),
            color: default_color(),
        }
    }
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}
fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}

/// A named database profile.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Profile {
    /// Database URL; snapshot references render under it.
    #[serde(default = "default_url")]
    pub url: String,

    /// Path the controller attaches to. Empty means the database root.
    #[serde(default)]
    pub root: String,

    /// Override the default page size.
    pub page_size: Option<usize>,

    /// Auth token (plaintext, prefer `auth_token_env`).
    pub auth_token: Option<String>,

    /// Environment variable name containing the auth token.
    pub auth_token_env: Option<String>,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            url: default_url(),
            root: String::new(),
            page_size: None,
            auth_token: None,
            auth_token_env: None,
        }
    }
}

impl Profile {
    /// Parse the profile's database URL.
    pub fn database_url(&self) -> Result<Url, ConfigError> {
        self.url.parse().map_err(|_| ConfigError::Validation {
            field: "url".into(),
            reason: format!("invalid URL: {}", self.url),
        })
    }
}

fn default_url() -> String {
    "memory://local".into()
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("rs", "fireproof", "fireproof").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("fireproof");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load Config from `path` + environment.
///
/// `FIREPROOF_`-prefixed variables override file values; nested keys use a
/// double underscore, e.g. `FIREPROOF_DEFAULTS__PAGE_SIZE=25`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("FIREPROOF_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

/// Serialize config to TOML and write it to `path`, creating parents.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve the profile's auth token, if it has one.
///
/// The named environment variable wins over the plaintext value. A profile
/// that names a variable which is unset and has no plaintext fallback is an
/// error; a profile with neither is anonymous.
pub fn resolve_auth_token(
    profile: &Profile,
    profile_name: &str,
) -> Result<Option<SecretString>, ConfigError> {
    // 1. Profile's auth_token_env → env var lookup
    if let Some(ref env_name) = profile.auth_token_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(Some(SecretString::from(val)));
        }
        if profile.auth_token.is_none() {
            return Err(ConfigError::MissingToken {
                profile: profile_name.into(),
                var: env_name.clone(),
            });
        }
    }

    // 2. Plaintext in config
    Ok(profile
        .auth_token
        .as_ref()
        .map(|token| SecretString::from(token.clone())))
}

/// Build a `ControllerConfig` from a profile, with no CLI flag overrides.
pub fn profile_to_controller_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<ControllerConfig, ConfigError> {
    let page_size = profile.page_size.unwrap_or(defaults.page_size);
    if page_size == 0 {
        return Err(ConfigError::Validation {
            field: "page_size".into(),
            reason: "must be at least 1".into(),
        });
    }

    Ok(ControllerConfig {
        root: profile.root.clone(),
        page_size,
        auth_token: resolve_auth_token(profile, profile_name)?,
    })
}
