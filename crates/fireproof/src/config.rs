//! CLI configuration: thin wrapper around `fireproof_config` shared types.
//!
//! Adds resolution that respects `GlobalOpts` flag overrides (--config,
//! --profile, --url, --root, --token).

use std::path::PathBuf;

use secrecy::SecretString;
use url::Url;

use fireproof_core::ControllerConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub use fireproof_config::{Config, Profile, load_config_from, save_config_to};

// ── CLI-specific helpers ────────────────────────────────────────────

/// The config file in effect: `--config` / `FIREPROOF_CONFIG`, else the
/// platform location.
pub fn config_file(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(fireproof_config::config_path)
}

/// Load the config in effect. A missing file yields the defaults.
pub fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    Ok(load_config_from(&config_file(global))?)
}

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// The profile in effect. An explicitly requested profile must exist; the
/// implicit default falls back to built-in values.
pub fn active_profile(global: &GlobalOpts, config: &Config) -> Result<(String, Profile), CliError> {
    let name = active_profile_name(global, config);
    match config.profile(&name) {
        Ok(profile) => Ok((name, profile.clone())),
        Err(_) if global.profile.is_none() => Ok((name, Profile::default())),
        Err(err) => Err(err.into()),
    }
}

/// Database URL: flag > env > profile.
pub fn resolve_url(global: &GlobalOpts, profile: &Profile) -> Result<Url, CliError> {
    let raw = global.url.as_deref().unwrap_or(&profile.url);
    raw.parse().map_err(|_| CliError::Validation {
        field: "url".into(),
        reason: format!("invalid URL: {raw}"),
    })
}

/// Translate a `Profile` + global flags into a `ControllerConfig`.
///
/// `page_size` overrides the profile and defaults when given.
pub fn resolve_controller_config(
    global: &GlobalOpts,
    config: &Config,
    profile_name: &str,
    profile: &Profile,
    page_size: Option<usize>,
) -> Result<ControllerConfig, CliError> {
    let mut resolved =
        fireproof_config::profile_to_controller_config(profile, profile_name, &config.defaults)?;

    if let Some(root) = &global.root {
        resolved.root.clone_from(root);
    }
    if let Some(token) = &global.token {
        resolved.auth_token = Some(SecretString::from(token.clone()));
    }
    if let Some(size) = page_size {
        if size == 0 {
            return Err(CliError::Validation {
                field: "size".into(),
                reason: "must be at least 1".into(),
            });
        }
        resolved.page_size = size;
    }
    Ok(resolved)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    fn global(args: &[&str]) -> GlobalOpts {
        let mut argv = vec!["fireproof"];
        argv.extend_from_slice(args);
        argv.extend_from_slice(&["get", "x"]);
        Cli::try_parse_from(argv).unwrap().global
    }

    fn config_with(name: &str, profile: Profile) -> Config {
        let mut cfg = Config::default();
        cfg.profiles.insert(name.into(), profile);
        cfg
    }

    #[test]
    fn implicit_default_profile_falls_back() {
        let opts = global(&[]);
        let (name, profile) = active_profile(&opts, &Config::default()).unwrap();
        assert_eq!(name, "default");
        assert_eq!(profile, Profile::default());
    }

    #[test]
    fn explicit_missing_profile_is_an_error() {
        let opts = global(&["--profile", "prod"]);
        let cfg = config_with("dev", Profile::default());
        assert!(matches!(
            active_profile(&opts, &cfg),
            Err(CliError::ProfileNotFound { .. })
        ));
    }

    #[test]
    fn flags_override_profile() {
        let opts = global(&["--root", "other", "--url", "memory://flag"]);
        let profile = Profile {
            root: "app".into(),
            page_size: Some(4),
            ..Profile::default()
        };
        let cfg = config_with("default", profile.clone());

        let resolved = resolve_controller_config(&opts, &cfg, "default", &profile, None).unwrap();
        assert_eq!(resolved.root, "other");
        assert_eq!(resolved.page_size, 4);
        assert_eq!(resolve_url(&opts, &profile).unwrap().as_str(), "memory://flag");

        let sized = resolve_controller_config(&opts, &cfg, "default", &profile, Some(9)).unwrap();
        assert_eq!(sized.page_size, 9);
        assert!(resolve_controller_config(&opts, &cfg, "default", &profile, Some(0)).is_err());
    }
}
