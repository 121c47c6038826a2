//! Config subcommand handlers.

use std::collections::HashMap;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::{self, Config, Profile};
use crate::error::CliError;
use crate::output;

const REDACTED: &str = "********";

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        // ── Path ────────────────────────────────────────────────────
        ConfigCommand::Path => {
            output::print_output(&config::config_file(global).display().to_string(), false);
            Ok(())
        }

        // ── Show ────────────────────────────────────────────────────
        ConfigCommand::Show => {
            let mut cfg = config::load(global)?;
            for profile in cfg.profiles.values_mut() {
                if profile.auth_token.is_some() {
                    profile.auth_token = Some(REDACTED.into());
                }
            }
            let rendered = toml::to_string_pretty(&cfg).map_err(|e| CliError::Validation {
                field: "config".into(),
                reason: format!("failed to serialize config: {e}"),
            })?;
            let out = output::render_single(
                &global.output,
                &cfg,
                |_| rendered.trim_end().to_owned(),
                |_| rendered.trim_end().to_owned(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        // ── Init ────────────────────────────────────────────────────
        ConfigCommand::Init {
            name,
            profile_url,
            profile_root,
            force,
        } => {
            let path = config::config_file(global);
            if path.exists() && !force {
                return Err(CliError::Validation {
                    field: "config".into(),
                    reason: format!("{} already exists; pass --force to replace it", path.display()),
                });
            }

            let profile = Profile {
                url: profile_url,
                root: profile_root,
                ..Profile::default()
            };
            profile.database_url()?;

            let mut profiles = HashMap::new();
            profiles.insert(name.clone(), profile);
            let cfg = Config {
                default_profile: Some(name.clone()),
                defaults: fireproof_config::Defaults::default(),
                profiles,
            };
            config::save_config_to(&cfg, &path)?;

            if !global.quiet {
                eprintln!("✓ Configuration written to {}", path.display());
                eprintln!("  Active profile: {name}");
            }
            Ok(())
        }
    }
}
