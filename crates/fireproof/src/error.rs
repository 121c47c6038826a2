//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors with
//! actionable help text.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use fireproof_config::ConfigError;
use fireproof_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const PERMISSION: i32 = 5;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Data source ──────────────────────────────────────────────────
    #[error("No data source configured")]
    #[diagnostic(
        code(fireproof::no_fixture),
        help(
            "Pass a JSON fixture with --fixture FILE\n\
             or set FIREPROOF_FIXTURE."
        )
    )]
    NoFixture,

    #[error("Could not load fixture {}", path.display())]
    #[diagnostic(
        code(fireproof::fixture),
        help("The fixture must be a JSON document in database export format.")
    )]
    Fixture {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(fireproof::auth_failed),
        help(
            "Check the token for profile '{profile}'.\n\
             Set auth_token_env in the profile or pass --token."
        )
    )]
    AuthFailed { profile: String, message: String },

    #[error("Permission denied at /{path}")]
    #[diagnostic(
        code(fireproof::permission_denied),
        help("The current identity may not read this location.")
    )]
    PermissionDenied { path: String },

    // ── Addressing ───────────────────────────────────────────────────
    #[error("Nothing stored at /{path}")]
    #[diagnostic(code(fireproof::not_found))]
    NotFound { path: String },

    #[error("Invalid path '{path}': {reason}")]
    #[diagnostic(
        code(fireproof::invalid_path),
        help("Paths are '/'-separated keys without '.', '#', '$', '[' or ']'.")
    )]
    InvalidPath { path: String, reason: String },

    #[error("Invalid query descriptor '{descriptor}': {reason}")]
    #[diagnostic(
        code(fireproof::invalid_descriptor),
        help("Example: users.orderByChild:\"age\".startAt:18.limitToFirst:10")
    )]
    InvalidDescriptor { descriptor: String, reason: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(fireproof::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(fireproof::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: fireproof config init --name {name}"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error(transparent)]
    #[diagnostic(code(fireproof::config))]
    Config(ConfigError),

    // ── Store ────────────────────────────────────────────────────────
    #[error("{0}")]
    #[diagnostic(code(fireproof::database))]
    Core(CoreError),

    // ── IO / Serialization ────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    #[diagnostic(code(fireproof::json))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::AuthFailed { .. } => exit_code::AUTH,
            Self::PermissionDenied { .. } => exit_code::PERMISSION,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::NoFixture
            | Self::InvalidPath { .. }
            | Self::InvalidDescriptor { .. }
            | Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::AuthenticationFailed { message } => CliError::AuthFailed {
                profile: "current".into(),
                message,
            },
            CoreError::PermissionDenied { path } => CliError::PermissionDenied { path },
            CoreError::InvalidPath { path, reason } => CliError::InvalidPath { path, reason },
            CoreError::InvalidDescriptor { descriptor, reason } => {
                CliError::InvalidDescriptor { descriptor, reason }
            }
            CoreError::InvalidQuery { message } => CliError::Validation {
                field: "query".into(),
                reason: message,
            },
            other => CliError::Core(other),
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::ProfileNotFound { name, available } => CliError::ProfileNotFound {
                name,
                available: if available.is_empty() {
                    "(none)".into()
                } else {
                    available.join(", ")
                },
            },
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            other => CliError::Config(other),
        }
    }
}
