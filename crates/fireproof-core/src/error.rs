// ── Core error types ──
//
// User-facing errors from fireproof-core. The `From<fireproof_api::Error>`
// impl translates store-level failures into domain variants, so callers of
// the engines never match on backend errors directly.
//
// `CoreError` is `Clone`: a single in-flight fetch may be awaited by several
// callers at once, and each of them receives the same outcome.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    // ── Addressing errors ────────────────────────────────────────────
    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Invalid query descriptor '{descriptor}': {reason}")]
    InvalidDescriptor { descriptor: String, reason: String },

    #[error("Invalid query: {message}")]
    InvalidQuery { message: String },

    // ── Access errors ────────────────────────────────────────────────
    #[error("Permission denied at /{path}")]
    PermissionDenied { path: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    // ── Lifecycle errors ─────────────────────────────────────────────
    #[error("Controller is not attached to a database")]
    NotAttached,

    #[error("{component} is not connected to a root reference")]
    NotConnected { component: &'static str },

    #[error("Subscription at /{path} closed")]
    SubscriptionClosed { path: String },

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Transaction at /{path} aborted")]
    TransactionAborted { path: String },

    #[error("Transform failed: {message}")]
    Transform { message: String },

    // ── Store errors (wrapped, not exposed raw) ──────────────────────
    #[error("Database error: {message}")]
    Api { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

// ── Conversion from store-level errors ───────────────────────────────

impl From<fireproof_api::Error> for CoreError {
    fn from(err: fireproof_api::Error) -> Self {
        use fireproof_api::Error as Api;

        match err {
            Api::PermissionDenied { path } => CoreError::PermissionDenied { path },
            Api::Authentication { message } => CoreError::AuthenticationFailed { message },
            Api::InvalidPath { path, reason } => CoreError::InvalidPath { path, reason },
            Api::InvalidQuery(message) => CoreError::InvalidQuery { message },
            other @ (Api::TransactionContention { .. }
            | Api::Serialization { .. }
            | Api::Backend { .. }) => CoreError::Api {
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn permission_denied_maps_to_domain_variant() {
        let err: CoreError = fireproof_api::Error::PermissionDenied {
            path: "secret".into(),
        }
        .into();
        assert_eq!(
            err,
            CoreError::PermissionDenied {
                path: "secret".into()
            }
        );
        assert_eq!(err.to_string(), "Permission denied at /secret");
    }

    #[test]
    fn contention_is_wrapped_as_api_error() {
        let err: CoreError = fireproof_api::Error::TransactionContention {
            path: "counter".into(),
            attempts: 25,
        }
        .into();
        assert!(matches!(err, CoreError::Api { .. }));
    }
}
