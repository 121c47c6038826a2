use thiserror::Error;

/// Top-level error type for the `fireproof-api` crate.
///
/// Covers every failure a [`Backend`](crate::Backend) can report.
/// Higher-level crates translate these into domain errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    // ── Access ──────────────────────────────────────────────────────
    /// Read or listen rejected by the store's access rules.
    #[error("Permission denied at /{path}")]
    PermissionDenied { path: String },

    /// Credentials rejected by the store.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Addressing ──────────────────────────────────────────────────
    /// Path contains a forbidden character or an empty segment.
    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// Query parameters the store cannot execute (e.g. a zero limit).
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    // ── Store ───────────────────────────────────────────────────────
    /// Transaction could not settle against concurrent writes.
    #[error("Transaction at /{path} gave up after {attempts} attempts")]
    TransactionContention { path: String, attempts: u32 },

    /// Data could not be represented in the store.
    #[error("Invalid data: {message}")]
    Serialization { message: String },

    /// Catch-all for backend-specific failures.
    #[error("Backend error: {message}")]
    Backend { message: String },
}
