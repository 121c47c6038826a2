// ── Runtime controller configuration ──
//
// Describes where a `Controller` roots itself and how it pages. Carries
// the credential for the session but never touches disk; the CLI builds a
// `ControllerConfig` from a profile and hands it in.

use secrecy::SecretString;

/// Default number of children fetched per page.
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Configuration for a [`Controller`](crate::Controller).
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Path (relative to the database root) the controller attaches to.
    /// Empty means the database root itself.
    pub root: String,
    /// Page size used by paginators and feeds the controller opens.
    pub page_size: usize,
    /// Token presented to the backend on attach, if any.
    pub auth_token: Option<SecretString>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            root: String::new(),
            page_size: DEFAULT_PAGE_SIZE,
            auth_token: None,
        }
    }
}
