//! Shared helpers for command handlers.

use std::path::Path;

use tracing::debug;
use url::Url;

use fireproof_core::MemoryDatabase;

use crate::error::CliError;

/// Read a JSON fixture in database export format into a fresh in-memory
/// database served under `url`.
pub fn load_fixture(path: &Path, url: Url) -> Result<MemoryDatabase, CliError> {
    let fixture_err = |source: Box<dyn std::error::Error + Send + Sync>| CliError::Fixture {
        path: path.to_path_buf(),
        source,
    };
    let contents = std::fs::read_to_string(path).map_err(|e| fixture_err(Box::new(e)))?;
    let data: serde_json::Value =
        serde_json::from_str(&contents).map_err(|e| fixture_err(Box::new(e)))?;

    debug!(fixture = %path.display(), url = %url, "loaded fixture");
    Ok(MemoryDatabase::from_json(url, data))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn malformed_fixture_is_reported_with_its_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{ not json").unwrap();

        let err = load_fixture(file.path(), "memory://t".parse().unwrap()).err().unwrap();
        match err {
            CliError::Fixture { path, .. } => assert_eq!(path, file.path()),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn missing_fixture_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_fixture(&dir.path().join("absent.json"), "memory://t".parse().unwrap()),
            Err(CliError::Fixture { .. })
        ));
    }
}
