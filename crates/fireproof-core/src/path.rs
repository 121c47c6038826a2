// ── Path validation ──
//
// Joins bound path segments into a store path. A segment that is unset
// (an unresolved binding upstream) poisons the whole path: the caller gets
// an error instead of a reference to the wrong location.

use fireproof_api::normalize_path;

use crate::error::CoreError;

/// Validate a single `/`-separated path. Empty paths are rejected.
pub fn validate(path: &str) -> Result<String, CoreError> {
    let normalized = normalize_path(path)?;
    if normalized.is_empty() {
        return Err(CoreError::InvalidPath {
            path: path.to_owned(),
            reason: "path is empty".into(),
        });
    }
    Ok(normalized)
}

/// Join optional segments with `/` and validate the result.
///
/// ```
/// use fireproof_core::path::join;
///
/// assert_eq!(join(&[Some("users"), Some("alice/posts")]).unwrap(), "users/alice/posts");
/// assert!(join(&[Some("users"), None]).is_err());
/// ```
pub fn join<S: AsRef<str>>(segments: &[Option<S>]) -> Result<String, CoreError> {
    let mut parts = Vec::with_capacity(segments.len());
    for (index, segment) in segments.iter().enumerate() {
        let Some(segment) = segment else {
            return Err(CoreError::InvalidPath {
                path: render(segments),
                reason: format!("segment {index} is unset"),
            });
        };
        parts.push(segment.as_ref());
    }
    validate(&parts.join("/"))
}

fn render<S: AsRef<str>>(segments: &[Option<S>]) -> String {
    segments
        .iter()
        .map(|s| s.as_ref().map_or("<unset>", AsRef::as_ref))
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn join_collapses_redundant_slashes() {
        let path = join(&[Some("/users/"), Some("alice"), Some("")]).unwrap();
        assert_eq!(path, "users/alice");
    }

    #[test]
    fn unset_segment_is_named_in_error() {
        let err = join(&[Some("users"), None::<&str>, Some("posts")]).unwrap_err();
        assert_eq!(
            err,
            CoreError::InvalidPath {
                path: "users/<unset>/posts".into(),
                reason: "segment 1 is unset".into(),
            }
        );
    }

    #[test]
    fn empty_result_is_rejected() {
        assert!(join(&[Some(""), Some("/")]).is_err());
        assert!(join::<&str>(&[]).is_err());
    }

    #[test]
    fn forbidden_characters_are_rejected() {
        assert!(matches!(
            validate("users/a.b"),
            Err(CoreError::InvalidPath { .. })
        ));
    }
}
