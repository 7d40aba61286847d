//! Loading match profiles from disk.
//!
//! A profile document is any JSON object. It is sent to the backend as the
//! compacted `properties` of a [`MatchObject`] whose id is the document's
//! top-level `name`, or [`DEFAULT_PROFILE_ID`] when there is none.
//!
//! Compaction only drops insignificant whitespace: key order and the literal
//! text of numbers are kept (serde_json `preserve_order` and
//! `arbitrary_precision`).

use match_director_core::{
    Error, Result, proto::MatchObject, types::DEFAULT_PROFILE_ID,
};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Reads one profile document.
///
/// # Errors
///
/// Returns [`Error::InvalidProfile`] if the file cannot be read or is not
/// valid JSON.
pub async fn load_profile(path: impl AsRef<Path>) -> Result<MatchObject> {
    let path = path.as_ref();
    let invalid = |reason: String| Error::InvalidProfile {
        path: path.display().to_string(),
        reason,
    };

    let raw = tokio::fs::read(path)
        .await
        .map_err(|e| invalid(format!("failed to read: {e}")))?;
    let document: Value =
        serde_json::from_slice(&raw).map_err(|e| invalid(format!("invalid JSON: {e}")))?;
    let properties =
        serde_json::to_string(&document).map_err(|e| invalid(format!("failed to compact: {e}")))?;

    let id = document
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_PROFILE_ID)
        .to_string();

    tracing::info!(profile = %id, path = %path.display(), "Loaded profile");
    Ok(MatchObject {
        id,
        properties,
        ..Default::default()
    })
}

/// Reads the starter profile and every dispatch profile.
///
/// # Errors
///
/// Returns [`Error::InvalidProfile`] for the first document that cannot be
/// loaded, or if `paths` is empty.
pub async fn load_profiles(
    starter: impl AsRef<Path>,
    paths: &[PathBuf],
) -> Result<(MatchObject, Vec<MatchObject>)> {
    if paths.is_empty() {
        return Err(Error::InvalidProfile {
            path: String::new(),
            reason: "no profiles configured".to_string(),
        });
    }

    let starter = load_profile(starter).await?;
    let mut profiles = Vec::with_capacity(paths.len());
    for path in paths {
        profiles.push(load_profile(path).await?);
    }
    Ok((starter, profiles))
}
