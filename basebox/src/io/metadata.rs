//! VM session metadata written by Vagrant.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::debug;

use crate::error::BaseboxError;

/// Metadata file inside the working directory.
pub const METADATA_FILE: &str = ".vagrant";

const ACTIVE_BASE_KEY: [&str; 2] = ["active", "default"];

/// Read the id of the active base VM (`active.default`) from `<workdir>/.vagrant`.
///
/// A missing or malformed file is a parse error; a missing key is
/// [`BaseboxError::MissingMetadataKey`]. Neither falls back to a default.
pub fn read_active_base(workdir: &Path) -> Result<String> {
    let path = workdir.join(METADATA_FILE);
    let contents =
        fs::read_to_string(&path).with_context(|| format!("read VM metadata {}", path.display()))?;
    let value: Value = serde_json::from_str(&contents)
        .with_context(|| format!("parse VM metadata {}", path.display()))?;

    let mut current = &value;
    for segment in ACTIVE_BASE_KEY {
        current = current
            .get(segment)
            .ok_or_else(|| BaseboxError::MissingMetadataKey {
                path: path.clone(),
                key: ACTIVE_BASE_KEY.join("."),
            })?;
    }
    let base = current
        .as_str()
        .ok_or_else(|| BaseboxError::MissingMetadataKey {
            path: path.clone(),
            key: ACTIVE_BASE_KEY.join("."),
        })?;
    debug!(base, "active base vm");
    Ok(base.to_string())
}
